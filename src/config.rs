/// Configuration management for the endorsement service
use crate::error::{WebvhError, WebvhResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Suffix appended to the server URL to form the endorser connection alias
pub const ENDORSER_ALIAS_SUFFIX: &str = "-endorser";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub agent: AgentConfig,
    pub webvh: WebvhConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Required in the `x-api-key` header of admin routes when set
    pub admin_api_key: Option<String>,
    /// Required in the `x-api-key` header of the agent's inbound relay;
    /// falls back to `admin_api_key`
    pub inbound_api_key: Option<String>,
}

impl ServiceConfig {
    /// Key the agent must present when relaying inbound messages
    pub fn inbound_key(&self) -> Option<&str> {
        self.inbound_api_key
            .as_deref()
            .or(self.admin_api_key.as_deref())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database: PathBuf,
}

/// Connection to the agent that owns connections, keys and proofs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub admin_url: String,
    pub api_key: Option<String>,
    /// Base URL used to deliver outbound protocol messages
    pub outbound_url: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Agent role in the endorsement protocol
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Author,
    #[default]
    Endorser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Author => "author",
            Role::Endorser => "endorser",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WebvhError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "author" => Ok(Role::Author),
            "endorser" | "" => Ok(Role::Endorser),
            other => Err(WebvhError::Configuration(format!(
                "Unknown role '{}', expected 'author' or 'endorser'",
                other
            ))),
        }
    }
}

/// did:webvh role configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebvhConfig {
    pub role: Role,
    /// did:webvh server this agent publishes to (required for authors)
    pub server_url: Option<String>,
    /// Out-of-band invitation URL of the endorser agent
    pub endorser_invitation: Option<String>,
    /// Endorser only: sign incoming requests without operator review
    pub auto_endorse: bool,
}

impl WebvhConfig {
    /// Configuration for an author publishing to `server_url`
    pub fn author(server_url: impl Into<String>) -> Self {
        Self {
            role: Role::Author,
            server_url: Some(server_url.into()),
            ..Default::default()
        }
    }

    /// Configuration for an endorser
    pub fn endorser(auto_endorse: bool) -> Self {
        Self {
            role: Role::Endorser,
            auto_endorse,
            ..Default::default()
        }
    }

    /// Set the endorser invitation
    pub fn with_invitation(mut self, invitation: impl Into<String>) -> Self {
        self.endorser_invitation = Some(invitation.into());
        self
    }

    pub fn is_author(&self) -> bool {
        self.role == Role::Author
    }

    /// Configured server URL, required for any author operation
    pub fn server_url(&self) -> WebvhResult<&str> {
        self.server_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                WebvhError::Configuration("Check server url is set.".to_string())
            })
    }

    /// Alias of the connection to the endorser of `server_url`
    pub fn endorser_alias(&self) -> WebvhResult<String> {
        Ok(format!("{}{}", self.server_url()?, ENDORSER_ALIAS_SUFFIX))
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> WebvhResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("WEBVH_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("WEBVH_PORT")
            .unwrap_or_else(|_| "8030".to_string())
            .parse()
            .map_err(|_| WebvhError::Configuration("Invalid port number".to_string()))?;
        let admin_api_key = non_empty_var("WEBVH_ADMIN_API_KEY");
        let inbound_api_key = non_empty_var("WEBVH_INBOUND_API_KEY");

        let database: PathBuf = env::var("WEBVH_DATABASE")
            .unwrap_or_else(|_| "./data/endorser.sqlite".to_string())
            .into();

        let admin_url = env::var("WEBVH_AGENT_ADMIN_URL")
            .unwrap_or_else(|_| "http://localhost:8031".to_string());
        let agent_api_key = non_empty_var("WEBVH_AGENT_API_KEY");
        let outbound_url = env::var("WEBVH_AGENT_OUTBOUND_URL").unwrap_or_else(|_| admin_url.clone());

        let role = env::var("WEBVH_ROLE")
            .unwrap_or_default()
            .parse::<Role>()?;
        let server_url = non_empty_var("WEBVH_SERVER_URL");
        let endorser_invitation = non_empty_var("WEBVH_ENDORSER_INVITATION");
        let auto_endorse = env::var("WEBVH_AUTO_ENDORSE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                admin_api_key,
                inbound_api_key,
            },
            storage: StorageConfig { database },
            agent: AgentConfig {
                admin_url,
                api_key: agent_api_key,
                outbound_url,
            },
            webvh: WebvhConfig {
                role,
                server_url,
                endorser_invitation,
                auto_endorse,
            },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    ///
    /// A missing author `server_url` is reported by endorsement setup, not here.
    pub fn validate(&self) -> WebvhResult<()> {
        if self.service.hostname.is_empty() {
            return Err(WebvhError::Configuration("Hostname cannot be empty".to_string()));
        }

        for (name, url) in [
            ("agent admin url", &self.agent.admin_url),
            ("agent outbound url", &self.agent.outbound_url),
        ] {
            reqwest::Url::parse(url)
                .map_err(|e| WebvhError::Configuration(format!("Invalid {} '{}': {}", name, url, e)))?;
        }

        if self.webvh.auto_endorse && self.webvh.is_author() {
            tracing::warn!("auto_endorse has no effect for the author role");
        }

        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
