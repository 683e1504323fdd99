/// HTTP client for the agent admin API
use crate::{
    agent::{
        AgentError, ConnRecord, ConnectionProvider, DataIntegrity, KeyInfo, KeyManager,
        OobInvitation, Responder,
    },
    config::AgentConfig,
    did::{LogEntry, ProofOptions},
    error::{WebvhError, WebvhResult},
    protocol::EndorsementMessage,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Header carrying the admin API key
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Deserialize)]
struct ConnectionList {
    results: Vec<ConnRecord>,
}

#[derive(Debug, Serialize)]
struct AddProofRequest<'a> {
    document: &'a LogEntry,
    options: &'a ProofOptions,
}

#[derive(Debug, Deserialize)]
struct AddProofResponse {
    #[serde(rename = "securedDocument", alias = "secured_document")]
    secured_document: LogEntry,
}

/// Agent reached over its HTTP admin API
#[derive(Clone)]
pub struct AgentAdminClient {
    http: Client,
    admin_url: String,
    outbound_url: String,
    api_key: Option<String>,
}

impl AgentAdminClient {
    pub fn new(config: &AgentConfig) -> WebvhResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("webvh-endorser/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| WebvhError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            admin_url: config.admin_url.trim_end_matches('/').to_string(),
            outbound_url: config.outbound_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    fn key_url(&self, kid: &str) -> String {
        format!("{}/wallet/keys/{}", self.admin_url, urlencoding::encode(kid))
    }
}

/// Turn a non-success status into an error carrying the response body
async fn check_status(response: Response) -> Result<Response, AgentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AgentError::UnexpectedResponse {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ConnectionProvider for AgentAdminClient {
    async fn find_by_alias(&self, alias: &str) -> Result<Vec<ConnRecord>, AgentError> {
        let response = self
            .request(Method::GET, format!("{}/connections", self.admin_url))
            .query(&[("alias", alias)])
            .send()
            .await?;

        let list: ConnectionList = check_status(response).await?.json().await?;
        debug!(alias, count = list.results.len(), "Looked up connections by alias");
        Ok(list.results)
    }

    async fn receive_invitation(
        &self,
        invitation: &OobInvitation,
        alias: &str,
        auto_accept: bool,
    ) -> Result<ConnRecord, AgentError> {
        let response = self
            .request(
                Method::POST,
                format!("{}/out-of-band/receive-invitation", self.admin_url),
            )
            .query(&[
                ("alias", alias.to_string()),
                ("auto_accept", auto_accept.to_string()),
            ])
            .json(invitation)
            .send()
            .await?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Rejected(body));
        }

        Ok(check_status(response).await?.json().await?)
    }
}

#[async_trait]
impl KeyManager for AgentAdminClient {
    async fn key_exists(&self, kid: &str) -> Result<bool, AgentError> {
        let response = self.request(Method::GET, self.key_url(kid)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }

        check_status(response).await?;
        Ok(true)
    }

    async fn get_by_kid(&self, kid: &str) -> Result<KeyInfo, AgentError> {
        let response = self.request(Method::GET, self.key_url(kid)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AgentError::KeyNotFound(kid.to_string()));
        }

        Ok(check_status(response).await?.json().await?)
    }
}

#[async_trait]
impl DataIntegrity for AgentAdminClient {
    async fn add_proof(
        &self,
        document: &LogEntry,
        options: &ProofOptions,
    ) -> Result<LogEntry, AgentError> {
        let response = self
            .request(Method::POST, format!("{}/vc/di/add-proof", self.admin_url))
            .json(&AddProofRequest { document, options })
            .send()
            .await?;

        let response = check_status(response)
            .await
            .map_err(|e| AgentError::DataIntegrity(e.to_string()))?;
        let body: AddProofResponse = response.json().await?;
        Ok(body.secured_document)
    }
}

#[async_trait]
impl Responder for AgentAdminClient {
    async fn send(
        &self,
        message: &EndorsementMessage,
        connection_id: &str,
    ) -> Result<(), AgentError> {
        let response = self
            .request(
                Method::POST,
                format!(
                    "{}/connections/{}/send-message",
                    self.outbound_url,
                    urlencoding::encode(connection_id)
                ),
            )
            .json(message)
            .send()
            .await
            .map_err(|e| AgentError::Delivery(e.to_string()))?;

        check_status(response)
            .await
            .map_err(|e| AgentError::Delivery(e.to_string()))?;

        debug!(connection_id, message_type = message.message_type(), "Message sent");
        Ok(())
    }
}
