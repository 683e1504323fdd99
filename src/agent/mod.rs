/// Agent collaborators
///
/// The endorsement core does not own connections, keys or signatures. They
/// belong to the agent the service runs beside and are reached through the
/// traits below. `AgentAdminClient` talks to a real agent over its admin API;
/// `InMemoryAgent` backs local runs and tests.

pub mod admin_client;
pub mod invitation;
pub mod memory;

pub use admin_client::AgentAdminClient;
pub use invitation::OobInvitation;
pub use memory::InMemoryAgent;

use crate::{
    did::{LogEntry, ProofOptions},
    protocol::EndorsementMessage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Connection state once the handshake has completed
pub const CONNECTION_ACTIVE: &str = "active";

/// Errors reported by agent collaborators
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invitation could not be decoded
    #[error("Invalid invitation: {0}")]
    InvalidInvitation(String),

    /// Agent refused the invitation
    #[error("Invitation rejected by agent: {0}")]
    Rejected(String),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Agent answered with an unexpected status
    #[error("Agent returned {status}: {body}")]
    UnexpectedResponse { status: u16, body: String },

    /// Key lookup failed
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Signing failed
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Message could not be delivered on a connection
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Connection record as reported by the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnRecord {
    pub connection_id: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub state: String,
    #[serde(default)]
    pub their_label: Option<String>,
}

impl ConnRecord {
    pub fn is_active(&self) -> bool {
        self.state == CONNECTION_ACTIVE
    }
}

/// Key registered in the agent wallet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyInfo {
    pub kid: String,
    pub multikey: String,
}

/// Connection establishment and lookup
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// All connections carrying `alias`, in any state
    async fn find_by_alias(&self, alias: &str) -> Result<Vec<ConnRecord>, AgentError>;

    /// Accept an out-of-band invitation; the connection is stored under `alias`
    async fn receive_invitation(
        &self,
        invitation: &OobInvitation,
        alias: &str,
        auto_accept: bool,
    ) -> Result<ConnRecord, AgentError>;
}

/// Wallet key lookup by key id
#[async_trait]
pub trait KeyManager: Send + Sync {
    async fn key_exists(&self, kid: &str) -> Result<bool, AgentError>;

    async fn get_by_kid(&self, kid: &str) -> Result<KeyInfo, AgentError>;
}

/// Data integrity proof creation
#[async_trait]
pub trait DataIntegrity: Send + Sync {
    /// Return `document` with one more proof built from `options`
    async fn add_proof(
        &self,
        document: &LogEntry,
        options: &ProofOptions,
    ) -> Result<LogEntry, AgentError>;
}

/// Outbound message delivery on an existing connection
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send(
        &self,
        message: &EndorsementMessage,
        connection_id: &str,
    ) -> Result<(), AgentError>;
}

/// Bundle of agent collaborators shared by the manager and the handlers
#[derive(Clone)]
pub struct AgentServices {
    pub connections: Arc<dyn ConnectionProvider>,
    pub keys: Arc<dyn KeyManager>,
    pub data_integrity: Arc<dyn DataIntegrity>,
    pub responder: Arc<dyn Responder>,
}

impl AgentServices {
    /// Use one agent for every collaborator
    pub fn from_agent<A>(agent: Arc<A>) -> Self
    where
        A: ConnectionProvider + KeyManager + DataIntegrity + Responder + 'static,
    {
        Self {
            connections: agent.clone(),
            keys: agent.clone(),
            data_integrity: agent.clone(),
            responder: agent,
        }
    }
}
