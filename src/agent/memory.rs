/// In-memory agent for local runs and tests
///
/// Keeps connections, keys and outbound messages in process. Proofs it adds
/// are structurally complete but their `proofValue` is not a signature.
use crate::{
    agent::{
        AgentError, ConnRecord, ConnectionProvider, DataIntegrity, KeyInfo, KeyManager,
        OobInvitation, Responder, CONNECTION_ACTIVE,
    },
    did::{LogEntry, Proof, ProofOptions},
    protocol::EndorsementMessage,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// State of a connection created from an invitation before the peer answers
const CONNECTION_REQUESTED: &str = "request";

/// Message handed to the responder
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub connection_id: String,
    pub message: EndorsementMessage,
}

#[derive(Default)]
pub struct InMemoryAgent {
    connections: Mutex<Vec<ConnRecord>>,
    keys: Mutex<HashMap<String, KeyInfo>>,
    invitations: Mutex<Vec<OobInvitation>>,
    outbox: Mutex<Vec<OutboundMessage>>,
    rejection: Mutex<Option<String>>,
    alias_lookups: AtomicUsize,
}

impl InMemoryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under `alias`
    pub async fn add_connection(&self, alias: &str, state: &str) -> ConnRecord {
        let record = ConnRecord {
            connection_id: Uuid::new_v4().to_string(),
            alias: Some(alias.to_string()),
            state: state.to_string(),
            their_label: None,
        };
        self.connections.lock().await.push(record.clone());
        record
    }

    /// Mark every connection carrying `alias` active
    pub async fn activate(&self, alias: &str) -> bool {
        let mut connections = self.connections.lock().await;
        let mut activated = false;
        for record in connections
            .iter_mut()
            .filter(|record| record.alias.as_deref() == Some(alias))
        {
            record.state = CONNECTION_ACTIVE.to_string();
            activated = true;
        }
        activated
    }

    /// Register a wallet key
    pub async fn add_key(&self, kid: &str, multikey: &str) {
        self.keys.lock().await.insert(
            kid.to_string(),
            KeyInfo {
                kid: kid.to_string(),
                multikey: multikey.to_string(),
            },
        );
    }

    /// Refuse every invitation from now on
    pub async fn reject_invitations(&self, reason: &str) {
        *self.rejection.lock().await = Some(reason.to_string());
    }

    pub async fn received_invitations(&self) -> Vec<OobInvitation> {
        self.invitations.lock().await.clone()
    }

    pub async fn outbox(&self) -> Vec<OutboundMessage> {
        self.outbox.lock().await.clone()
    }

    /// Drain messages sent so far
    pub async fn take_outbox(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.outbox.lock().await)
    }

    /// Number of alias lookups served
    pub fn alias_lookups(&self) -> usize {
        self.alias_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for InMemoryAgent {
    async fn find_by_alias(&self, alias: &str) -> Result<Vec<ConnRecord>, AgentError> {
        self.alias_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .connections
            .lock()
            .await
            .iter()
            .filter(|record| record.alias.as_deref() == Some(alias))
            .cloned()
            .collect())
    }

    async fn receive_invitation(
        &self,
        invitation: &OobInvitation,
        alias: &str,
        _auto_accept: bool,
    ) -> Result<ConnRecord, AgentError> {
        if let Some(reason) = self.rejection.lock().await.clone() {
            return Err(AgentError::Rejected(reason));
        }

        self.invitations.lock().await.push(invitation.clone());
        let mut record = self.add_connection(alias, CONNECTION_REQUESTED).await;
        record.their_label = invitation.label.clone();
        Ok(record)
    }
}

#[async_trait]
impl KeyManager for InMemoryAgent {
    async fn key_exists(&self, kid: &str) -> Result<bool, AgentError> {
        Ok(self.keys.lock().await.contains_key(kid))
    }

    async fn get_by_kid(&self, kid: &str) -> Result<KeyInfo, AgentError> {
        self.keys
            .lock()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| AgentError::KeyNotFound(kid.to_string()))
    }
}

#[async_trait]
impl DataIntegrity for InMemoryAgent {
    async fn add_proof(
        &self,
        document: &LogEntry,
        options: &ProofOptions,
    ) -> Result<LogEntry, AgentError> {
        let mut proof = Proof::from_options(options);
        proof.insert("created", chrono::Utc::now().to_rfc3339());
        proof.insert(
            "proofValue",
            format!(
                "z{}",
                bs58::encode(format!("{}|{}", document.id, options.verification_method))
                    .into_string()
            ),
        );

        let mut secured = document.clone();
        secured.push_proof(proof);
        Ok(secured)
    }
}

#[async_trait]
impl Responder for InMemoryAgent {
    async fn send(
        &self,
        message: &EndorsementMessage,
        connection_id: &str,
    ) -> Result<(), AgentError> {
        self.outbox.lock().await.push(OutboundMessage {
            connection_id: connection_id.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}
