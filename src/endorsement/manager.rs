/// Endorsement manager
///
/// Owns the author-side connection setup and the operator actions on
/// pending log entries.
use crate::{
    agent::{AgentServices, ConnRecord, OobInvitation},
    config::WebvhConfig,
    did::{LogEntry, Parameters},
    endorsement::{
        retry::{poll_until, RetryPolicy},
        DomainEndorser, EndorsementStore, PendingEndorsement,
    },
    error::{WebvhError, WebvhResult},
    protocol::{EndorsementRequest, EndorsementResponse, EndorsementState},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Branch taken by `auto_endorsement_setup`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SetupOutcome {
    /// Endorsers need no connection
    NotAuthor,
    /// A connection with the endorser alias already exists
    ExistingConnection { connection_id: String, state: String },
    /// Nothing to connect with
    NoInvitation,
    /// Invitation accepted and the connection became active
    Connected { connection_id: String },
    /// Invitation accepted but the connection is not active yet
    AwaitingConnection { alias: String },
}

#[derive(Clone)]
pub struct EndorsementManager {
    config: Arc<WebvhConfig>,
    agent: AgentServices,
    store: EndorsementStore,
    signer: DomainEndorser,
    retry: RetryPolicy,
}

impl EndorsementManager {
    pub fn new(config: Arc<WebvhConfig>, agent: AgentServices, store: EndorsementStore) -> Self {
        let signer = DomainEndorser::new(agent.keys.clone(), agent.data_integrity.clone());
        Self {
            config,
            agent,
            store,
            signer,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the polling budget used while waiting for the endorser
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn signer(&self) -> &DomainEndorser {
        &self.signer
    }

    /// First active connection to the configured endorser
    pub async fn active_endorser_connection(&self) -> WebvhResult<Option<ConnRecord>> {
        let alias = self.config.endorser_alias()?;
        let connections = self.agent.connections.find_by_alias(&alias).await?;
        Ok(connections.into_iter().find(ConnRecord::is_active))
    }

    /// Make sure an author has a connection to its endorser
    ///
    /// Runs once at startup. Only a bad invitation is fatal; an endorser that
    /// does not answer in time is logged for manual recovery.
    pub async fn auto_endorsement_setup(&self) -> WebvhResult<SetupOutcome> {
        if !self.config.is_author() {
            return Ok(SetupOutcome::NotAuthor);
        }

        let alias = self.config.endorser_alias()?;

        let existing = self.agent.connections.find_by_alias(&alias).await?;
        if let Some(record) = existing
            .iter()
            .find(|record| record.is_active())
            .or_else(|| existing.first())
        {
            info!(
                connection_id = %record.connection_id,
                state = %record.state,
                "Connected to endorser from previous connection."
            );
            return Ok(SetupOutcome::ExistingConnection {
                connection_id: record.connection_id.clone(),
                state: record.state.clone(),
            });
        }

        let Some(invitation_url) = self.config.endorser_invitation.as_deref() else {
            info!("No endorser invitation, can't create connection automatically.");
            return Ok(SetupOutcome::NoInvitation);
        };

        let invitation =
            OobInvitation::from_url(invitation_url).map_err(WebvhError::EndorserInvitation)?;
        let record = self
            .agent
            .connections
            .receive_invitation(&invitation, &alias, true)
            .await
            .map_err(WebvhError::EndorserInvitation)?;
        debug!(connection_id = %record.connection_id, alias = %alias, "Endorser invitation accepted");

        let connected = poll_until(&self.retry, |attempt| async move {
            debug!(attempt, "Checking endorser connection");
            self.active_endorser_connection().await
        })
        .await?;

        match connected {
            Some(record) => {
                info!(connection_id = %record.connection_id, "Connected to endorser agent.");
                Ok(SetupOutcome::Connected {
                    connection_id: record.connection_id,
                })
            }
            None => {
                info!(
                    "No immediate response when trying to connect to endorser agent. You can \
                     try manually setting up a connection with alias {} or restart the agent \
                     when endorser is available.",
                    alias
                );
                Ok(SetupOutcome::AwaitingConnection { alias })
            }
        }
    }

    /// Get a log entry endorsed
    ///
    /// An author sends the entry to its endorser and returns `None`; the
    /// answer arrives later through the response handler. An endorser signs
    /// the entry itself and returns it.
    pub async fn request_endorsement(
        &self,
        document: LogEntry,
        parameters: Parameters,
    ) -> WebvhResult<Option<LogEntry>> {
        if !self.config.is_author() {
            return self.signer.endorse(&document).await.map(Some);
        }

        let connection = self.active_endorser_connection().await?.ok_or_else(|| {
            WebvhError::Endorsement("No active endorser connection found.".to_string())
        })?;

        info!(
            did = %document.id,
            connection_id = %connection.connection_id,
            "Requesting endorsement"
        );

        let request = EndorsementRequest::new(document, parameters);
        self.agent
            .responder
            .send(&request.into(), &connection.connection_id)
            .await?;
        Ok(None)
    }

    /// Log entries waiting for an operator
    pub async fn pending(&self) -> WebvhResult<Vec<PendingEndorsement>> {
        self.store.list().await
    }

    /// Endorse a pending log entry and answer the author that sent it
    ///
    /// `connection_id` is needed only when the same entry is pending on
    /// more than one connection.
    pub async fn endorse_entry(
        &self,
        entry_id: &str,
        connection_id: Option<&str>,
    ) -> WebvhResult<LogEntry> {
        let entry = self.find_pending(entry_id, connection_id).await?;

        let endorsed = self.signer.endorse(&entry.document).await?;

        let response =
            EndorsementResponse::new(EndorsementState::Posted, endorsed.clone(), entry.parameters);
        self.agent
            .responder
            .send(&response.into(), &entry.connection_id)
            .await?;

        self.store.remove(&entry.entry_id, &entry.connection_id).await?;

        info!(
            did = %entry.entry_id,
            connection_id = %entry.connection_id,
            "Pending log entry endorsed"
        );
        Ok(endorsed)
    }

    async fn find_pending(
        &self,
        entry_id: &str,
        connection_id: Option<&str>,
    ) -> WebvhResult<PendingEndorsement> {
        let not_found = || WebvhError::NotFound("Failed to find pending document.".to_string());

        if let Some(connection_id) = connection_id {
            return self.store.get(entry_id, connection_id).await?.ok_or_else(not_found);
        }

        let mut matches = self.store.find_by_identifier(entry_id).await?;
        match matches.len() {
            0 => Err(not_found()),
            1 => Ok(matches.remove(0)),
            n => Err(WebvhError::Conflict(format!(
                "{} is pending on {} connections, specify connection_id",
                entry_id, n
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::{ConnectionProvider, InMemoryAgent, CONNECTION_ACTIVE},
        db,
        protocol::EndorsementMessage,
    };
    use serde_json::json;
    use tokio::time::{Duration, Instant};

    const SERVER_URL: &str = "http://localhost:8000";
    const ALIAS: &str = "http://localhost:8000-endorser";
    const MULTIKEY: &str = "z6MktmrTADAYdesamoqueUx4sV3H52k9ofhAvQeQZPoou17e";
    const INVITATION: &str = "http://localhost:9050?oob=eyJAdHlwZSI6ICJodHRwczovL2RpZGNvbW0ub3JnL291dC1vZi1iYW5kLzEuMS9pbnZpdGF0aW9uIiwgIkBpZCI6ICIxIn0";

    async fn manager(config: WebvhConfig, agent: &Arc<InMemoryAgent>) -> EndorsementManager {
        let store = EndorsementStore::new(db::create_memory_pool().await.unwrap());
        EndorsementManager::new(
            Arc::new(config),
            AgentServices::from_agent(agent.clone()),
            store,
        )
    }

    fn signed_entry(id: &str) -> LogEntry {
        LogEntry::from_value(json!({
            "id": id,
            "proof": [{
                "type": "DataIntegrityProof",
                "proofPurpose": "assertionMethod",
                "verificationMethod": "did:key:z6Mkauthor#z6Mkauthor",
                "domain": "example.com%3A8000",
                "challenge": "4f2a",
                "expires": "2026-10-17T00:00:00Z"
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_endorser_setup_is_a_no_op() {
        let agent = Arc::new(InMemoryAgent::new());
        let manager = manager(WebvhConfig::endorser(true).with_invitation(INVITATION), &agent).await;

        let outcome = manager.auto_endorsement_setup().await.unwrap();

        assert_eq!(outcome, SetupOutcome::NotAuthor);
        assert_eq!(agent.alias_lookups(), 0);
        assert!(agent.received_invitations().await.is_empty());
    }

    #[tokio::test]
    async fn test_author_without_server_url_fails() {
        let agent = Arc::new(InMemoryAgent::new());
        let config = WebvhConfig {
            role: crate::config::Role::Author,
            ..Default::default()
        };
        let manager = manager(config, &agent).await;

        let result = manager.auto_endorsement_setup().await;
        assert!(matches!(result, Err(WebvhError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_existing_connection_in_any_state_is_reused() {
        let agent = Arc::new(InMemoryAgent::new());
        let existing = agent.add_connection(ALIAS, "request").await;
        let manager = manager(
            WebvhConfig::author(SERVER_URL).with_invitation(INVITATION),
            &agent,
        )
        .await;

        let outcome = manager.auto_endorsement_setup().await.unwrap();

        assert_eq!(
            outcome,
            SetupOutcome::ExistingConnection {
                connection_id: existing.connection_id,
                state: "request".to_string(),
            }
        );
        assert!(agent.received_invitations().await.is_empty());
    }

    #[tokio::test]
    async fn test_no_invitation_succeeds_without_connection() {
        let agent = Arc::new(InMemoryAgent::new());
        let manager = manager(WebvhConfig::author(SERVER_URL), &agent).await;

        let outcome = manager.auto_endorsement_setup().await.unwrap();

        assert_eq!(outcome, SetupOutcome::NoInvitation);
        assert!(agent.find_by_alias(ALIAS).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_invitation_is_fatal() {
        let agent = Arc::new(InMemoryAgent::new());
        agent.reject_invitations("Bad invitation").await;
        let manager = manager(
            WebvhConfig::author(SERVER_URL).with_invitation(INVITATION),
            &agent,
        )
        .await;

        let err = manager.auto_endorsement_setup().await.unwrap_err();
        assert!(matches!(err, WebvhError::EndorserInvitation(_)));
        assert!(err.to_string().contains("Bad invitation"));
    }

    #[tokio::test]
    async fn test_undecodable_invitation_is_fatal() {
        let agent = Arc::new(InMemoryAgent::new());
        let manager = manager(
            WebvhConfig::author(SERVER_URL).with_invitation("http://localhost:9050?oob=bm90IGpzb24"),
            &agent,
        )
        .await;

        let result = manager.auto_endorsement_setup().await;
        assert!(matches!(result, Err(WebvhError::EndorserInvitation(_))));
        assert!(agent.received_invitations().await.is_empty());
    }

    #[tokio::test]
    async fn test_unanswered_invitation_is_not_fatal() {
        let agent = Arc::new(InMemoryAgent::new());
        let manager = manager(
            WebvhConfig::author(SERVER_URL).with_invitation(INVITATION),
            &agent,
        )
        .await;
        // the pool is open; setup itself never touches it
        tokio::time::pause();
        let started = Instant::now();

        let outcome = manager.auto_endorsement_setup().await.unwrap();

        assert_eq!(
            outcome,
            SetupOutcome::AwaitingConnection {
                alias: ALIAS.to_string()
            }
        );
        assert_eq!(agent.received_invitations().await.len(), 1);
        // one lookup for the existing alias, five while polling
        assert_eq!(agent.alias_lookups(), 6);
        // paused sleeps round up to the next millisecond
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_custom_retry_policy_bounds_polling() {
        let agent = Arc::new(InMemoryAgent::new());
        let manager = manager(
            WebvhConfig::author(SERVER_URL).with_invitation(INVITATION),
            &agent,
        )
        .await
        .with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(250)));
        tokio::time::pause();
        let started = Instant::now();

        let outcome = manager.auto_endorsement_setup().await.unwrap();

        assert!(matches!(outcome, SetupOutcome::AwaitingConnection { .. }));
        assert_eq!(agent.alias_lookups(), 3);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_activation_during_polling_is_observed() {
        let agent = Arc::new(InMemoryAgent::new());
        let manager = manager(
            WebvhConfig::author(SERVER_URL).with_invitation(INVITATION),
            &agent,
        )
        .await;
        tokio::time::pause();

        let activator = {
            let agent = agent.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(1000)).await;
                agent.activate(ALIAS).await
            })
        };

        let outcome = manager.auto_endorsement_setup().await.unwrap();
        assert!(activator.await.unwrap());

        let connection = agent.find_by_alias(ALIAS).await.unwrap().remove(0);
        assert_eq!(connection.state, CONNECTION_ACTIVE);
        assert_eq!(
            outcome,
            SetupOutcome::Connected {
                connection_id: connection.connection_id
            }
        );
    }

    #[tokio::test]
    async fn test_author_request_goes_to_active_connection() {
        let agent = Arc::new(InMemoryAgent::new());
        let manager = manager(WebvhConfig::author(SERVER_URL), &agent).await;

        let result = manager
            .request_endorsement(signed_entry("did:web:example.com:prod:1"), Parameters::new())
            .await;
        assert!(matches!(result, Err(WebvhError::Endorsement(_))));

        let connection = agent.add_connection(ALIAS, CONNECTION_ACTIVE).await;
        let result = manager
            .request_endorsement(signed_entry("did:web:example.com:prod:1"), Parameters::new())
            .await
            .unwrap();
        assert!(result.is_none());

        let outbox = agent.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].connection_id, connection.connection_id);
        assert!(matches!(outbox[0].message, EndorsementMessage::Request(_)));
    }

    #[tokio::test]
    async fn test_endorser_request_self_endorses() {
        let agent = Arc::new(InMemoryAgent::new());
        agent.add_key("example.com:8000", MULTIKEY).await;
        let manager = manager(WebvhConfig::endorser(false), &agent).await;

        let endorsed = manager
            .request_endorsement(signed_entry("did:web:example.com:prod:1"), Parameters::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(endorsed.proofs().len(), 2);
        assert!(agent.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_endorse_pending_entry() {
        let agent = Arc::new(InMemoryAgent::new());
        agent.add_key("example.com:8000", MULTIKEY).await;
        let manager = manager(WebvhConfig::endorser(false), &agent).await;
        let id = "did:web:example.com:prod:1";

        manager
            .store
            .save(&signed_entry(id), "conn-1", &Parameters::new())
            .await
            .unwrap();
        assert_eq!(manager.pending().await.unwrap().len(), 1);

        let endorsed = manager.endorse_entry(id, None).await.unwrap();
        assert_eq!(endorsed.proofs().len(), 2);

        let outbox = agent.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].connection_id, "conn-1");
        match &outbox[0].message {
            EndorsementMessage::Response(response) => {
                assert_eq!(response.state, EndorsementState::Posted);
                assert_eq!(response.document, endorsed);
            }
            other => panic!("expected response, got {:?}", other),
        }

        assert!(manager.pending().await.unwrap().is_empty());
        assert!(matches!(
            manager.endorse_entry(id, None).await,
            Err(WebvhError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_endorse_pending_entry_without_key_keeps_record() {
        let agent = Arc::new(InMemoryAgent::new());
        let manager = manager(WebvhConfig::endorser(false), &agent).await;
        let id = "did:web:example.com:prod:1";

        manager
            .store
            .save(&signed_entry(id), "conn-1", &Parameters::new())
            .await
            .unwrap();

        assert!(matches!(
            manager.endorse_entry(id, None).await,
            Err(WebvhError::EndorsementKeyNotFound(_))
        ));
        assert_eq!(manager.pending().await.unwrap().len(), 1);
        assert!(agent.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_pending_entry_needs_connection() {
        let agent = Arc::new(InMemoryAgent::new());
        agent.add_key("example.com:8000", MULTIKEY).await;
        let manager = manager(WebvhConfig::endorser(false), &agent).await;
        let id = "did:web:example.com:prod:1";

        for connection_id in ["conn-1", "conn-2"] {
            manager
                .store
                .save(&signed_entry(id), connection_id, &Parameters::new())
                .await
                .unwrap();
        }

        assert!(matches!(
            manager.endorse_entry(id, None).await,
            Err(WebvhError::Conflict(_))
        ));

        manager.endorse_entry(id, Some("conn-2")).await.unwrap();
        let remaining = manager.pending().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].connection_id, "conn-1");
    }
}
