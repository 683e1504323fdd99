/// Endorser and author reactions to protocol messages
use crate::{
    agent::Responder,
    config::WebvhConfig,
    endorsement::{DomainEndorser, EndorsementStore},
    error::{WebvhError, WebvhResult},
    operations::OperationsManager,
    protocol::{EndorsementMessage, EndorsementRequest, EndorsementResponse, EndorsementState},
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Transport context of an incoming message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    /// Connection the message arrived on; responses go back on it
    pub connection_id: String,
}

impl MessageContext {
    pub fn new(connection_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
        }
    }
}

/// Routes protocol messages to the endorser or author reaction
#[derive(Clone)]
pub struct EndorsementHandler {
    config: Arc<WebvhConfig>,
    responder: Arc<dyn Responder>,
    store: EndorsementStore,
    signer: DomainEndorser,
    operations: Arc<dyn OperationsManager>,
}

impl EndorsementHandler {
    pub fn new(
        config: Arc<WebvhConfig>,
        responder: Arc<dyn Responder>,
        store: EndorsementStore,
        signer: DomainEndorser,
        operations: Arc<dyn OperationsManager>,
    ) -> Self {
        Self {
            config,
            responder,
            store,
            signer,
            operations,
        }
    }

    /// Handle one incoming message
    pub async fn dispatch(&self, ctx: &MessageContext, message: EndorsementMessage) -> WebvhResult<()> {
        match message {
            EndorsementMessage::Request(request) => self.on_request(ctx, request).await,
            EndorsementMessage::Response(response) => self.on_response(ctx, response).await,
        }
    }

    /// Endorser side: sign and answer `posted`, or store and answer `pending`
    ///
    /// Emits at most one response. Requests that cannot be endorsed are
    /// logged and dropped without an answer.
    pub async fn on_request(&self, ctx: &MessageContext, request: EndorsementRequest) -> WebvhResult<()> {
        debug!(
            connection_id = %ctx.connection_id,
            did = %request.document.id,
            "Received endorsement request"
        );

        if request.document.first_proof().is_none() {
            error!("No proof found in log entry");
            return Ok(());
        }

        if self.config.auto_endorse {
            self.auto_endorse(ctx, request).await
        } else {
            info!(
                "Auto endorsement is not enabled. The administrator must manually endorse the log entry."
            );

            self.store
                .save(&request.document, &ctx.connection_id, &request.parameters)
                .await?;

            let response = EndorsementResponse::new(
                EndorsementState::Pending,
                request.document,
                request.parameters,
            );
            self.responder
                .send(&response.into(), &ctx.connection_id)
                .await?;
            Ok(())
        }
    }

    async fn auto_endorse(&self, ctx: &MessageContext, request: EndorsementRequest) -> WebvhResult<()> {
        let endorsed = match self.signer.endorse(&request.document).await {
            Ok(endorsed) => endorsed,
            Err(
                e @ (WebvhError::EndorsementKeyNotFound(_)
                | WebvhError::MissingProof(_)
                | WebvhError::Validation(_)),
            ) => {
                error!("{}", e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        info!(did = %endorsed.id, connection_id = %ctx.connection_id, "Log entry endorsed");

        let response =
            EndorsementResponse::new(EndorsementState::Posted, endorsed, request.parameters);
        self.responder
            .send(&response.into(), &ctx.connection_id)
            .await?;
        Ok(())
    }

    /// Author side: hand the outcome to the operations manager unchanged
    pub async fn on_response(&self, ctx: &MessageContext, response: EndorsementResponse) -> WebvhResult<()> {
        info!(
            state = %response.state,
            connection_id = %ctx.connection_id,
            "Received endorsement response"
        );

        self.operations
            .finish_create(response.document, response.state, response.parameters)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::InMemoryAgent,
        db,
        did::{LogEntry, Parameters, ProofSet},
        protocol::ENDORSEMENT_REQUEST,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    const MULTIKEY: &str = "z6MktmrTADAYdesamoqueUx4sV3H52k9ofhAvQeQZPoou17e";
    const CONNECTION: &str = "conn-author";

    #[derive(Default)]
    struct RecordingOperations {
        calls: Mutex<Vec<(LogEntry, EndorsementState, Parameters)>>,
    }

    #[async_trait]
    impl OperationsManager for RecordingOperations {
        async fn finish_create(
            &self,
            document: LogEntry,
            state: EndorsementState,
            parameters: Parameters,
        ) -> WebvhResult<()> {
            self.calls.lock().await.push((document, state, parameters));
            Ok(())
        }
    }

    struct FailingOperations;

    #[async_trait]
    impl OperationsManager for FailingOperations {
        async fn finish_create(
            &self,
            _document: LogEntry,
            _state: EndorsementState,
            _parameters: Parameters,
        ) -> WebvhResult<()> {
            Err(WebvhError::Operations("server unreachable".to_string()))
        }
    }

    async fn handler(
        auto_endorse: bool,
        agent: &Arc<InMemoryAgent>,
        operations: Arc<dyn OperationsManager>,
    ) -> (EndorsementHandler, EndorsementStore) {
        let store = EndorsementStore::new(db::create_memory_pool().await.unwrap());
        let handler = EndorsementHandler::new(
            Arc::new(WebvhConfig::endorser(auto_endorse)),
            agent.clone(),
            store.clone(),
            DomainEndorser::new(agent.clone(), agent.clone()),
            operations,
        );
        (handler, store)
    }

    fn signed_entry() -> LogEntry {
        LogEntry::from_value(json!({
            "@context": ["https://www.w3.org/ns/did/v1"],
            "id": "did:web:example.com%3A8000:prod:1",
            "controller": "did:web:example.com%3A8000:prod:1",
            "proof": [{
                "type": "DataIntegrityProof",
                "cryptosuite": "eddsa-jcs-2022",
                "proofPurpose": "assertionMethod",
                "verificationMethod": "did:key:z6Mkauthor#z6Mkauthor",
                "domain": "example.com%3A8000",
                "challenge": "4f2a",
                "expires": "2026-10-17T00:00:00Z",
                "proofValue": "z3author"
            }]
        }))
        .unwrap()
    }

    fn parameters() -> Parameters {
        let mut parameters = Parameters::new();
        parameters.insert("portable".to_string(), json!(false));
        parameters
    }

    fn request(document: LogEntry) -> EndorsementMessage {
        EndorsementRequest::new(document, parameters()).into()
    }

    #[tokio::test]
    async fn test_auto_endorse_sends_one_posted_response() {
        let agent = Arc::new(InMemoryAgent::new());
        agent.add_key("example.com:8000", MULTIKEY).await;
        let (handler, store) =
            handler(true, &agent, Arc::new(RecordingOperations::default())).await;

        handler
            .dispatch(&MessageContext::new(CONNECTION), request(signed_entry()))
            .await
            .unwrap();

        let outbox = agent.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].connection_id, CONNECTION);

        match &outbox[0].message {
            EndorsementMessage::Response(response) => {
                assert_eq!(response.state, EndorsementState::Posted);
                assert_eq!(response.parameters, parameters());
                let proofs = response.document.proofs();
                assert_eq!(proofs.len(), 2);
                assert_eq!(
                    proofs[1].verification_method(),
                    Some(format!("did:key:{0}#{0}", MULTIKEY).as_str())
                );
                assert_eq!(proofs[1].domain(), Some("example.com%3A8000"));
                assert_eq!(proofs[1].get("challenge"), Some(&json!("4f2a")));
                assert_eq!(proofs[1].get("expires"), Some(&json!("2026-10-17T00:00:00Z")));
            }
            other => panic!("expected response, got {:?}", other),
        }

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_endorse_without_key_sends_nothing() {
        let agent = Arc::new(InMemoryAgent::new());
        let (handler, store) =
            handler(true, &agent, Arc::new(RecordingOperations::default())).await;

        handler
            .dispatch(&MessageContext::new(CONNECTION), request(signed_entry()))
            .await
            .unwrap();

        assert!(agent.outbox().await.is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_without_proof_is_dropped() {
        let agent = Arc::new(InMemoryAgent::new());
        agent.add_key("example.com:8000", MULTIKEY).await;

        for auto_endorse in [true, false] {
            let (handler, store) =
                handler(auto_endorse, &agent, Arc::new(RecordingOperations::default())).await;

            let mut empty = signed_entry();
            empty.proof = ProofSet::Many(Vec::new());
            handler
                .dispatch(&MessageContext::new(CONNECTION), request(empty))
                .await
                .unwrap();
            handler
                .dispatch(
                    &MessageContext::new(CONNECTION),
                    request(LogEntry::new("did:web:example.com:prod:1")),
                )
                .await
                .unwrap();

            assert!(store.list().await.unwrap().is_empty());
        }

        assert!(agent.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_manual_endorsement_stores_and_answers_pending() {
        let agent = Arc::new(InMemoryAgent::new());
        agent.add_key("example.com:8000", MULTIKEY).await;
        let (handler, store) =
            handler(false, &agent, Arc::new(RecordingOperations::default())).await;

        let document = signed_entry();
        handler
            .dispatch(&MessageContext::new(CONNECTION), request(document.clone()))
            .await
            .unwrap();

        let outbox = agent.outbox().await;
        assert_eq!(outbox.len(), 1);
        match &outbox[0].message {
            EndorsementMessage::Response(response) => {
                assert_eq!(response.state, EndorsementState::Pending);
                assert_eq!(response.document, document);
            }
            other => panic!("expected response, got {:?}", other),
        }

        let pending = store.list().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].connection_id, CONNECTION);
        assert_eq!(pending[0].parameters, parameters());
        assert_eq!(
            pending[0].document.to_value().unwrap(),
            document.to_value().unwrap()
        );
    }

    #[tokio::test]
    async fn test_manual_endorsement_keeps_irregular_proof_members() {
        let agent = Arc::new(InMemoryAgent::new());
        let (handler, store) =
            handler(false, &agent, Arc::new(RecordingOperations::default())).await;

        let value = json!({
            "id": "did:web:example.com:prod:2",
            "proof": [{
                "type": "DataIntegrityProof",
                "domain": ["example.com", "example.org"],
                "challenge": null,
                "expires": 1792108800,
                "proofValue": "z3author"
            }]
        });
        let message: EndorsementMessage = serde_json::from_value(json!({
            "@type": ENDORSEMENT_REQUEST,
            "@id": "6f1c0b8e-2f4e-4c55-9d8a-5d1f0a9e7c11",
            "document": value.clone(),
            "parameters": {}
        }))
        .unwrap();

        handler
            .dispatch(&MessageContext::new(CONNECTION), message)
            .await
            .unwrap();

        let pending = store.list().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].document.to_value().unwrap(), value);
    }

    #[tokio::test]
    async fn test_response_is_forwarded_unchanged() {
        let agent = Arc::new(InMemoryAgent::new());
        let operations = Arc::new(RecordingOperations::default());
        let (handler, _) = handler(false, &agent, operations.clone()).await;

        let document = signed_entry();
        let response = EndorsementResponse::new(
            EndorsementState::Posted,
            document.clone(),
            parameters(),
        );
        handler
            .dispatch(&MessageContext::new(CONNECTION), response.into())
            .await
            .unwrap();

        let calls = operations.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (document, EndorsementState::Posted, parameters()));
        assert!(agent.outbox().await.is_empty());
    }

    #[tokio::test]
    async fn test_operations_error_propagates() {
        let agent = Arc::new(InMemoryAgent::new());
        let (handler, _) = handler(false, &agent, Arc::new(FailingOperations)).await;

        let response =
            EndorsementResponse::new(EndorsementState::Pending, signed_entry(), Parameters::new());
        let result = handler
            .dispatch(&MessageContext::new(CONNECTION), response.into())
            .await;

        assert!(matches!(result, Err(WebvhError::Operations(_))));
    }
}
