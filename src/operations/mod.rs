/// Author-side completion of endorsed log entries
///
/// `OperationsManager` receives every endorsement outcome. The provided
/// implementation, `EndorsementEvents`, publishes outcomes on a broadcast
/// channel keyed by DID so a caller that sent a request can wait for it.
use crate::{
    did::{LogEntry, Parameters, RegistrationState},
    error::{WebvhError, WebvhResult},
    protocol::EndorsementState,
};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default time a request waits for the endorser's answer
pub const ENDORSEMENT_WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Events kept for slow subscribers
const EVENT_CAPACITY: usize = 256;

/// Finalizes a log entry once the endorser has answered
#[async_trait]
pub trait OperationsManager: Send + Sync {
    async fn finish_create(
        &self,
        document: LogEntry,
        state: EndorsementState,
        parameters: Parameters,
    ) -> WebvhResult<()>;
}

/// Endorsement outcome for one DID
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EndorsementEvent {
    pub did: String,
    pub state: RegistrationState,
    pub document: LogEntry,
    pub parameters: Parameters,
}

/// Broadcast bus of endorsement outcomes
#[derive(Clone)]
pub struct EndorsementEvents {
    sender: broadcast::Sender<EndorsementEvent>,
}

impl Default for EndorsementEvents {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EndorsementEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every future event
    pub fn subscribe(&self) -> broadcast::Receiver<EndorsementEvent> {
        self.sender.subscribe()
    }

    /// Watch for the outcome of `did`
    ///
    /// Create the waiter before sending the request so an early answer is
    /// not missed.
    pub fn waiter(&self, did: impl Into<String>) -> EndorsementWaiter {
        EndorsementWaiter {
            did: did.into(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event; returns the number of subscribers reached
    pub fn publish(&self, event: EndorsementEvent) -> usize {
        // No subscriber is not an error
        self.sender.send(event).unwrap_or(0)
    }
}

#[async_trait]
impl OperationsManager for EndorsementEvents {
    async fn finish_create(
        &self,
        document: LogEntry,
        state: EndorsementState,
        parameters: Parameters,
    ) -> WebvhResult<()> {
        if document.id.is_empty() {
            return Err(WebvhError::Operations(
                "Endorsed document has no identifier".to_string(),
            ));
        }

        let state = RegistrationState::from(state);
        let did = document.id.clone();
        let reached = self.publish(EndorsementEvent {
            did: did.clone(),
            state,
            document,
            parameters,
        });

        debug!(%did, %state, subscribers = reached, "Endorsement outcome published");
        Ok(())
    }
}

/// Pending wait for one DID's endorsement outcome
pub struct EndorsementWaiter {
    did: String,
    receiver: broadcast::Receiver<EndorsementEvent>,
}

impl EndorsementWaiter {
    /// Wait up to `timeout` for the outcome; `None` when nothing arrived
    pub async fn wait_for_endorsement(mut self, timeout: Duration) -> Option<EndorsementEvent> {
        let did = self.did;
        let receiver = &mut self.receiver;

        let wait = async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.did == did => return Some(event),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Endorsement waiter lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_waiter_receives_matching_event() {
        let events = EndorsementEvents::default();
        let waiter = events.waiter("did:web:example.com:prod:1");

        events
            .finish_create(
                LogEntry::new("did:web:example.com:prod:2"),
                EndorsementState::Posted,
                Parameters::new(),
            )
            .await
            .unwrap();
        events
            .finish_create(
                LogEntry::new("did:web:example.com:prod:1"),
                EndorsementState::Pending,
                Parameters::new(),
            )
            .await
            .unwrap();

        let event = waiter
            .wait_for_endorsement(ENDORSEMENT_WAIT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(event.did, "did:web:example.com:prod:1");
        assert_eq!(event.state, RegistrationState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_times_out() {
        let events = EndorsementEvents::default();
        let waiter = events.waiter("did:web:example.com:prod:1");

        assert!(waiter
            .wait_for_endorsement(ENDORSEMENT_WAIT_TIMEOUT)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let events = EndorsementEvents::default();
        let result = events
            .finish_create(
                LogEntry::new("did:web:example.com:prod:1"),
                EndorsementState::Posted,
                Parameters::new(),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_anonymous_document_is_rejected() {
        let events = EndorsementEvents::default();
        let result = events
            .finish_create(LogEntry::new(""), EndorsementState::Posted, Parameters::new())
            .await;
        assert!(matches!(result, Err(WebvhError::Operations(_))));
    }
}
