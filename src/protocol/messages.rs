/// Endorsement protocol messages
use crate::did::{LogEntry, Parameters, RegistrationState};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Ask an endorser to co-sign a log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndorsementRequest {
    #[serde(rename = "@id", default = "new_message_id")]
    pub id: String,

    pub document: LogEntry,

    #[serde(default)]
    pub parameters: Parameters,
}

impl EndorsementRequest {
    pub fn new(document: LogEntry, parameters: Parameters) -> Self {
        Self {
            id: new_message_id(),
            document,
            parameters,
        }
    }
}

/// Outcome of an endorsement request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndorsementState {
    /// Endorsed; the document carries the endorser's proof
    Posted,
    /// Stored for manual review by the endorser's operator
    Pending,
}

impl EndorsementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndorsementState::Posted => "posted",
            EndorsementState::Pending => "pending",
        }
    }
}

impl fmt::Display for EndorsementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EndorsementState> for RegistrationState {
    fn from(state: EndorsementState) -> Self {
        match state {
            EndorsementState::Posted => RegistrationState::Posted,
            EndorsementState::Pending => RegistrationState::Pending,
        }
    }
}

/// Endorser's answer to an `EndorsementRequest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndorsementResponse {
    #[serde(rename = "@id", default = "new_message_id")]
    pub id: String,

    pub state: EndorsementState,

    pub document: LogEntry,

    #[serde(default)]
    pub parameters: Parameters,
}

impl EndorsementResponse {
    pub fn new(state: EndorsementState, document: LogEntry, parameters: Parameters) -> Self {
        Self {
            id: new_message_id(),
            state,
            document,
            parameters,
        }
    }
}

/// Every message of the did-webvh-endorsement protocol, keyed by `@type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum EndorsementMessage {
    #[serde(
        rename = "https://didcomm.org/did-webvh-endorsement/1.0/endorse",
        alias = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/did-webvh-endorsement/1.0/endorse"
    )]
    Request(EndorsementRequest),

    #[serde(
        rename = "https://didcomm.org/did-webvh-endorsement/1.0/endorse_response",
        alias = "did:sov:BzCbsNYhMrjHiqZDTUASHg;spec/did-webvh-endorsement/1.0/endorse_response"
    )]
    Response(EndorsementResponse),
}

impl EndorsementMessage {
    /// Fully qualified message type
    pub fn message_type(&self) -> &'static str {
        match self {
            EndorsementMessage::Request(_) => super::ENDORSEMENT_REQUEST,
            EndorsementMessage::Response(_) => super::ENDORSEMENT_RESPONSE,
        }
    }

    pub fn document(&self) -> &LogEntry {
        match self {
            EndorsementMessage::Request(request) => &request.document,
            EndorsementMessage::Response(response) => &response.document,
        }
    }
}

impl From<EndorsementRequest> for EndorsementMessage {
    fn from(request: EndorsementRequest) -> Self {
        EndorsementMessage::Request(request)
    }
}

impl From<EndorsementResponse> for EndorsementMessage {
    fn from(response: EndorsementResponse) -> Self {
        EndorsementMessage::Response(response)
    }
}
