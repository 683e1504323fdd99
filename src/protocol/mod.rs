/// did-webvh-endorsement/1.0 protocol
///
/// Two messages travel over an established connection: the author's
/// `EndorsementRequest` and the endorser's `EndorsementResponse`. Incoming
/// messages are routed by `EndorsementHandler::dispatch`.

pub mod handler;
pub mod messages;

pub use handler::{EndorsementHandler, MessageContext};
pub use messages::{EndorsementMessage, EndorsementRequest, EndorsementResponse, EndorsementState};

/// Message type of `EndorsementRequest`
pub const ENDORSEMENT_REQUEST: &str = "https://didcomm.org/did-webvh-endorsement/1.0/endorse";

/// Message type of `EndorsementResponse`
pub const ENDORSEMENT_RESPONSE: &str =
    "https://didcomm.org/did-webvh-endorsement/1.0/endorse_response";
