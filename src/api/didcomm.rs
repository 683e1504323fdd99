/// Inbound protocol messages relayed by the agent
use crate::{
    auth::InboundAuth,
    context::AppContext,
    error::{WebvhError, WebvhResult},
    protocol::{EndorsementMessage, MessageContext},
};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

pub fn routes() -> Router<AppContext> {
    Router::new().route("/didcomm/inbound", post(receive_message))
}

#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub connection_id: String,
    pub message: Value,
}

/// Dispatch one protocol message received on a connection
///
/// Only the agent may relay messages; `connection_id` is trusted as the
/// connection the agent received the message on.
pub async fn receive_message(
    _auth: InboundAuth,
    State(ctx): State<AppContext>,
    Json(inbound): Json<InboundMessage>,
) -> WebvhResult<(StatusCode, Json<Value>)> {
    let message: EndorsementMessage = serde_json::from_value(inbound.message)
        .map_err(|e| WebvhError::Validation(format!("Unsupported message: {}", e)))?;
    let message_type = message.message_type();
    debug!(
        connection_id = %inbound.connection_id,
        did = %message.document().id,
        message_type,
        "Inbound message"
    );

    let msg_ctx = MessageContext::new(inbound.connection_id);
    if let Err(e) = ctx.handler.dispatch(&msg_ctx, message).await {
        error!(
            connection_id = %msg_ctx.connection_id,
            message_type,
            "Failed to handle message: {}",
            e
        );
        return Err(e);
    }

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
}
