/// Operator endpoints of the endorsement service
///
/// Mounted under `/did/webvh/endorsement`; every route requires `AdminAuth`.
use crate::{
    auth::AdminAuth,
    context::AppContext,
    did::{LogEntry, Parameters, RegistrationState},
    endorsement::{PendingEndorsement, SetupOutcome},
    error::{WebvhError, WebvhResult},
    operations::ENDORSEMENT_WAIT_TIMEOUT,
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build endorsement routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/did/webvh/endorsement/pending", get(get_pending))
        .route("/did/webvh/endorsement/endorse", post(endorse_pending))
        .route("/did/webvh/endorsement/request", post(request_endorsement))
        .route("/did/webvh/endorsement/setup", post(run_setup))
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub results: Vec<PendingEndorsement>,
}

/// List log entries waiting for manual endorsement
pub async fn get_pending(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
) -> WebvhResult<Json<PendingResponse>> {
    let results = ctx.manager.pending().await?;
    Ok(Json(PendingResponse { results }))
}

#[derive(Debug, Deserialize)]
pub struct EndorseQuery {
    pub entry_id: String,
    #[serde(default)]
    pub connection_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EndorseResponse {
    pub status: String,
    pub message: String,
    pub document: LogEntry,
}

/// Endorse a pending log entry and answer its author
pub async fn endorse_pending(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Query(query): Query<EndorseQuery>,
) -> WebvhResult<Json<EndorseResponse>> {
    if query.entry_id.trim().is_empty() {
        return Err(WebvhError::Validation("entry_id cannot be empty".to_string()));
    }

    let document = ctx
        .manager
        .endorse_entry(&query.entry_id, query.connection_id.as_deref())
        .await?;

    Ok(Json(EndorseResponse {
        status: "success".to_string(),
        message: "Endorsement successful.".to_string(),
        document,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EndorsementRequestBody {
    pub document: LogEntry,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Outcome of an endorsement request as seen by the caller
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RequestOutcome {
    Posted {
        document: LogEntry,
        parameters: Parameters,
    },
    Pending {
        document: LogEntry,
        parameters: Parameters,
    },
    Unknown {
        message: String,
    },
}

/// Get a log entry endorsed
///
/// Authors wait briefly for the endorser's answer; endorsers sign directly.
pub async fn request_endorsement(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
    Json(body): Json<EndorsementRequestBody>,
) -> WebvhResult<Json<RequestOutcome>> {
    let waiter = ctx.events.waiter(body.document.id.clone());

    if let Some(document) = ctx
        .manager
        .request_endorsement(body.document, body.parameters.clone())
        .await?
    {
        return Ok(Json(RequestOutcome::Posted {
            document,
            parameters: body.parameters,
        }));
    }

    let outcome = match waiter.wait_for_endorsement(ENDORSEMENT_WAIT_TIMEOUT).await {
        Some(event) if event.state == RegistrationState::Posted => RequestOutcome::Posted {
            document: event.document,
            parameters: event.parameters,
        },
        Some(event) => RequestOutcome::Pending {
            document: event.document,
            parameters: event.parameters,
        },
        None => RequestOutcome::Unknown {
            message: "No immediate response from endorser agent.".to_string(),
        },
    };

    Ok(Json(outcome))
}

/// Re-run endorser connection setup
pub async fn run_setup(
    State(ctx): State<AppContext>,
    _auth: AdminAuth,
) -> WebvhResult<Json<SetupOutcome>> {
    let outcome = ctx.manager.auto_endorsement_setup().await?;
    Ok(Json(outcome))
}
