/// API routes and handlers
pub mod didcomm;
pub mod endorsement;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(didcomm::routes())
        .merge(endorsement::routes())
}
