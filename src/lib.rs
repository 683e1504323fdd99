/// did:webvh log entry endorsement
///
/// An author agent sends candidate log entries to the endorser holding the
/// signing authority for their domain. The endorser signs them right away
/// or keeps them for its operator, and answers over the same connection.

pub mod agent;
pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod did;
pub mod endorsement;
pub mod error;
pub mod operations;
pub mod protocol;
pub mod server;

pub use context::AppContext;
pub use error::{WebvhError, WebvhResult};
