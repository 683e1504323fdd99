/// Log entry endorsement
///
/// Signing with the endorser's domain key, the pending store used when
/// endorsement is manual, and the manager tying them to the agent.

pub mod manager;
pub mod retry;
pub mod signer;
pub mod store;

pub use manager::{EndorsementManager, SetupOutcome};
pub use retry::{poll_until, RetryPolicy};
pub use signer::DomainEndorser;
pub use store::{EndorsementStore, PendingEndorsement};
