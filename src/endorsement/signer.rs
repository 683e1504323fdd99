/// Domain-bound endorsement signing
use crate::{
    agent::{DataIntegrity, KeyManager},
    did::{url_decoded_domain, LogEntry, ProofOptions},
    error::{WebvhError, WebvhResult},
};
use std::sync::Arc;
use tracing::debug;

/// Adds the endorser's proof using the key registered under the entry's domain
#[derive(Clone)]
pub struct DomainEndorser {
    keys: Arc<dyn KeyManager>,
    data_integrity: Arc<dyn DataIntegrity>,
}

impl DomainEndorser {
    pub fn new(keys: Arc<dyn KeyManager>, data_integrity: Arc<dyn DataIntegrity>) -> Self {
        Self {
            keys,
            data_integrity,
        }
    }

    /// Return `document` with an endorsement proof appended
    ///
    /// The key id is the percent-decoded domain of the document's first
    /// proof. No key is ever created here.
    pub async fn endorse(&self, document: &LogEntry) -> WebvhResult<LogEntry> {
        let author_proof = document
            .first_proof()
            .ok_or_else(|| WebvhError::MissingProof(document.id.clone()))?;

        let domain = author_proof.domain().ok_or_else(|| {
            WebvhError::Validation(format!("Proof of {} has no string domain", document.id))
        })?;
        let kid = url_decoded_domain(domain)?;

        if !self.keys.key_exists(&kid).await? {
            return Err(WebvhError::EndorsementKeyNotFound(kid));
        }

        let key = self.keys.get_by_kid(&kid).await?;
        let options = ProofOptions::endorsement(&key.multikey, author_proof)?;

        debug!(did = %document.id, kid = %kid, "Adding endorsement proof");

        Ok(self.data_integrity.add_proof(document, &options).await?)
    }
}
