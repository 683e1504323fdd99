/// did:webvh log entries and data integrity proofs
///
/// Only the entry `id` is typed. Proofs and every other member are kept as
/// raw JSON and read through accessors, so documents survive a
/// request/response round trip unchanged.

pub mod multikey;

pub use multikey::did_key_verification_method;

use crate::error::{WebvhError, WebvhResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Proof type added by endorsements
pub const DATA_INTEGRITY_PROOF: &str = "DataIntegrityProof";

/// Cryptosuite used for endorsement proofs
pub const ENDORSEMENT_CRYPTOSUITE: &str = "eddsa-jcs-2022";

/// Proof purpose of endorsement proofs
pub const ASSERTION_METHOD: &str = "assertionMethod";

/// Method-specific log entry parameters (opaque to the endorsement core)
pub type Parameters = Map<String, Value>;

/// One revision of a DID document with its proofs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,

    #[serde(default, skip_serializing_if = "ProofSet::is_absent")]
    pub proof: ProofSet,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl LogEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            proof: ProofSet::Absent,
            rest: Map::new(),
        }
    }

    /// First proof attached to the entry, if any
    pub fn first_proof(&self) -> Option<&Proof> {
        self.proofs().first()
    }

    pub fn proofs(&self) -> &[Proof] {
        self.proof.as_slice()
    }

    /// Append a proof, creating the proof set if needed
    pub fn push_proof(&mut self, proof: Proof) {
        self.proof.push(proof);
    }

    /// Parse a log entry from a JSON value
    pub fn from_value(value: Value) -> WebvhResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| WebvhError::Validation(format!("Invalid log entry: {}", e)))
    }

    pub fn to_value(&self) -> WebvhResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// The `proof` member of a log entry, in whatever shape it arrived
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ProofSet {
    #[default]
    Absent,
    Null,
    Single(Proof),
    Many(Vec<Proof>),
    /// Anything that is not a proof object or an array of them
    Other(Value),
}

impl ProofSet {
    pub fn is_absent(&self) -> bool {
        matches!(self, ProofSet::Absent)
    }

    pub fn as_slice(&self) -> &[Proof] {
        match self {
            ProofSet::Single(proof) => std::slice::from_ref(proof),
            ProofSet::Many(proofs) => proofs,
            ProofSet::Absent | ProofSet::Null | ProofSet::Other(_) => &[],
        }
    }

    /// Add a proof; a single proof becomes a proof set
    pub fn push(&mut self, proof: Proof) {
        *self = match std::mem::take(self) {
            ProofSet::Single(first) => ProofSet::Many(vec![first, proof]),
            ProofSet::Many(mut proofs) => {
                proofs.push(proof);
                ProofSet::Many(proofs)
            }
            ProofSet::Absent | ProofSet::Null | ProofSet::Other(_) => ProofSet::Many(vec![proof]),
        };
    }
}

impl Serialize for ProofSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProofSet::Absent | ProofSet::Null => serializer.serialize_unit(),
            ProofSet::Single(proof) => proof.serialize(serializer),
            ProofSet::Many(proofs) => proofs.serialize(serializer),
            ProofSet::Other(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ProofSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => ProofSet::Null,
            Value::Object(members) => ProofSet::Single(Proof(members)),
            Value::Array(items) if items.iter().all(Value::is_object) => ProofSet::Many(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(members) => Some(Proof(members)),
                        _ => None,
                    })
                    .collect(),
            ),
            other => ProofSet::Other(other),
        })
    }
}

/// Data integrity proof, kept member for member as received
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Proof(Map<String, Value>);

impl Proof {
    /// Unsigned proof built from options; the signer fills in `proofValue`
    pub fn from_options(options: &ProofOptions) -> Self {
        let mut proof = Proof::default();
        proof.insert("type", options.proof_type.clone());
        proof.insert("cryptosuite", options.cryptosuite.clone());
        proof.insert("proofPurpose", options.proof_purpose.clone());
        proof.insert("verificationMethod", options.verification_method.clone());
        for (key, value) in [
            ("expires", &options.expires),
            ("domain", &options.domain),
            ("challenge", &options.challenge),
        ] {
            if let Some(value) = value {
                proof.insert(key, value.clone());
            }
        }
        proof
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn members(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str_member(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn proof_type(&self) -> Option<&str> {
        self.str_member("type")
    }

    pub fn cryptosuite(&self) -> Option<&str> {
        self.str_member("cryptosuite")
    }

    pub fn proof_purpose(&self) -> Option<&str> {
        self.str_member("proofPurpose")
    }

    pub fn verification_method(&self) -> Option<&str> {
        self.str_member("verificationMethod")
    }

    pub fn proof_value(&self) -> Option<&str> {
        self.str_member("proofValue")
    }

    /// Domain the proof is bound to. An array domain yields its first entry.
    pub fn domain(&self) -> Option<&str> {
        match self.0.get("domain")? {
            Value::String(domain) => Some(domain),
            Value::Array(domains) => domains.first().and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Options handed to the data integrity signer
///
/// `expires`, `domain` and `challenge` are copied from the author's proof
/// as raw JSON so their shape reaches the endorsement proof unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofOptions {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub cryptosuite: String,
    pub proof_purpose: String,
    pub verification_method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Value>,
}

impl ProofOptions {
    /// Endorsement proof options for `multikey`, carrying over the
    /// expiry, domain and challenge of the author's proof
    pub fn endorsement(multikey: &str, author_proof: &Proof) -> WebvhResult<Self> {
        Ok(Self {
            proof_type: DATA_INTEGRITY_PROOF.to_string(),
            cryptosuite: ENDORSEMENT_CRYPTOSUITE.to_string(),
            proof_purpose: ASSERTION_METHOD.to_string(),
            verification_method: did_key_verification_method(multikey)?,
            expires: author_proof.get("expires").cloned(),
            domain: author_proof.get("domain").cloned(),
            challenge: author_proof.get("challenge").cloned(),
        })
    }
}

/// Registration state of a DID log entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationState {
    Success,
    Pending,
    Posted,
    Finished,
}

impl RegistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationState::Success => "success",
            RegistrationState::Pending => "pending",
            RegistrationState::Posted => "posted",
            RegistrationState::Finished => "finished",
        }
    }
}

impl std::fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percent-decode a proof domain into the key id it is registered under
pub fn url_decoded_domain(domain: &str) -> WebvhResult<String> {
    urlencoding::decode(domain)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| WebvhError::Validation(format!("Invalid domain encoding '{}': {}", domain, e)))
}
