/// Out-of-band invitation decoding
use crate::agent::AgentError;
use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query parameters that can carry an encoded invitation
const INVITATION_QUERY_PARAMS: [&str; 2] = ["oob", "c_i"];

/// Out-of-band invitation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OobInvitation {
    #[serde(rename = "@type")]
    pub message_type: String,

    #[serde(rename = "@id")]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub handshake_protocols: Vec<String>,

    #[serde(default)]
    pub services: Vec<Value>,

    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl OobInvitation {
    /// Decode an invitation URL such as `http://host?oob=<base64url json>`
    ///
    /// The URL itself may arrive percent-encoded.
    pub fn from_url(invitation_url: &str) -> Result<Self, AgentError> {
        let trimmed = invitation_url.trim();
        let decoded_url = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            urlencoding::decode(trimmed)
                .map_err(|e| AgentError::InvalidInvitation(format!("Bad URL encoding: {}", e)))?
                .into_owned()
        };

        let url = reqwest::Url::parse(&decoded_url)
            .map_err(|e| AgentError::InvalidInvitation(format!("Invalid invitation URL: {}", e)))?;

        let payload = url
            .query_pairs()
            .find(|(key, _)| INVITATION_QUERY_PARAMS.contains(&key.as_ref()))
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| {
                AgentError::InvalidInvitation("Invitation URL has no 'oob' parameter".to_string())
            })?;

        Self::from_encoded(&payload)
    }

    /// Decode a base64 (url-safe or standard, padding optional) JSON invitation
    pub fn from_encoded(payload: &str) -> Result<Self, AgentError> {
        // Query decoding turns '+' into ' '
        let normalized: String = payload
            .trim()
            .trim_end_matches('=')
            .chars()
            .map(|c| if c == ' ' { '+' } else { c })
            .collect();

        let bytes = URL_SAFE_NO_PAD
            .decode(&normalized)
            .or_else(|_| STANDARD_NO_PAD.decode(&normalized))
            .map_err(|e| AgentError::InvalidInvitation(format!("Invalid base64 payload: {}", e)))?;

        let invitation: OobInvitation = serde_json::from_slice(&bytes)
            .map_err(|e| AgentError::InvalidInvitation(format!("Invalid invitation JSON: {}", e)))?;

        if !invitation.message_type.contains("out-of-band/") {
            return Err(AgentError::InvalidInvitation(format!(
                "Unexpected message type: {}",
                invitation.message_type
            )));
        }

        Ok(invitation)
    }
}
