/// Multikey helpers for did:key verification methods
use crate::error::{WebvhError, WebvhResult};

/// Multibase prefix for base58btc
const BASE58BTC_PREFIX: char = 'z';

/// Self-referencing did:key verification method for a multikey:
/// `did:key:{multikey}#{multikey}`
pub fn did_key_verification_method(multikey: &str) -> WebvhResult<String> {
    validate_multikey(multikey)?;
    Ok(format!("did:key:{0}#{0}", multikey))
}

/// Check that a multikey is base58btc multibase encoded
pub fn validate_multikey(multikey: &str) -> WebvhResult<()> {
    let encoded = multikey.strip_prefix(BASE58BTC_PREFIX).ok_or_else(|| {
        WebvhError::Validation(format!(
            "Multikey must be base58btc encoded (prefix 'z'): {}",
            multikey
        ))
    })?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| WebvhError::Validation(format!("Invalid multikey {}: {}", multikey, e)))?;

    // multicodec varint prefix plus key bytes
    if decoded.len() < 3 {
        return Err(WebvhError::Validation(format!("Multikey too short: {}", multikey)));
    }

    Ok(())
}
