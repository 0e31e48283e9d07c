//! v1 signatures for sandbox file URLs.
//!
//! The signed string is `path:op:user:accessToken`, with `:expiration`
//! appended when the signature expires. The digest is SHA-256, encoded as
//! standard base64 with the padding stripped, prefixed `v1_`. Servers
//! validate this byte-for-byte.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use sha2::{Digest, Sha256};

/// Signature plus its expiration Unix timestamp (0 = no expiry).
pub(crate) fn get_signature(
    path: &str,
    operation: &str,
    user: &str,
    access_token: &str,
    expiration_secs: Option<i64>,
) -> (String, i64) {
    let expiration = match expiration_secs {
        Some(secs) if secs > 0 => Utc::now().timestamp() + secs,
        _ => 0,
    };
    (
        sign(path, operation, user, access_token, expiration),
        expiration,
    )
}

/// Pure signature over an absolute expiration timestamp.
pub(crate) fn sign(
    path: &str,
    operation: &str,
    user: &str,
    access_token: &str,
    expiration: i64,
) -> String {
    let raw = if expiration == 0 {
        format!("{path}:{operation}:{user}:{access_token}")
    } else {
        format!("{path}:{operation}:{user}:{access_token}:{expiration}")
    };
    let digest = Sha256::digest(raw.as_bytes());
    format!("v1_{}", STANDARD_NO_PAD.encode(digest))
}
