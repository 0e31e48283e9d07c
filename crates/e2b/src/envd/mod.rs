//! Wire messages for the envd `process.Process` and `filesystem.Filesystem`
//! services, in protoJSON conventions: camelCase fields, base64 `bytes`,
//! oneof as at-most-one populated optional field.

pub(crate) mod filesystem;
pub(crate) mod process;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

/// Decodes a protoJSON `bytes` field. Undecodable payloads are dropped with
/// a warning rather than poisoning the stream.
pub(crate) fn decode_bytes(field: &str) -> Option<Vec<u8>> {
    match B64.decode(field) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::warn!(target = "e2b::rpc", %err, "undecodable bytes field");
            None
        }
    }
}

pub(crate) fn encode_bytes(data: &[u8]) -> String {
    B64.encode(data)
}
