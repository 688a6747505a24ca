//! GitHub webhook signature verification

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

fn keyed_mac(secret: &[u8], payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(mac)
}

/// Hex HMAC-SHA256 of `payload`, as GitHub puts after `sha256=`.
#[cfg(test)]
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> Option<String> {
    keyed_mac(secret, payload).map(|mac| hex::encode(mac.finalize().into_bytes()))
}

/// Check an `X-Hub-Signature-256` header value against the raw body.
///
/// Comparison is constant time; a header without the `sha256=` prefix or
/// with invalid hex never verifies.
pub fn verify_signature(secret: &[u8], payload: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    keyed_mac(secret, payload).is_some_and(|mac| mac.verify_slice(&expected).is_ok())
}
