use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Computes the `sha256=<hex>` signature GitHub sends for `payload`.
pub fn github_signature(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Helper function for verifying GitHub webhook signature.
///
/// `payload` must be the exact bytes GitHub signed, i.e. the raw request body.
/// Returns `false` for empty, unprefixed or malformed headers; never panics.
pub fn verify_github_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    // Expected format: "sha256=..."
    let Some(git_signature) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
        debug!("Signature header missing '{}' prefix", SIGNATURE_PREFIX);
        return false;
    };
    let Ok(git_signature_bytes) = hex::decode(git_signature) else {
        debug!("Signature header is not valid hex");
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    // Constant-time comparison, length included
    mac.verify_slice(&git_signature_bytes).is_ok()
}
