use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature on summary webhooks
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Sign a webhook body with HMAC-SHA256.
///
/// Returns `sha256=<hex>`.
pub fn sign_payload(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());

    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
