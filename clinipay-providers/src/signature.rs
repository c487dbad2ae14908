//! Webhook authenticity primitives.
//!
//! The card gateway signs each webhook with HMAC-SHA512 over the exact raw
//! request body, transmitted hex-encoded. Comparison is constant-time. The
//! mobile-money rail carries no provider signature, so its callback URL
//! carries a shared-secret token instead, compared the same way.

use sha2::Sha512;
use subtle::ConstantTimeEq;

/// Signs a webhook payload using HMAC-SHA512.
pub fn sign_card_webhook(payload: &[u8], secret: &str) -> String {
    use hmac::{Hmac, Mac};

    type HmacSha512 = Hmac<Sha512>;

    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a card webhook signature using constant-time comparison.
pub fn verify_card_webhook(payload: &[u8], signature: &str, secret: &str) -> bool {
    let expected = sign_card_webhook(payload, secret);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Constant-time equality for the mobile-money callback token.
pub fn constant_time_token_eq(supplied: &str, expected: &str) -> bool {
    supplied.as_bytes().ct_eq(expected.as_bytes()).into()
}
