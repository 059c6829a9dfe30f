//! # Cregis callback signature scheme
//!
//! Callbacks arrive over plain HTTP POST with no authentication header. Trust is established
//! solely by a keyed digest carried in the payload's `sign` field:
//!
//! 1. Every parameter whose value is null or empty is dropped, as is the `sign` field itself.
//! 2. The remaining keys are sorted lexicographically.
//! 3. The canonical string is the shared secret followed by each key and value concatenated
//!    directly, with no separators:
//!
//!    ```text
//!    {secret}{key1}{value1}{key2}{value2}...
//!    ```
//!
//! 4. The signature is the MD5 digest of the canonical string, rendered as lowercase hex.
//!
//! The gateway renders hex in either case, so comparison is case-insensitive; it is also
//! constant-time so the check does not leak how much of a forged signature matched.
//!
//! These functions are pure. They can be exercised with fixed parameter maps and known digests.

use md5::{Digest, Md5};
use serde_json::Value;

use crate::cregis_types::SIGNATURE_FIELD;

/// Flatten a callback payload into the `(key, value)` pairs that participate in signing:
/// the `sign` field and all null/empty values are dropped, and the rest are sorted by key.
pub fn signing_params(payload: &Value) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = payload
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(key, _)| key.as_str() != SIGNATURE_FIELD)
                .filter_map(|(key, value)| render_value(value).map(|v| (key.clone(), v)))
                .filter(|(_, value)| !value.is_empty())
                .collect()
        })
        .unwrap_or_default();
    params.sort();
    params
}

/// String rendering of a JSON value for the canonical signing string. Strings are taken verbatim;
/// numbers and booleans use serde_json's canonical formatting; nulls do not participate.
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The expected signature for the given parameters and shared secret.
pub fn callback_signature(params: &[(String, String)], secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    for (key, value) in params {
        hasher.update(key.as_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Verify the signature provided with a callback payload. Returns `false` on any mismatch,
/// including a missing or malformed signature.
pub fn verify_callback_signature(payload: &Value, provided: &str, secret: &str) -> bool {
    if provided.is_empty() {
        return false;
    }
    let expected = callback_signature(&signing_params(payload), secret);
    constant_time_eq(expected.as_bytes(), provided.to_ascii_lowercase().as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn matches_known_digest() {
        let payload = json!({
            "cregis_id": "CR-1001",
            "third_party_id": "ord-1",
            "status": "paid",
            "received_amount": "10.00",
            "tx_hash": "abc",
            "sign": "ignored"
        });
        let sig = callback_signature(&signing_params(&payload), "test-secret");
        assert_eq!(sig, "5959bb4ee49464542b0474c56b17cdf4");
    }

    #[test]
    fn empty_and_null_values_are_dropped() {
        let payload = json!({"a": "1", "b": "", "c": null, "sign": "x"});
        let params = signing_params(&payload);
        assert_eq!(params, vec![("a".to_string(), "1".to_string())]);
        assert_eq!(callback_signature(&params, "k"), "38435cfe0222f21389afa61c215a6baa");
    }

    #[test]
    fn numbers_render_without_quotes() {
        let payload = json!({"pid": 20, "x": "y"});
        assert_eq!(callback_signature(&signing_params(&payload), "s"), "896051837303ceab8d99e54a97c5aafb");
    }

    #[test]
    fn verification_is_case_insensitive_on_hex() {
        let payload = json!({"status": "expired", "order_amount": "25.50", "order_currency": "USDT"});
        assert!(verify_callback_signature(&payload, "ddcfbb29950fbdf2f459ccffe81023cd", "secret123"));
        assert!(verify_callback_signature(&payload, "DDCFBB29950FBDF2F459CCFFE81023CD", "secret123"));
    }

    #[test]
    fn rejects_missing_or_tampered_signatures() {
        let payload = json!({"status": "paid"});
        assert!(!verify_callback_signature(&payload, "", "secret"));
        assert!(!verify_callback_signature(&payload, "00000000000000000000000000000000", "secret"));
        assert!(!verify_callback_signature(&payload, "not-hex-at-all", "secret"));
    }

    #[test]
    fn signature_changes_with_the_secret() {
        let payload = json!({"status": "paid"});
        let a = callback_signature(&signing_params(&payload), "secret-a");
        let b = callback_signature(&signing_params(&payload), "secret-b");
        assert_ne!(a, b);
    }
}
