//! Billplz X-Signature scheme.
//!
//! The signed source string is built from every form field except `x_signature`:
//! each pair becomes `key + value`, the pieces are sorted ascending ignoring case and
//! joined with `|`. The signature is the lowercase hex HMAC-SHA256 of that string keyed
//! with the tenant's X-Signature key.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_FIELD: &str = "x_signature";

/// Builds the canonical source string for a set of form fields.
pub fn source_string(fields: &[(String, String)]) -> String {
    let mut pieces: Vec<String> = fields
        .iter()
        .filter(|(key, _)| key != SIGNATURE_FIELD)
        .map(|(key, value)| format!("{}{}", key, value))
        .collect();
    pieces.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    pieces.join("|")
}

/// Computes the hex signature for `fields` with `secret`.
pub fn sign(fields: &[(String, String)], secret: &str) -> String {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(source_string(fields).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `provided` against the expected signature in constant time.
///
/// An empty secret never verifies.
pub fn verify(fields: &[(String, String)], secret: &str, provided: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let expected = sign(fields, secret);
    let provided = provided.trim().to_ascii_lowercase();
    if expected.is_empty() || expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_source_string_sorted_case_insensitive() {
        let fields = pairs(&[
            ("paid", "true"),
            ("id", "W_79pJDk"),
            ("Amount", "200"),
            ("x_signature", "ignored"),
        ]);
        assert_eq!(source_string(&fields), "Amount200|idW_79pJDk|paidtrue");
    }

    #[test]
    fn test_sign_is_hex_sha256_length() {
        let sig = sign(&pairs(&[("id", "abc")]), "secret");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let fields = pairs(&[("id", "bill-1"), ("paid", "true"), ("state", "paid")]);
        let sig = sign(&fields, "x-key");
        assert!(verify(&fields, "x-key", &sig));
        assert!(verify(&fields, "x-key", &sig.to_uppercase()));
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let fields = pairs(&[("id", "bill-1"), ("paid", "false")]);
        let sig = sign(&fields, "x-key");

        let tampered = pairs(&[("id", "bill-1"), ("paid", "true")]);
        assert!(!verify(&tampered, "x-key", &sig));
        assert!(!verify(&fields, "other-key", &sig));
        assert!(!verify(&fields, "x-key", "deadbeef"));
        assert!(!verify(&fields, "", &sig));
    }
}
