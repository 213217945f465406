use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify the `X-Line-Signature` header: base64 of HMAC-SHA256 over the
/// raw request body with the channel secret. Must run before the body is
/// parsed; an unverifiable request is dropped, not processed.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature_header.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Signature for a body, as the platform would send it. Used by tests and
/// local tooling.
pub fn sign_body(channel_secret: &str, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::{sign_body, verify_signature};

    #[test]
    fn signed_body_verifies() {
        let body = br#"{"events":[]}"#;
        let signature = sign_body("channel-secret", body);
        assert!(verify_signature("channel-secret", body, &signature));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let signature = sign_body("channel-secret", br#"{"events":[]}"#);
        assert!(!verify_signature("channel-secret", br#"{"events":[{}]}"#, &signature));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let body = br#"{"events":[]}"#;
        let signature = sign_body("channel-secret", body);
        assert!(!verify_signature("other-secret", body, &signature));
    }

    #[test]
    fn garbage_header_fails_closed() {
        assert!(!verify_signature("channel-secret", b"{}", "not base64 !!!"));
        assert!(!verify_signature("channel-secret", b"{}", ""));
    }
}
