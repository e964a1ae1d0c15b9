//! HMAC-SHA256 signatures on hub callbacks (`X-Hub-Signature: sha256=<hex>`).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-hub-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("unsupported signature format")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
}

fn mac(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail.
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size")
}

/// Header value for `body` signed with `secret`.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut m = mac(secret);
    m.update(body);
    format!("sha256={}", hex::encode(m.finalize().into_bytes()))
}

/// Verify a header value against `body` in constant time.
pub fn verify(body: &[u8], secret: &str, header: Option<&str>) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;
    let hex_digest = header
        .trim()
        .strip_prefix("sha256=")
        .ok_or(SignatureError::Malformed)?;
    let expected = hex::decode(hex_digest).map_err(|_| SignatureError::Malformed)?;

    let mut m = mac(secret);
    m.update(body);
    m.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic() {
        let a = sign(b"payload", "secret");
        let b = sign(b"payload", "secret");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));
        assert_ne!(a, sign(b"payload", "other"));
    }

    #[test]
    fn verifies_own_signature() {
        let header = sign(b"{\"data\":[]}", "secret");
        assert_eq!(verify(b"{\"data\":[]}", "secret", Some(&header)), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let header = sign(b"{\"data\":[]}", "secret");
        assert_eq!(
            verify(b"{\"data\":[1]}", "secret", Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        assert_eq!(verify(b"x", "s", None), Err(SignatureError::Missing));
        assert_eq!(
            verify(b"x", "s", Some("sha1=abcd")),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify(b"x", "s", Some("sha256=zz")),
            Err(SignatureError::Malformed)
        );
    }
}
