use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("missing signature header")]
    MissingSignature,
    #[error("signature is not valid base64")]
    MalformedSignature,
    #[error("signature does not match body")]
    BadSignature,
}

/// Verifies the `X-Billing-Signature` header against the raw request body
/// (spec §6 "signed webhook → verify"), HMAC-SHA256 over `secret`.
pub fn verify_webhook_signature(
    secret: &str,
    body: &[u8],
    signature_header: Option<&str>,
) -> Result<(), VerifierError> {
    let provided = signature_header.ok_or(VerifierError::MissingSignature)?;
    let provided_bytes = BASE64
        .decode(provided)
        .map_err(|_| VerifierError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&provided_bytes)
        .map_err(|_| VerifierError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        BASE64.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"type":"checkout_completed"}"#;
        let sig = sign("whsec", body);
        assert!(verify_webhook_signature("whsec", body, Some(&sig)).is_ok());
    }

    #[test]
    fn rejects_missing_header() {
        assert!(matches!(
            verify_webhook_signature("whsec", b"body", None),
            Err(VerifierError::MissingSignature)
        ));
    }

    #[test]
    fn rejects_tampered_body() {
        let sig = sign("whsec", b"original");
        assert!(matches!(
            verify_webhook_signature("whsec", b"tampered", Some(&sig)),
            Err(VerifierError::BadSignature)
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let sig = sign("whsec", b"body");
        assert!(matches!(
            verify_webhook_signature("other", b"body", Some(&sig)),
            Err(VerifierError::BadSignature)
        ));
    }
}
