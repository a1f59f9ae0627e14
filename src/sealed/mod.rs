//! Sealed-state codec for cookies and cross-request payloads.
//!
//! A sealed value is `base64url(nonce || ciphertext)` where the ciphertext is
//! a ChaCha20-Poly1305 encryption of a JSON envelope `{exp, data}`. The codec
//! backs the session cookie, the OAuth CSRF state, and the pending-registration
//! payload; everything that crosses the client and comes back is sealed.
//!
//! Unseal fails closed: wrong key, tampering, expiry, and schema mismatch all
//! surface as a typed [`UnsealError`] so callers are forced to handle the
//! failure arm instead of proceeding with partial data.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const SEAL_AAD: &[u8] = b"hejmo-sealed:v1";

/// Why an opaque value could not be unsealed.
///
/// Callers must treat every variant as "reject the flow"; the variants exist
/// for logging and tests, not for divergent user-facing behavior.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnsealError {
    #[error("sealed value is not valid base64 or is too short")]
    Malformed,
    #[error("sealed value failed authentication")]
    Tampered,
    #[error("sealed value has expired")]
    Expired,
    #[error("sealed payload does not match the expected schema")]
    Schema,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    exp: i64,
    data: serde_json::Value,
}

/// Seals and unseals small structured payloads with a server-held secret.
#[derive(Clone)]
pub struct Sealer {
    key: [u8; 32],
}

impl Sealer {
    /// Derive the sealing key from the configured server secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"hejmo-seal-key:v1");
        hasher.update(secret.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    /// Seal a payload so it stays valid for `ttl`.
    ///
    /// # Errors
    /// Returns an error if serialization or encryption fails.
    pub fn seal<T: Serialize>(&self, payload: &T, ttl: Duration) -> Result<String> {
        let ttl = i64::try_from(ttl.as_secs()).context("ttl does not fit in an i64")?;
        self.seal_until(payload, unix_now() + ttl)
    }

    pub(crate) fn seal_until<T: Serialize>(&self, payload: &T, exp: i64) -> Result<String> {
        let envelope = Envelope {
            exp,
            data: serde_json::to_value(payload).context("failed to serialize sealed payload")?,
        };
        let plaintext =
            serde_json::to_vec(&envelope).context("failed to serialize sealed envelope")?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &plaintext,
                    aad: SEAL_AAD,
                },
            )
            .map_err(|err| anyhow::anyhow!("seal failure: {err}"))?;

        let mut raw = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Unseal an opaque string back into its payload.
    ///
    /// # Errors
    /// Fails closed on bad encoding, tampering, expiry, or schema mismatch.
    pub fn unseal<T: DeserializeOwned>(&self, opaque: &str) -> Result<T, UnsealError> {
        let raw = URL_SAFE_NO_PAD
            .decode(opaque.trim())
            .map_err(|_| UnsealError::Malformed)?;
        if raw.len() < NONCE_LEN {
            return Err(UnsealError::Malformed);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: SEAL_AAD,
                },
            )
            .map_err(|_| UnsealError::Tampered)?;

        let envelope: Envelope =
            serde_json::from_slice(&plaintext).map_err(|_| UnsealError::Schema)?;
        if envelope.exp <= unix_now() {
            return Err(UnsealError::Expired);
        }

        serde_json::from_value(envelope.data).map_err(|_| UnsealError::Schema)
    }
}

/// Current time as unix seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}
