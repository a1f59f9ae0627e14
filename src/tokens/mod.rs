//! Single-use email tokens (verification, password reset, email change).
//!
//! Issuance stores only a SHA-256 hash of the raw token; the raw value goes
//! into the outbound email link and is never persisted or logged. Issuing a
//! new token supersedes any unused token of the same kind for that user.
//! Validation and consumption are deliberately separate steps so callers can
//! validate, apply their side effect, then consume.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::sealed::unix_now;
use crate::store::{AuthStore, EmailTokenKind, EmailTokenRecord, StoreError};

/// Why a token failed validation. Internal signals only; user-facing messages
/// stay generic to avoid token-existence oracles.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token not found")]
    NotFound,
    #[error("token is of a different kind")]
    KindMismatch,
    #[error("token was already used")]
    AlreadyUsed,
    #[error("token has expired")]
    Expired,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues, validates, and consumes single-use email tokens.
#[derive(Clone)]
pub struct TokenVault {
    store: Arc<dyn AuthStore>,
}

impl TokenVault {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Issue a fresh token, superseding unused tokens of the same kind.
    /// Returns the raw token for the email link.
    ///
    /// # Errors
    /// Returns an error if the store rejects the write.
    pub async fn issue(
        &self,
        user_id: Uuid,
        kind: EmailTokenKind,
        new_email: Option<String>,
    ) -> Result<String, TokenError> {
        self.issue_with_ttl(user_id, kind, new_email, kind.ttl_seconds())
            .await
    }

    pub(crate) async fn issue_with_ttl(
        &self,
        user_id: Uuid,
        kind: EmailTokenKind,
        new_email: Option<String>,
        ttl_seconds: i64,
    ) -> Result<String, TokenError> {
        let superseded = self
            .store
            .delete_unused_email_tokens(user_id, kind)
            .await?;
        if superseded > 0 {
            debug!(%user_id, ?kind, superseded, "superseded unused email tokens");
        }

        let raw = generate_token();
        self.store
            .insert_email_token(EmailTokenRecord {
                id: Uuid::new_v4(),
                user_id,
                kind,
                token_hash: hash_token(&raw),
                new_email,
                expires_at: unix_now() + ttl_seconds,
                used_at: None,
            })
            .await?;
        Ok(raw)
    }

    /// Validate a raw token against a kind without consuming it.
    ///
    /// # Errors
    /// The four failure conditions are distinct so callers can log precisely.
    pub async fn validate(
        &self,
        raw: &str,
        kind: EmailTokenKind,
    ) -> Result<EmailTokenRecord, TokenError> {
        let record = self
            .store
            .find_email_token(&hash_token(raw.trim()))
            .await?
            .ok_or(TokenError::NotFound)?;
        if record.kind != kind {
            return Err(TokenError::KindMismatch);
        }
        if record.used_at.is_some() {
            return Err(TokenError::AlreadyUsed);
        }
        if record.expires_at <= unix_now() {
            return Err(TokenError::Expired);
        }
        Ok(record)
    }

    /// Mark a previously validated token as used.
    ///
    /// # Errors
    /// Fails with [`TokenError::AlreadyUsed`] if another request consumed it
    /// between validation and consumption.
    pub async fn consume(&self, token_id: Uuid) -> Result<(), TokenError> {
        match self.store.mark_email_token_used(token_id, unix_now()).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TokenError::AlreadyUsed),
            Err(StoreError::NotFound) => Err(TokenError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a raw token; lookups compare hashes, never raw values.
fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewUser};

    async fn vault_and_user() -> (TokenVault, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                email: "a@x.com".to_string(),
                password_hash: None,
                email_verified: false,
                locale: "en".to_string(),
            })
            .await
            .unwrap();
        (TokenVault::new(store), user.id)
    }

    #[tokio::test]
    async fn issue_validate_consume_round_trip() {
        let (vault, user_id) = vault_and_user().await;
        let raw = vault
            .issue(user_id, EmailTokenKind::VerifyEmail, None)
            .await
            .unwrap();

        let record = vault
            .validate(&raw, EmailTokenKind::VerifyEmail)
            .await
            .unwrap();
        assert_eq!(record.user_id, user_id);

        vault.consume(record.id).await.unwrap();
        let err = vault
            .validate(&raw, EmailTokenKind::VerifyEmail)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::AlreadyUsed));
    }

    #[tokio::test]
    async fn issuing_supersedes_previous_unused_token() {
        let (vault, user_id) = vault_and_user().await;
        let first = vault
            .issue(user_id, EmailTokenKind::VerifyEmail, None)
            .await
            .unwrap();
        let second = vault
            .issue(user_id, EmailTokenKind::VerifyEmail, None)
            .await
            .unwrap();

        let err = vault
            .validate(&first, EmailTokenKind::VerifyEmail)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
        assert!(vault
            .validate(&second, EmailTokenKind::VerifyEmail)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn supersession_is_per_kind() {
        let (vault, user_id) = vault_and_user().await;
        let verify = vault
            .issue(user_id, EmailTokenKind::VerifyEmail, None)
            .await
            .unwrap();
        let reset = vault
            .issue(user_id, EmailTokenKind::PasswordReset, None)
            .await
            .unwrap();

        assert!(vault
            .validate(&verify, EmailTokenKind::VerifyEmail)
            .await
            .is_ok());
        assert!(vault
            .validate(&reset, EmailTokenKind::PasswordReset)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn kind_mismatch_is_distinct() {
        let (vault, user_id) = vault_and_user().await;
        let raw = vault
            .issue(user_id, EmailTokenKind::PasswordReset, None)
            .await
            .unwrap();
        let err = vault
            .validate(&raw, EmailTokenKind::VerifyEmail)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::KindMismatch));
    }

    #[tokio::test]
    async fn expired_token_is_distinct() {
        let (vault, user_id) = vault_and_user().await;
        let raw = vault
            .issue_with_ttl(user_id, EmailTokenKind::VerifyEmail, None, -10)
            .await
            .unwrap();
        let err = vault
            .validate(&raw, EmailTokenKind::VerifyEmail)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[tokio::test]
    async fn double_consume_fails() {
        let (vault, user_id) = vault_and_user().await;
        let raw = vault
            .issue(user_id, EmailTokenKind::VerifyEmail, None)
            .await
            .unwrap();
        let record = vault
            .validate(&raw, EmailTokenKind::VerifyEmail)
            .await
            .unwrap();
        vault.consume(record.id).await.unwrap();
        assert!(matches!(
            vault.consume(record.id).await.unwrap_err(),
            TokenError::AlreadyUsed
        ));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (vault, _user_id) = vault_and_user().await;
        let err = vault
            .validate("no-such-token", EmailTokenKind::VerifyEmail)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::NotFound));
    }
}
