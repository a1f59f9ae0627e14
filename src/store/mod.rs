//! Abstract record store for identity data.
//!
//! The durable relational store is an external collaborator; the service only
//! talks to it through [`AuthStore`]. Implementations are injected at wiring
//! time (no module-level client globals), which keeps every flow testable
//! against [`MemoryStore`].

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (duplicate email or provider link).
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// External identity providers the household app can link.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Microsoft,
}

impl OAuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "microsoft" => Some(Self::Microsoft),
            _ => None,
        }
    }
}

/// A household account holder. Email is stored case-folded and unique.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub family_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub locale: String,
}

/// Fields required to create a user.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub locale: String,
}

/// One external provider identity linked to exactly one user.
///
/// `(provider, provider_account_id)` is unique; provider email and display
/// name are captured at link time for audit/display only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: OAuthProvider,
    pub provider_account_id: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Kinds of single-use email tokens and their validity windows.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTokenKind {
    VerifyEmail,
    PasswordReset,
    EmailChange,
}

impl EmailTokenKind {
    /// Per-kind TTL in seconds.
    #[must_use]
    pub fn ttl_seconds(self) -> i64 {
        match self {
            Self::VerifyEmail | Self::EmailChange => 24 * 60 * 60,
            Self::PasswordReset => 60 * 60,
        }
    }
}

/// Stored email token: only the hash of the raw token is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EmailTokenKind,
    pub token_hash: Vec<u8>,
    /// For email-change tokens: the address being switched to.
    pub new_email: Option<String>,
    pub expires_at: i64,
    pub used_at: Option<i64>,
}

/// Encrypted TOTP secret for a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TwoFactorRecord {
    pub user_id: Uuid,
    pub secret_ciphertext: Vec<u8>,
    pub confirmed: bool,
}

/// One hashed recovery code, independently markable as used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryCodeRecord {
    pub user_id: Uuid,
    pub code_hash: String,
    pub used_at: Option<i64>,
}

/// The injected record-store API. All methods are plain async I/O; the store
/// enforces the uniqueness constraints the flows rely on.
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// The account holder behind a household; session cookies carry the
    /// family id, not the user id.
    async fn find_user_by_family_id(&self, family_id: Uuid) -> Result<Option<User>, StoreError>;
    async fn set_email_verified(&self, user_id: Uuid) -> Result<(), StoreError>;
    async fn set_password_hash(&self, user_id: Uuid, password_hash: String)
        -> Result<(), StoreError>;
    async fn set_email(&self, user_id: Uuid, email: String) -> Result<(), StoreError>;

    async fn find_oauth_account(
        &self,
        provider: OAuthProvider,
        provider_account_id: &str,
    ) -> Result<Option<OAuthAccount>, StoreError>;
    async fn create_oauth_account(
        &self,
        account: OAuthAccount,
    ) -> Result<OAuthAccount, StoreError>;
    async fn list_oauth_accounts(&self, user_id: Uuid) -> Result<Vec<OAuthAccount>, StoreError>;
    async fn delete_oauth_account(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<bool, StoreError>;

    async fn insert_email_token(&self, record: EmailTokenRecord) -> Result<(), StoreError>;
    async fn delete_unused_email_tokens(
        &self,
        user_id: Uuid,
        kind: EmailTokenKind,
    ) -> Result<u64, StoreError>;
    async fn find_email_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<EmailTokenRecord>, StoreError>;
    /// Mark a token used; returns `false` when it was already consumed.
    async fn mark_email_token_used(&self, token_id: Uuid, now: i64) -> Result<bool, StoreError>;

    async fn get_two_factor(&self, user_id: Uuid) -> Result<Option<TwoFactorRecord>, StoreError>;
    async fn upsert_two_factor(&self, record: TwoFactorRecord) -> Result<(), StoreError>;
    async fn delete_two_factor(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Replace the whole recovery-code set for a user.
    async fn replace_recovery_codes(
        &self,
        user_id: Uuid,
        code_hashes: Vec<String>,
    ) -> Result<(), StoreError>;
    async fn list_unused_recovery_codes(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecoveryCodeRecord>, StoreError>;
    /// Mark one code used; returns `false` when it was already consumed.
    async fn mark_recovery_code_used(
        &self,
        user_id: Uuid,
        code_hash: &str,
        now: i64,
    ) -> Result<bool, StoreError>;
    async fn count_unused_recovery_codes(&self, user_id: Uuid) -> Result<usize, StoreError>;
}
