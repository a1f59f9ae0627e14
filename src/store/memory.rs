//! In-memory [`AuthStore`] for tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AuthStore, EmailTokenKind, EmailTokenRecord, NewUser, OAuthAccount, OAuthProvider,
    RecoveryCodeRecord, StoreError, TwoFactorRecord, User,
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    oauth_accounts: Vec<OAuthAccount>,
    email_tokens: Vec<EmailTokenRecord>,
    two_factor: HashMap<Uuid, TwoFactorRecord>,
    recovery_codes: Vec<RecoveryCodeRecord>,
}

/// Hash-map backed store with the same uniqueness guarantees a relational
/// backend would enforce (unique email, unique provider link).
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .values()
            .any(|user| user.email == new_user.email)
        {
            return Err(StoreError::Conflict("users.email"));
        }
        let user = User {
            id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            email_verified: new_user.email_verified,
            locale: new_user.locale,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_user_by_family_id(&self, family_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|user| user.family_id == family_id)
            .cloned())
    }

    async fn set_email_verified(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.email_verified = true;
        Ok(())
    }

    async fn set_password_hash(
        &self,
        user_id: Uuid,
        password_hash: String,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = Some(password_hash);
        Ok(())
    }

    async fn set_email(&self, user_id: Uuid, email: String) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .values()
            .any(|user| user.id != user_id && user.email == email)
        {
            return Err(StoreError::Conflict("users.email"));
        }
        let user = inner.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.email = email;
        Ok(())
    }

    async fn find_oauth_account(
        &self,
        provider: OAuthProvider,
        provider_account_id: &str,
    ) -> Result<Option<OAuthAccount>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .oauth_accounts
            .iter()
            .find(|account| {
                account.provider == provider && account.provider_account_id == provider_account_id
            })
            .cloned())
    }

    async fn create_oauth_account(
        &self,
        account: OAuthAccount,
    ) -> Result<OAuthAccount, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.oauth_accounts.iter().any(|existing| {
            existing.provider == account.provider
                && existing.provider_account_id == account.provider_account_id
        }) {
            return Err(StoreError::Conflict("oauth_accounts.provider_account"));
        }
        inner.oauth_accounts.push(account.clone());
        Ok(account)
    }

    async fn list_oauth_accounts(&self, user_id: Uuid) -> Result<Vec<OAuthAccount>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .oauth_accounts
            .iter()
            .filter(|account| account.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_oauth_account(
        &self,
        user_id: Uuid,
        provider: OAuthProvider,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.oauth_accounts.len();
        inner
            .oauth_accounts
            .retain(|account| !(account.user_id == user_id && account.provider == provider));
        Ok(inner.oauth_accounts.len() < before)
    }

    async fn insert_email_token(&self, record: EmailTokenRecord) -> Result<(), StoreError> {
        self.inner.write().await.email_tokens.push(record);
        Ok(())
    }

    async fn delete_unused_email_tokens(
        &self,
        user_id: Uuid,
        kind: EmailTokenKind,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.email_tokens.len();
        inner.email_tokens.retain(|token| {
            !(token.user_id == user_id && token.kind == kind && token.used_at.is_none())
        });
        Ok((before - inner.email_tokens.len()) as u64)
    }

    async fn find_email_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<EmailTokenRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .email_tokens
            .iter()
            .find(|token| token.token_hash == token_hash)
            .cloned())
    }

    async fn mark_email_token_used(&self, token_id: Uuid, now: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let token = inner
            .email_tokens
            .iter_mut()
            .find(|token| token.id == token_id)
            .ok_or(StoreError::NotFound)?;
        if token.used_at.is_some() {
            return Ok(false);
        }
        token.used_at = Some(now);
        Ok(true)
    }

    async fn get_two_factor(&self, user_id: Uuid) -> Result<Option<TwoFactorRecord>, StoreError> {
        Ok(self.inner.read().await.two_factor.get(&user_id).cloned())
    }

    async fn upsert_two_factor(&self, record: TwoFactorRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .two_factor
            .insert(record.user_id, record);
        Ok(())
    }

    async fn delete_two_factor(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.two_factor.remove(&user_id);
        inner.recovery_codes.retain(|code| code.user_id != user_id);
        Ok(())
    }

    async fn replace_recovery_codes(
        &self,
        user_id: Uuid,
        code_hashes: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.recovery_codes.retain(|code| code.user_id != user_id);
        inner
            .recovery_codes
            .extend(code_hashes.into_iter().map(|code_hash| RecoveryCodeRecord {
                user_id,
                code_hash,
                used_at: None,
            }));
        Ok(())
    }

    async fn list_unused_recovery_codes(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RecoveryCodeRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .recovery_codes
            .iter()
            .filter(|code| code.user_id == user_id && code.used_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_recovery_code_used(
        &self,
        user_id: Uuid,
        code_hash: &str,
        now: i64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let code = inner
            .recovery_codes
            .iter_mut()
            .find(|code| code.user_id == user_id && code.code_hash == code_hash)
            .ok_or(StoreError::NotFound)?;
        if code.used_at.is_some() {
            return Ok(false);
        }
        code.used_at = Some(now);
        Ok(true)
    }

    async fn count_unused_recovery_codes(&self, user_id: Uuid) -> Result<usize, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .recovery_codes
            .iter()
            .filter(|code| code.user_id == user_id && code.used_at.is_none())
            .count())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: None,
            email_verified: false,
            locale: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn email_uniqueness_is_enforced() {
        let store = MemoryStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        let err = store.create_user(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn oauth_link_uniqueness_is_enforced() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let account = OAuthAccount {
            id: Uuid::new_v4(),
            user_id: user.id,
            provider: OAuthProvider::Google,
            provider_account_id: "g-1".to_string(),
            email: "a@x.com".to_string(),
            display_name: None,
        };
        store.create_oauth_account(account.clone()).await.unwrap();
        let err = store.create_oauth_account(account).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let found = store
            .find_oauth_account(OAuthProvider::Google, "g-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.user_id, user.id);
    }

    #[tokio::test]
    async fn email_token_double_consume_fails() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let token_id = Uuid::new_v4();
        store
            .insert_email_token(EmailTokenRecord {
                id: token_id,
                user_id: user.id,
                kind: EmailTokenKind::VerifyEmail,
                token_hash: vec![1, 2, 3],
                new_email: None,
                expires_at: i64::MAX,
                used_at: None,
            })
            .await
            .unwrap();

        assert!(store.mark_email_token_used(token_id, 100).await.unwrap());
        assert!(!store.mark_email_token_used(token_id, 101).await.unwrap());
    }

    #[tokio::test]
    async fn recovery_codes_replace_and_consume() {
        let store = MemoryStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        store
            .replace_recovery_codes(user.id, vec!["h1".to_string(), "h2".to_string()])
            .await
            .unwrap();
        assert_eq!(store.count_unused_recovery_codes(user.id).await.unwrap(), 2);

        assert!(store
            .mark_recovery_code_used(user.id, "h1", 100)
            .await
            .unwrap());
        assert!(!store
            .mark_recovery_code_used(user.id, "h1", 101)
            .await
            .unwrap());
        assert_eq!(store.count_unused_recovery_codes(user.id).await.unwrap(), 1);

        // Regeneration replaces the whole set, including used markers.
        store
            .replace_recovery_codes(user.id, vec!["h3".to_string()])
            .await
            .unwrap();
        assert_eq!(store.count_unused_recovery_codes(user.id).await.unwrap(), 1);
    }
}
