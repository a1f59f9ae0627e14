//! The OAuth account-resolution decision procedure.

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::ExternalIdentity;
use crate::email::{self, EmailSender};
use crate::store::{AuthStore, NewUser, OAuthAccount, StoreError, User};

/// What a resolved assertion means for the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// A known identity; start an Account session for this user.
    Login { user_id: Uuid },
    /// The identity was auto-linked to an existing user by verified email.
    LinkAndLogin { user_id: Uuid },
    /// Nothing matched; route to the registration wizard with the assertion.
    Register { identity: ExternalIdentity },
}

/// Maps external identity assertions to login / link / register decisions.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn AuthStore>,
    email_sender: Arc<dyn EmailSender>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, email_sender: Arc<dyn EmailSender>) -> Self {
        Self {
            store,
            email_sender,
        }
    }

    /// Resolve an assertion, in strict priority order:
    ///
    /// 1. An explicit link request from a live session wins; the caller is
    ///    already trusted, so no email matching happens here.
    /// 2. A returning `(provider, provider_account_id)` pair logs in.
    /// 3. A *verified* asserted email matching an existing user auto-links
    ///    (and upgrades that user's own verification flag).
    /// 4. Otherwise the caller must register.
    ///
    /// Unverified asserted emails never reach step 3; that ordering is what
    /// prevents account takeover through a provider that does not verify
    /// addresses.
    ///
    /// # Errors
    /// Returns an error if the store fails or a link conflicts with an
    /// existing link owned by another user.
    pub async fn resolve(
        &self,
        identity: ExternalIdentity,
        link_to_user_id: Option<Uuid>,
    ) -> Result<Resolution> {
        if let Some(user_id) = link_to_user_id {
            return self.link_to_session_user(identity, user_id).await;
        }

        if let Some(account) = self
            .store
            .find_oauth_account(identity.provider, &identity.provider_account_id)
            .await
            .context("failed to look up oauth account")?
        {
            return Ok(Resolution::Login {
                user_id: account.user_id,
            });
        }

        if identity.email_verified {
            let email = identity.email.trim().to_lowercase();
            if let Some(user) = self
                .store
                .find_user_by_email(&email)
                .await
                .context("failed to look up user by email")?
            {
                return self.auto_link(identity, &user).await;
            }
        }

        Ok(Resolution::Register { identity })
    }

    /// Create a user + first link from a pending-registration payload.
    /// A concurrent registration for the same email resolves as login
    /// instead of failing (the store's email uniqueness is the arbiter).
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn complete_registration(
        &self,
        identity: ExternalIdentity,
        locale: String,
    ) -> Result<User> {
        let email = identity.email.trim().to_lowercase();
        let user = match self
            .store
            .create_user(NewUser {
                email: email.clone(),
                password_hash: None,
                email_verified: identity.email_verified,
                locale,
            })
            .await
        {
            Ok(user) => user,
            Err(StoreError::Conflict(_)) => {
                // Lost the race against a concurrent signup; retry as login.
                warn!("registration conflict, retrying as login");
                self.store
                    .find_user_by_email(&email)
                    .await
                    .context("failed to re-read user after conflict")?
                    .ok_or_else(|| anyhow!("user vanished after email conflict"))?
            }
            Err(err) => return Err(err).context("failed to create user"),
        };

        self.create_link(&identity, user.id).await?;
        Ok(user)
    }

    async fn link_to_session_user(
        &self,
        identity: ExternalIdentity,
        user_id: Uuid,
    ) -> Result<Resolution> {
        match self.create_link(&identity, user_id).await {
            Ok(()) => {}
            Err(err) => {
                // Idempotent re-link from the same user is fine; anything
                // else (the provider identity belongs to someone else) fails.
                let existing = self
                    .store
                    .find_oauth_account(identity.provider, &identity.provider_account_id)
                    .await
                    .context("failed to re-check oauth account")?;
                match existing {
                    Some(account) if account.user_id == user_id => {
                        return Ok(Resolution::Login { user_id });
                    }
                    _ => return Err(err),
                }
            }
        }

        self.notify_linked(user_id, identity.provider).await;
        Ok(Resolution::Login { user_id })
    }

    async fn auto_link(&self, identity: ExternalIdentity, user: &User) -> Result<Resolution> {
        if let Err(err) = self.create_link(&identity, user.id).await {
            // Two callbacks for the same identity raced; whoever won owns the
            // link now, so fall back to a plain login for that owner.
            let existing = self
                .store
                .find_oauth_account(identity.provider, &identity.provider_account_id)
                .await
                .context("failed to re-check oauth account")?;
            return match existing {
                Some(account) => Ok(Resolution::Login {
                    user_id: account.user_id,
                }),
                None => Err(err),
            };
        }

        if !user.email_verified {
            // The provider vouched for this address; trust its verification.
            self.store
                .set_email_verified(user.id)
                .await
                .context("failed to mark email verified")?;
        }

        info!(user_id = %user.id, provider = identity.provider.as_str(), "auto-linked oauth account");
        self.notify_linked(user.id, identity.provider).await;
        Ok(Resolution::LinkAndLogin { user_id: user.id })
    }

    async fn create_link(&self, identity: &ExternalIdentity, user_id: Uuid) -> Result<()> {
        self.store
            .create_oauth_account(OAuthAccount {
                id: Uuid::new_v4(),
                user_id,
                provider: identity.provider,
                provider_account_id: identity.provider_account_id.clone(),
                email: identity.email.trim().to_lowercase(),
                display_name: identity.display_name.clone(),
            })
            .await
            .context("failed to create oauth account")?;
        Ok(())
    }

    /// Best-effort notification; a failed email never fails the resolution.
    async fn notify_linked(&self, user_id: Uuid, provider: crate::store::OAuthProvider) {
        match self.store.find_user_by_id(user_id).await {
            Ok(Some(user)) => {
                email::send_detached(
                    Arc::clone(&self.email_sender),
                    email::oauth_linked_message(&user.email, provider),
                );
            }
            Ok(None) => {}
            Err(err) => warn!("skipping link notification: {err}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::email::LogEmailSender;
    use crate::store::{MemoryStore, OAuthProvider};

    fn google_identity(email: &str, verified: bool) -> ExternalIdentity {
        ExternalIdentity {
            provider: OAuthProvider::Google,
            provider_account_id: "g-123".to_string(),
            email: email.to_string(),
            email_verified: verified,
            display_name: Some("A. Person".to_string()),
        }
    }

    fn resolver(store: &Arc<MemoryStore>) -> IdentityResolver {
        IdentityResolver::new(
            Arc::clone(store) as Arc<dyn AuthStore>,
            Arc::new(LogEmailSender),
        )
    }

    async fn user_with_email(store: &MemoryStore, email: &str, verified: bool) -> User {
        store
            .create_user(NewUser {
                email: email.to_string(),
                password_hash: None,
                email_verified: verified,
                locale: "en".to_string(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn returning_identity_logs_in_regardless_of_asserted_email() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);
        let user = user_with_email(&store, "a@x.com", true).await;

        let first = resolver
            .resolve(google_identity("a@x.com", true), Some(user.id))
            .await
            .unwrap();
        assert_eq!(first, Resolution::Login { user_id: user.id });

        // Same provider account, completely different asserted email.
        let second = resolver
            .resolve(google_identity("other@y.com", false), None)
            .await
            .unwrap();
        assert_eq!(second, Resolution::Login { user_id: user.id });
    }

    #[tokio::test]
    async fn verified_email_auto_links_and_verifies_user() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);
        let user = user_with_email(&store, "a@x.com", false).await;

        let resolution = resolver
            .resolve(google_identity("a@x.com", true), None)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::LinkAndLogin { user_id: user.id });

        let reloaded = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.email_verified);
        assert!(store
            .find_oauth_account(OAuthProvider::Google, "g-123")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn unverified_email_never_auto_links() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);
        let _user = user_with_email(&store, "a@x.com", true).await;

        let identity = google_identity("a@x.com", false);
        let resolution = resolver.resolve(identity.clone(), None).await.unwrap();
        assert_eq!(resolution, Resolution::Register { identity });
    }

    #[tokio::test]
    async fn email_lookup_is_case_folded() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);
        let user = user_with_email(&store, "a@x.com", true).await;

        let resolution = resolver
            .resolve(google_identity("A@X.COM", true), None)
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::LinkAndLogin { user_id: user.id });
    }

    #[tokio::test]
    async fn unknown_identity_registers() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);

        let identity = google_identity("new@x.com", true);
        let resolution = resolver.resolve(identity.clone(), None).await.unwrap();
        assert_eq!(resolution, Resolution::Register { identity });
    }

    #[tokio::test]
    async fn explicit_link_skips_email_matching() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);
        let user = user_with_email(&store, "a@x.com", true).await;

        // Asserted email differs from the account email; linking is allowed
        // because the caller holds a live session.
        let resolution = resolver
            .resolve(google_identity("elsewhere@y.com", false), Some(user.id))
            .await
            .unwrap();
        assert_eq!(resolution, Resolution::Login { user_id: user.id });
    }

    #[tokio::test]
    async fn linking_someone_elses_identity_fails() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);
        let owner = user_with_email(&store, "owner@x.com", true).await;
        let intruder = user_with_email(&store, "intruder@x.com", true).await;

        resolver
            .resolve(google_identity("owner@x.com", true), Some(owner.id))
            .await
            .unwrap();
        let result = resolver
            .resolve(google_identity("owner@x.com", true), Some(intruder.id))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn registration_conflict_retries_as_login() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(&store);
        let existing = user_with_email(&store, "a@x.com", true).await;

        let user = resolver
            .complete_registration(google_identity("a@x.com", true), "en".to_string())
            .await
            .unwrap();
        assert_eq!(user.id, existing.id);
    }
}
