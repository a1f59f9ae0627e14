//! Auth configuration and shared handler state.

use std::sync::Arc;
use std::time::Duration;

use crate::email::EmailSender;
use crate::identity::{IdentityResolver, provider::ProviderClient};
use crate::sealed::Sealer;
use crate::session::SessionManager;
use crate::store::AuthStore;
use crate::tokens::TokenVault;
use crate::twofactor::{PendingTwoFactorStore, TwoFactorService};

use super::rate_limit::RateLimiter;

const DEFAULT_SESSION_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_ISSUER: &str = "hejmo";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: u64,
    issuer: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: u64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    pub(crate) fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Everything the auth handlers share, injected as `Extension<Arc<AuthState>>`.
pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn AuthStore>,
    sessions: SessionManager,
    sealer: Sealer,
    tokens: TokenVault,
    two_factor: TwoFactorService,
    pending_two_factor: PendingTwoFactorStore,
    resolver: IdentityResolver,
    providers: ProviderClient,
    email_sender: Arc<dyn EmailSender>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AuthStore>,
        sessions: SessionManager,
        sealer: Sealer,
        tokens: TokenVault,
        two_factor: TwoFactorService,
        pending_two_factor: PendingTwoFactorStore,
        resolver: IdentityResolver,
        providers: ProviderClient,
        email_sender: Arc<dyn EmailSender>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            store,
            sessions,
            sealer,
            tokens,
            two_factor,
            pending_two_factor,
            resolver,
            providers,
            email_sender,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub(crate) fn store(&self) -> &dyn AuthStore {
        self.store.as_ref()
    }

    pub(crate) fn sealer(&self) -> &Sealer {
        &self.sealer
    }

    pub(crate) fn tokens(&self) -> &TokenVault {
        &self.tokens
    }

    pub(crate) fn two_factor(&self) -> &TwoFactorService {
        &self.two_factor
    }

    pub(crate) fn pending_two_factor(&self) -> &PendingTwoFactorStore {
        &self.pending_two_factor
    }

    pub(crate) fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub(crate) fn providers(&self) -> &ProviderClient {
        &self.providers
    }

    pub(crate) fn email_sender(&self) -> Arc<dyn EmailSender> {
        Arc::clone(&self.email_sender)
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}
