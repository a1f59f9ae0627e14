use crate::api::{self, APP_USER_AGENT, AuthConfig, AuthState};
use crate::cli::commands::oauth::ProviderCredentials;
use crate::email::{EmailSender, LogEmailSender};
use crate::identity::IdentityResolver;
use crate::identity::provider::{OAuthClientConfig, ProviderClient};
use crate::sealed::Sealer;
use crate::session::SessionManager;
use crate::store::{AuthStore, MemoryStore};
use crate::tokens::TokenVault;
use crate::twofactor::{PendingTwoFactorStore, TwoFactorService};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub secret: SecretString,
    pub frontend_url: String,
    pub public_url: String,
    pub session_ttl_seconds: u64,
    pub issuer: String,
    pub google: Option<ProviderCredentials>,
    pub microsoft: Option<ProviderCredentials>,
}

/// Derive a fixed-size key from the server secret under a domain tag, so the
/// sealing key, the secret-encryption key, and the recovery-code pepper are
/// all independent.
fn derive_key(tag: &[u8], secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(tag);
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

fn provider_config(
    credentials: Option<ProviderCredentials>,
    public_url: &str,
    provider: &str,
) -> Option<OAuthClientConfig> {
    credentials.map(|credentials| OAuthClientConfig {
        client_id: credentials.client_id,
        client_secret: credentials.client_secret,
        redirect_uri: format!(
            "{}/v1/auth/oauth/{provider}/callback",
            public_url.trim_end_matches('/')
        ),
    })
}

/// Execute the server action.
/// # Errors
/// Returns an error if wiring the state or starting the server fails.
pub async fn execute(args: Args) -> Result<()> {
    let secret = args.secret.expose_secret();
    let sealer = Sealer::new(secret);
    let dek = derive_key(b"hejmo-dek:v1", secret);
    let pepper: Arc<[u8]> = Arc::from(derive_key(b"hejmo-pepper:v1", secret).as_slice());

    let config = AuthConfig::new(args.frontend_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_issuer(args.issuer);

    // The durable record store is an external collaborator; this binary wires
    // the in-memory implementation.
    let store: Arc<dyn AuthStore> = Arc::new(MemoryStore::new());
    let email_sender: Arc<dyn EmailSender> = Arc::new(LogEmailSender);

    let sessions = SessionManager::new(
        sealer.clone(),
        config.session_ttl(),
        config.cookie_secure(),
    );

    let http = reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .build()
        .context("failed to build HTTP client")?;
    let providers = ProviderClient::new(
        http,
        provider_config(args.google, &args.public_url, "google"),
        provider_config(args.microsoft, &args.public_url, "microsoft"),
    );

    let state = AuthState::new(
        config.clone(),
        Arc::clone(&store),
        sessions,
        sealer,
        TokenVault::new(Arc::clone(&store)),
        TwoFactorService::new(
            Arc::clone(&store),
            dek,
            pepper,
            config.issuer().to_string(),
        ),
        PendingTwoFactorStore::default(),
        IdentityResolver::new(store, Arc::clone(&email_sender)),
        providers,
        email_sender,
        Arc::new(api::NoopRateLimiter),
    );

    info!(issuer = config.issuer(), "starting server");

    api::new(args.port, Arc::new(state)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_keys_are_domain_separated() {
        let dek = derive_key(b"hejmo-dek:v1", "secret");
        let pepper = derive_key(b"hejmo-pepper:v1", "secret");
        assert_ne!(dek, pepper);
        assert_eq!(dek, derive_key(b"hejmo-dek:v1", "secret"));
    }

    #[test]
    fn provider_config_builds_callback_uri() {
        let config = provider_config(
            Some(ProviderCredentials {
                client_id: "id".to_string(),
                client_secret: SecretString::from("secret".to_string()),
            }),
            "https://api.hejmo.dev/",
            "google",
        )
        .expect("credentials present");
        assert_eq!(
            config.redirect_uri,
            "https://api.hejmo.dev/v1/auth/oauth/google/callback"
        );
        assert!(provider_config(None, "https://api.hejmo.dev", "microsoft").is_none());
    }
}
