//! External identity assertions and OAuth account resolution.
//!
//! An [`ExternalIdentity`] is what a provider callback asserts after a
//! successful code exchange. The [`resolver`] decides what that assertion
//! means for the household account base: log in, link-and-log-in, or
//! register. CSRF state and the pending-registration handoff ride in sealed
//! payloads defined here.

pub mod provider;
mod resolver;

pub use resolver::{IdentityResolver, Resolution};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::store::OAuthProvider;

/// CSRF state and the pending-registration payload expire quickly; they only
/// need to survive one provider round trip.
pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);
pub const PENDING_REGISTRATION_TTL: Duration = Duration::from_secs(10 * 60);

/// A verified assertion from an external identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub provider: OAuthProvider,
    pub provider_account_id: String,
    pub email: String,
    /// Whether the provider itself vouches for the email. Gates auto-linking.
    pub email_verified: bool,
    pub display_name: Option<String>,
}

/// Sealed CSRF state for the OAuth round trip.
///
/// The nonce is required; an unsealed state without it fails the schema
/// check. `user_id` is only set for link-from-settings flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl OAuthState {
    #[must_use]
    pub fn new(user_id: Option<Uuid>, redirect_to: Option<String>) -> Self {
        Self {
            nonce: new_nonce(),
            user_id,
            redirect_to,
        }
    }
}

/// Sealed handoff into the registration wizard when no account matched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub identity: ExternalIdentity,
}

fn new_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sealed::{Sealer, UnsealError};

    #[test]
    fn oauth_state_round_trips_sealed() {
        let sealer = Sealer::new("secret");
        let state = OAuthState::new(Some(Uuid::new_v4()), Some("/settings".to_string()));
        let opaque = sealer.seal(&state, OAUTH_STATE_TTL).expect("seal");
        let back: OAuthState = sealer.unseal(&opaque).expect("unseal");
        assert_eq!(back, state);
    }

    #[test]
    fn state_without_nonce_fails_schema_check() {
        let sealer = Sealer::new("secret");
        let opaque = sealer
            .seal(&serde_json::json!({ "user_id": null }), OAUTH_STATE_TTL)
            .expect("seal");
        let result: Result<OAuthState, _> = sealer.unseal(&opaque);
        assert_eq!(result.unwrap_err(), UnsealError::Schema);
    }

    #[test]
    fn nonces_are_unique() {
        assert_ne!(new_nonce(), new_nonce());
    }
}
