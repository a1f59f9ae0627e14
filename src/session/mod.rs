//! Session levels and the sealed session cookie.
//!
//! There is no server-side session table: the whole session lives in one
//! sealed cookie. Three ordered levels exist — `None` (no cookie), `Account`
//! (household selected), `Full` (household + member profile selected). Every
//! mutation replaces the payload atomically and re-seals with a fresh expiry.
//!
//! Any unseal failure (tamper, wrong key, expiry) is treated identically to
//! "no session"; reads never fail toward an authenticated state.

use anyhow::{Context, Result};
use axum::http::{HeaderMap, HeaderValue, header::COOKIE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::sealed::Sealer;

pub const SESSION_COOKIE_NAME: &str = "hejmo_session";

/// Ordered capability tier carried by the session cookie.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum SessionLevel {
    None,
    Account,
    Full,
}

/// The session cookie payload.
///
/// Invariant: `member_id` is only meaningful when `family_id` is also set;
/// the level predicates are structural and enforce this.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_member_id: Option<Uuid>,
    /// Whether the cookie outlives the browser session (`Max-Age` vs none).
    /// Carried in the payload so level transitions keep the choice.
    #[serde(default)]
    pub remember: bool,
}

impl SessionPayload {
    /// Account level: a household is selected.
    #[must_use]
    pub fn is_account_session(&self) -> bool {
        self.family_id.is_some()
    }

    /// Full level: a household and a member profile are selected.
    #[must_use]
    pub fn is_full_session(&self) -> bool {
        self.family_id.is_some() && self.member_id.is_some()
    }

    #[must_use]
    pub fn level(&self) -> SessionLevel {
        if self.is_full_session() {
            SessionLevel::Full
        } else if self.is_account_session() {
            SessionLevel::Account
        } else {
            SessionLevel::None
        }
    }

    #[must_use]
    pub fn is_impersonating(&self) -> bool {
        self.original_member_id.is_some()
    }
}

/// Reads and rewrites the sealed session cookie.
#[derive(Clone)]
pub struct SessionManager {
    sealer: Sealer,
    ttl: Duration,
    cookie_secure: bool,
}

impl SessionManager {
    #[must_use]
    pub fn new(sealer: Sealer, ttl: Duration, cookie_secure: bool) -> Self {
        Self {
            sealer,
            ttl,
            cookie_secure,
        }
    }

    /// Decode the session cookie, treating any failure as "no session".
    #[must_use]
    pub fn get_session(&self, headers: &HeaderMap) -> Option<SessionPayload> {
        let raw = cookie_value(headers, SESSION_COOKIE_NAME)?;
        match self.sealer.unseal::<SessionPayload>(&raw) {
            Ok(payload) => Some(payload),
            Err(err) => {
                debug!("discarding session cookie: {err}");
                None
            }
        }
    }

    /// Session at Account level or better, else `None`.
    #[must_use]
    pub fn get_account_session(&self, headers: &HeaderMap) -> Option<SessionPayload> {
        self.get_session(headers)
            .filter(SessionPayload::is_account_session)
    }

    /// Session at Full level, else `None`.
    #[must_use]
    pub fn get_full_session(&self, headers: &HeaderMap) -> Option<SessionPayload> {
        self.get_session(headers)
            .filter(SessionPayload::is_full_session)
    }

    /// Start a fresh Account-level session for a household.
    ///
    /// # Errors
    /// Returns an error if sealing or cookie construction fails.
    pub fn set_account_session(&self, family_id: Uuid, remember: bool) -> Result<HeaderValue> {
        self.write(&SessionPayload {
            family_id: Some(family_id),
            member_id: None,
            original_member_id: None,
            remember,
        })
    }

    /// Promote an Account session to Full by selecting a member profile.
    ///
    /// # Errors
    /// Returns an error if sealing fails.
    pub fn promote_to_full_session(
        &self,
        session: &SessionPayload,
        member_id: Uuid,
    ) -> Result<HeaderValue> {
        self.write(&SessionPayload {
            family_id: session.family_id,
            member_id: Some(member_id),
            original_member_id: None,
            remember: session.remember,
        })
    }

    /// Switch the active member profile, ending any impersonation.
    ///
    /// # Errors
    /// Returns an error if sealing fails.
    pub fn switch_profile(&self, session: &SessionPayload, member_id: Uuid) -> Result<HeaderValue> {
        self.promote_to_full_session(session, member_id)
    }

    /// Act as another member while remembering who started it. Nested
    /// impersonation keeps the original actor.
    ///
    /// # Errors
    /// Returns an error if sealing fails.
    pub fn impersonate(&self, session: &SessionPayload, member_id: Uuid) -> Result<HeaderValue> {
        self.write(&SessionPayload {
            family_id: session.family_id,
            member_id: Some(member_id),
            original_member_id: session.original_member_id.or(session.member_id),
            remember: session.remember,
        })
    }

    /// Return to the original member after impersonation.
    ///
    /// # Errors
    /// Returns an error if sealing fails.
    pub fn stop_impersonating(&self, session: &SessionPayload) -> Result<HeaderValue> {
        self.write(&SessionPayload {
            family_id: session.family_id,
            member_id: session.original_member_id.or(session.member_id),
            original_member_id: None,
            remember: session.remember,
        })
    }

    /// Seal the payload and build the `Set-Cookie` value with a fresh expiry.
    ///
    /// Without `remember` the cookie gets no `Max-Age` and dies with the
    /// browser session; the sealed payload's own TTL bounds it either way.
    ///
    /// # Errors
    /// Returns an error if sealing or cookie construction fails.
    pub fn write(&self, payload: &SessionPayload) -> Result<HeaderValue> {
        let sealed = self.sealer.seal(payload, self.ttl)?;
        let mut cookie = format!("{SESSION_COOKIE_NAME}={sealed}; Path=/; HttpOnly; SameSite=Lax");
        if payload.remember {
            let max_age = self.ttl.as_secs();
            cookie.push_str(&format!("; Max-Age={max_age}"));
        }
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).context("failed to build session cookie")
    }

    /// Build the `Set-Cookie` value that destroys the session.
    ///
    /// # Errors
    /// Returns an error if cookie construction fails.
    pub fn clear_session(&self) -> Result<HeaderValue> {
        let mut cookie =
            format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).context("failed to build clear-session cookie")
    }
}

/// Extract a cookie value from the `Cookie` request header.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(Sealer::new("test-secret"), Duration::from_secs(3600), false)
    }

    fn headers_with_cookie(cookie: &HeaderValue) -> HeaderMap {
        // Reuse the Set-Cookie value up to the first attribute as the request cookie.
        let value = cookie.to_str().unwrap();
        let pair = value.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair).unwrap());
        headers
    }

    #[test]
    fn full_implies_account() {
        let full = SessionPayload {
            family_id: Some(Uuid::new_v4()),
            member_id: Some(Uuid::new_v4()),
            ..SessionPayload::default()
        };
        assert!(full.is_full_session());
        assert!(full.is_account_session());
        assert_eq!(full.level(), SessionLevel::Full);

        // A member without a family never counts as any authenticated level.
        let orphan = SessionPayload {
            family_id: None,
            member_id: Some(Uuid::new_v4()),
            ..SessionPayload::default()
        };
        assert!(!orphan.is_full_session());
        assert!(!orphan.is_account_session());
        assert_eq!(orphan.level(), SessionLevel::None);
    }

    #[test]
    fn levels_are_ordered() {
        assert!(SessionLevel::None < SessionLevel::Account);
        assert!(SessionLevel::Account < SessionLevel::Full);
    }

    #[test]
    fn account_session_round_trips_through_cookie() {
        let manager = manager();
        let family_id = Uuid::new_v4();
        let cookie = manager.set_account_session(family_id, false).unwrap();
        let headers = headers_with_cookie(&cookie);

        let session = manager.get_account_session(&headers).unwrap();
        assert_eq!(session.family_id, Some(family_id));
        assert!(manager.get_full_session(&headers).is_none());
    }

    #[test]
    fn remember_controls_cookie_persistence() {
        let manager = manager();
        let family_id = Uuid::new_v4();

        let persistent = manager.set_account_session(family_id, true).unwrap();
        assert!(persistent.to_str().unwrap().contains("Max-Age=3600"));

        // Without remember the cookie dies with the browser session.
        let ephemeral = manager.set_account_session(family_id, false).unwrap();
        assert!(!ephemeral.to_str().unwrap().contains("Max-Age"));
    }

    #[test]
    fn remember_survives_level_transitions() {
        let manager = manager();
        let cookie = manager.set_account_session(Uuid::new_v4(), true).unwrap();
        let session = manager
            .get_session(&headers_with_cookie(&cookie))
            .unwrap();
        assert!(session.remember);

        let cookie = manager
            .promote_to_full_session(&session, Uuid::new_v4())
            .unwrap();
        assert!(cookie.to_str().unwrap().contains("Max-Age=3600"));
        let session = manager
            .get_full_session(&headers_with_cookie(&cookie))
            .unwrap();
        assert!(session.remember);
    }

    #[test]
    fn tampered_cookie_reads_as_no_session() {
        let manager = manager();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("hejmo_session=not-a-sealed-value"),
        );
        assert!(manager.get_session(&headers).is_none());
    }

    #[test]
    fn promote_switch_and_impersonate() {
        let manager = manager();
        let family_id = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let cookie = manager.set_account_session(family_id, false).unwrap();
        let session = manager
            .get_session(&headers_with_cookie(&cookie))
            .unwrap();

        let cookie = manager.promote_to_full_session(&session, alice).unwrap();
        let session = manager
            .get_full_session(&headers_with_cookie(&cookie))
            .unwrap();
        assert_eq!(session.member_id, Some(alice));

        let cookie = manager.impersonate(&session, bob).unwrap();
        let session = manager
            .get_full_session(&headers_with_cookie(&cookie))
            .unwrap();
        assert_eq!(session.member_id, Some(bob));
        assert_eq!(session.original_member_id, Some(alice));
        assert!(session.is_impersonating());

        let cookie = manager.stop_impersonating(&session).unwrap();
        let session = manager
            .get_full_session(&headers_with_cookie(&cookie))
            .unwrap();
        assert_eq!(session.member_id, Some(alice));
        assert!(!session.is_impersonating());
    }

    #[test]
    fn clear_session_expires_cookie() {
        let cookie = manager().clear_session().unwrap();
        let value = cookie.to_str().unwrap();
        assert!(value.starts_with("hejmo_session=;"));
        assert!(value.contains("Max-Age=0"));
    }
}
