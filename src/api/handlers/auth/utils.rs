//! Small helpers shared by the auth handlers.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::http::{HeaderMap, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::error;

static EMAIL_FORMAT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// A parseable Argon2id hash of no real password, carrying the same cost
/// parameters as stored hashes. Login paths that find no hash to check
/// verify against this instead so they take as long as a wrong password.
pub(super) const DUMMY_PASSWORD_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

use super::state::AuthState;
use crate::store::User;

/// Resolve the session cookie to the household's account holder.
pub(super) async fn session_user(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<User, StatusCode> {
    let session = auth_state
        .sessions()
        .get_account_session(headers)
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let family_id = session.family_id.ok_or(StatusCode::UNAUTHORIZED)?;
    match auth_state.store().find_user_by_family_id(family_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(StatusCode::UNAUTHORIZED),
        Err(err) => {
            error!("Failed to resolve session user: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_FORMAT
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// Hash a password with Argon2id for storage.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("password hashing error: {err}"))
}

/// Constant-work verification against a stored Argon2 hash.
pub(crate) fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(super) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Build a frontend link carrying a raw token in the fragment so it never
/// reaches server logs.
pub(super) fn build_token_url(frontend_base_url: &str, page: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/{page}#token={token}")
}
