//! OAuth entry, callback, and registration completion.
//!
//! CSRF state rides in two places: a sealed cookie and the provider `state`
//! parameter. The callback requires both to unseal and carry the same nonce,
//! which ties the round trip to the browser that started it. Every callback
//! failure collapses into one generic redirect so provider errors, tampered
//! state, and exchange failures are indistinguishable to an attacker.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::types::OAuthRegisterRequest;
use super::utils::extract_client_ip;
use crate::identity::{
    OAUTH_STATE_TTL, OAuthState, PENDING_REGISTRATION_TTL, PendingRegistration, Resolution,
};
use crate::session::cookie_value;
use crate::store::OAuthProvider;
use crate::twofactor::PendingLogin;

const STATE_COOKIE_NAME: &str = "hejmo_oauth_state";
const PENDING_COOKIE_NAME: &str = "hejmo_oauth_pending";
const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Deserialize)]
pub struct OAuthEntryQuery {
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn short_cookie(
    name: &str,
    value: &str,
    max_age: u64,
    secure: bool,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let mut cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_cookie(name: &str, secure: bool) -> Option<HeaderValue> {
    short_cookie(name, "", 0, secure).ok()
}

fn failure_redirect(auth_state: &AuthState) -> axum::response::Response {
    let base = auth_state.config().frontend_base_url().trim_end_matches('/');
    let mut headers = HeaderMap::new();
    if let Some(cookie) = clear_cookie(STATE_COOKIE_NAME, auth_state.config().cookie_secure()) {
        headers.insert(SET_COOKIE, cookie);
    }
    (headers, Redirect::to(&format!("{base}/login?error=oauth_failed"))).into_response()
}

/// Only same-site paths survive as post-login destinations.
fn sanitize_redirect(redirect_to: Option<String>) -> Option<String> {
    redirect_to.filter(|path| path.starts_with('/') && !path.starts_with("//"))
}

/// Start the provider round trip.
#[utoipa::path(
    get,
    path = "/v1/auth/oauth/{provider}",
    params(
        ("provider" = String, Path, description = "google or microsoft"),
        ("redirect_to" = Option<String>, Query, description = "Same-site path to land on after login")
    ),
    responses(
        (status = 303, description = "Redirect to the provider consent page"),
        (status = 404, description = "Unknown provider", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn entry(
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(query): Query<OAuthEntryQuery>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(provider) = OAuthProvider::from_str(&provider) else {
        return (StatusCode::NOT_FOUND, "Unknown provider".to_string()).into_response();
    };

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::OAuthEntry)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    // A live Account session turns the callback into a link flow.
    let mut link_user_id = None;
    if let Some(session) = auth_state.sessions().get_account_session(&headers) {
        if let Some(family_id) = session.family_id {
            match auth_state.store().find_user_by_family_id(family_id).await {
                Ok(Some(user)) => link_user_id = Some(user.id),
                Ok(None) => {}
                Err(err) => {
                    error!("Failed to resolve session user for oauth link: {err}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
        }
    }

    let state = OAuthState::new(link_user_id, sanitize_redirect(query.redirect_to));
    let sealed = match auth_state.sealer().seal(&state, OAUTH_STATE_TTL) {
        Ok(sealed) => sealed,
        Err(err) => {
            error!("Failed to seal oauth state: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let url = match auth_state.providers().authorize_url(provider, &sealed) {
        Ok(url) => url,
        Err(err) => {
            error!("Failed to build authorize URL: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match short_cookie(
        STATE_COOKIE_NAME,
        &sealed,
        OAUTH_STATE_TTL.as_secs(),
        auth_state.config().cookie_secure(),
    ) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build oauth state cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    (response_headers, Redirect::to(&url)).into_response()
}

/// Provider callback: validate state, exchange the code, resolve the identity.
#[utoipa::path(
    get,
    path = "/v1/auth/oauth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "google or microsoft"),
        ("code" = Option<String>, Query, description = "Authorization code"),
        ("state" = Option<String>, Query, description = "Sealed CSRF state"),
        ("error" = Option<String>, Query, description = "Provider error code")
    ),
    responses(
        (status = 303, description = "Redirect into the app, the 2FA step, or the registration wizard")
    ),
    tag = "auth"
)]
pub async fn callback(
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(provider) = OAuthProvider::from_str(&provider) else {
        return failure_redirect(&auth_state);
    };
    if let Some(code) = query.error.as_deref() {
        warn!(provider = provider.as_str(), code, "provider returned an error");
        return failure_redirect(&auth_state);
    }
    let (Some(code), Some(state_param)) = (query.code.as_deref(), query.state.as_deref()) else {
        return failure_redirect(&auth_state);
    };

    // Both copies of the state must unseal and agree on the nonce.
    let state: OAuthState = match auth_state.sealer().unseal(state_param) {
        Ok(state) => state,
        Err(err) => {
            warn!("rejecting oauth callback state: {err}");
            return failure_redirect(&auth_state);
        }
    };
    let cookie_state: Option<OAuthState> = cookie_value(&headers, STATE_COOKIE_NAME)
        .and_then(|raw| auth_state.sealer().unseal(&raw).ok());
    match cookie_state {
        Some(cookie_state) if cookie_state.nonce == state.nonce => {}
        _ => {
            warn!("oauth state cookie missing or nonce mismatch");
            return failure_redirect(&auth_state);
        }
    }

    let identity = match auth_state.providers().exchange_code(provider, code).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!("oauth code exchange failed: {err}");
            return failure_redirect(&auth_state);
        }
    };

    let resolution = match auth_state
        .resolver()
        .resolve(identity, state.user_id)
        .await
    {
        Ok(resolution) => resolution,
        Err(err) => {
            warn!("identity resolution failed: {err}");
            return failure_redirect(&auth_state);
        }
    };

    let secure = auth_state.config().cookie_secure();
    let base = auth_state.config().frontend_base_url().trim_end_matches('/');
    let mut response_headers = HeaderMap::new();
    if let Some(cookie) = clear_cookie(STATE_COOKIE_NAME, secure) {
        response_headers.append(SET_COOKIE, cookie);
    }

    match resolution {
        Resolution::Login { user_id } | Resolution::LinkAndLogin { user_id } => {
            match auth_state.two_factor().is_enabled(user_id).await {
                Ok(true) => {
                    let token = auth_state
                        .pending_two_factor()
                        .put(PendingLogin {
                            user_id,
                            // Provider logins have no remember checkbox.
                            remember_me: true,
                        })
                        .await;
                    // Fragment transport keeps the token out of server logs.
                    (
                        response_headers,
                        Redirect::to(&format!("{base}/verify-2fa#token={token}")),
                    )
                        .into_response()
                }
                Ok(false) => {
                    let user = match auth_state.store().find_user_by_id(user_id).await {
                        Ok(Some(user)) => user,
                        _ => return failure_redirect(&auth_state),
                    };
                    let Ok(cookie) = auth_state
                        .sessions()
                        .set_account_session(user.family_id, true)
                    else {
                        return failure_redirect(&auth_state);
                    };
                    response_headers.append(SET_COOKIE, cookie);
                    let destination = state
                        .redirect_to
                        .and_then(|path| sanitize_redirect(Some(path)))
                        .unwrap_or_else(|| "/dashboard".to_string());
                    (
                        response_headers,
                        Redirect::to(&format!("{base}{destination}")),
                    )
                        .into_response()
                }
                Err(err) => {
                    error!("Failed to check two-factor status: {err}");
                    failure_redirect(&auth_state)
                }
            }
        }
        Resolution::Register { identity } => {
            let pending = PendingRegistration { identity };
            let Ok(sealed) = auth_state
                .sealer()
                .seal(&pending, PENDING_REGISTRATION_TTL)
            else {
                return failure_redirect(&auth_state);
            };
            let Ok(cookie) = short_cookie(
                PENDING_COOKIE_NAME,
                &sealed,
                PENDING_REGISTRATION_TTL.as_secs(),
                secure,
            ) else {
                return failure_redirect(&auth_state);
            };
            response_headers.append(SET_COOKIE, cookie);
            (
                response_headers,
                Redirect::to(&format!("{base}/register/oauth")),
            )
                .into_response()
        }
    }
}

/// Complete registration for an identity that matched nothing.
#[utoipa::path(
    post,
    path = "/v1/auth/oauth/register",
    request_body = OAuthRegisterRequest,
    responses(
        (status = 204, description = "Account created, session started"),
        (status = 401, description = "No pending registration", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<OAuthRegisterRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => OAuthRegisterRequest { locale: None },
    };

    let pending: PendingRegistration = match cookie_value(&headers, PENDING_COOKIE_NAME)
        .and_then(|raw| auth_state.sealer().unseal(&raw).ok())
    {
        Some(pending) => pending,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                "No pending registration".to_string(),
            )
                .into_response();
        }
    };

    let locale = request.locale.unwrap_or_else(|| DEFAULT_LOCALE.to_string());
    let user = match auth_state
        .resolver()
        .complete_registration(pending.identity, locale)
        .await
    {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to complete oauth registration: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    let secure = auth_state.config().cookie_secure();
    let mut response_headers = HeaderMap::new();
    if let Some(cookie) = clear_cookie(PENDING_COOKIE_NAME, secure) {
        response_headers.append(SET_COOKIE, cookie);
    }
    match auth_state.sessions().set_account_session(user.family_id, true) {
        Ok(cookie) => {
            response_headers.append(SET_COOKIE, cookie);
            (StatusCode::NO_CONTENT, response_headers).into_response()
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sanitize_redirect;

    #[test]
    fn sanitize_redirect_accepts_same_site_paths() {
        assert_eq!(
            sanitize_redirect(Some("/settings".to_string())),
            Some("/settings".to_string())
        );
    }

    #[test]
    fn sanitize_redirect_rejects_absolute_and_scheme_relative() {
        assert!(sanitize_redirect(Some("https://evil.test/".to_string())).is_none());
        assert!(sanitize_redirect(Some("//evil.test/".to_string())).is_none());
        assert!(sanitize_redirect(None).is_none());
    }
}
