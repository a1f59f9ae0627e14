//! Password login.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::types::{LoginRequest, LoginResponse};
use super::utils::{DUMMY_PASSWORD_HASH, extract_client_ip, normalize_email, verify_password};
use crate::twofactor::PendingLogin;

/// Verify the password and either start an Account session or hand back a
/// pending-2FA token. Credential failures are a uniform 401 so the response
/// cannot be used to probe which accounts exist.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started or 2FA required", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::Login)
            == RateLimitDecision::Limited
    {
        // Rate limits are enforced before any credential work.
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let user = match auth_state.store().find_user_by_email(&email).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to look up user for login: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string())
                .into_response();
        }
    };

    // Unknown emails and passwordless accounts burn the same Argon2 work as a
    // wrong password, so latency does not reveal which accounts exist.
    let password_ok = match user.as_ref().and_then(|user| user.password_hash.as_deref()) {
        Some(hash) => verify_password(&request.password, hash),
        None => {
            verify_password(&request.password, DUMMY_PASSWORD_HASH);
            false
        }
    };
    let Some(user) = user.filter(|_| password_ok) else {
        return invalid_credentials();
    };

    match auth_state.two_factor().is_enabled(user.id).await {
        Ok(true) => {
            // No session yet; the cookie is only set after the code checks out.
            let token = auth_state
                .pending_two_factor()
                .put(PendingLogin {
                    user_id: user.id,
                    remember_me: request.remember_me,
                })
                .await;
            Json(LoginResponse {
                two_factor_required: true,
                token: Some(token),
            })
            .into_response()
        }
        Ok(false) => match auth_state
            .sessions()
            .set_account_session(user.family_id, request.remember_me)
        {
            Ok(cookie) => {
                let mut response_headers = HeaderMap::new();
                response_headers.insert(SET_COOKIE, cookie);
                (
                    response_headers,
                    Json(LoginResponse {
                        two_factor_required: false,
                        token: None,
                    }),
                )
                    .into_response()
            }
            Err(err) => {
                error!("Failed to build session cookie: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response()
            }
        },
        Err(err) => {
            error!("Failed to check two-factor status: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response()
        }
    }
}

fn invalid_credentials() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        "Invalid email or password".to_string(),
    )
        .into_response()
}
