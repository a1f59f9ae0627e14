//! Password-based signup.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::types::RegisterRequest;
use super::utils::{build_token_url, extract_client_ip, hash_password, normalize_email, valid_email};
use crate::email::{send_detached, verify_email_message};
use crate::store::{EmailTokenKind, NewUser, StoreError};

const DEFAULT_LOCALE: &str = "en";

/// Create an account and send the email-verification link.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 204, description = "Account created, verification email queued"),
        (status = 400, description = "Invalid email or password", body = String),
        (status = 409, description = "Email already registered", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }
    if request.password.len() < 8 {
        return (StatusCode::BAD_REQUEST, "Password too short".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    let user = match auth_state
        .store()
        .create_user(NewUser {
            email: email.clone(),
            password_hash: Some(password_hash),
            email_verified: false,
            locale: request
                .locale
                .unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
        })
        .await
    {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => {
            return (
                StatusCode::CONFLICT,
                "Email already registered".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to create user: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    match auth_state
        .tokens()
        .issue(user.id, EmailTokenKind::VerifyEmail, None)
        .await
    {
        Ok(raw) => {
            let url = build_token_url(
                auth_state.config().frontend_base_url(),
                "verify-email",
                &raw,
            );
            send_detached(auth_state.email_sender(), verify_email_message(&email, &url));
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            // The account exists; the user can request a fresh link later.
            error!("Failed to issue verification token: {err}");
            StatusCode::NO_CONTENT.into_response()
        }
    }
}
