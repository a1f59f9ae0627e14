//! Email-token flows: verification, password reset, email change.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::types::{
    ChangeEmailRequest, ConfirmEmailChangeRequest, ForgotPasswordRequest, ResetPasswordRequest,
    VerifyEmailRequest,
};
use super::utils::{
    build_token_url, extract_client_ip, hash_password, normalize_email, session_user, valid_email,
};
use crate::email::{email_change_message, password_reset_message, send_detached};
use crate::store::{EmailTokenKind, StoreError};
use crate::tokens::TokenError;

/// Consume a verification token and mark the account's email verified.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Invalid or expired token", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request: VerifyEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyEmail)
        == RateLimitDecision::Limited
    {
        // Rate limits are enforced before any token work.
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let record = match auth_state
        .tokens()
        .validate(&request.token, EmailTokenKind::VerifyEmail)
        .await
    {
        Ok(record) => record,
        Err(err) => {
            // The precise reason is logged; callers get one generic answer.
            debug!("verify-email token rejected: {err}");
            return (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response();
        }
    };

    if let Err(err) = auth_state.store().set_email_verified(record.user_id).await {
        error!("Failed to mark email verified: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Verification failed".to_string(),
        )
            .into_response();
    }
    match auth_state.tokens().consume(record.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            debug!("verify-email token consume rejected: {err}");
            (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response()
        }
    }
}

/// Request a password-reset link. Always 204; the response never reveals
/// whether the address has an account.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 204, description = "Reset accepted")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let request: ForgotPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return StatusCode::NO_CONTENT.into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return StatusCode::NO_CONTENT.into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::PasswordReset)
        == RateLimitDecision::Limited
        || auth_state
            .rate_limiter()
            .check_email(&email, RateLimitAction::PasswordReset)
            == RateLimitDecision::Limited
    {
        return StatusCode::NO_CONTENT.into_response();
    }

    let user = match auth_state.store().find_user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => return StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to look up user for password reset: {err}");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    match auth_state
        .tokens()
        .issue(user.id, EmailTokenKind::PasswordReset, None)
        .await
    {
        Ok(raw) => {
            let url = build_token_url(
                auth_state.config().frontend_base_url(),
                "reset-password",
                &raw,
            );
            send_detached(auth_state.email_sender(), password_reset_message(&email, &url));
        }
        Err(err) => error!("Failed to issue password-reset token: {err}"),
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Set a new password from a reset token.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Invalid token or password", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    if request.password.len() < 8 {
        return (StatusCode::BAD_REQUEST, "Password too short".to_string()).into_response();
    }

    let record = match auth_state
        .tokens()
        .validate(&request.token, EmailTokenKind::PasswordReset)
        .await
    {
        Ok(record) => record,
        Err(err) => {
            debug!("reset-password token rejected: {err}");
            return (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response();
        }
    };

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Reset failed".to_string())
                .into_response();
        }
    };

    if let Err(err) = auth_state
        .store()
        .set_password_hash(record.user_id, password_hash)
        .await
    {
        error!("Failed to store password hash: {err}");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Reset failed".to_string()).into_response();
    }
    match auth_state.tokens().consume(record.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(TokenError::AlreadyUsed) => {
            // A concurrent reset consumed it first; the password write that
            // accompanied that consume wins.
            (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response()
        }
        Err(err) => {
            debug!("reset-password token consume rejected: {err}");
            (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response()
        }
    }
}

/// Start an email change: a confirmation link goes to the new address.
#[utoipa::path(
    post,
    path = "/v1/auth/change-email",
    request_body = ChangeEmailRequest,
    responses(
        (status = 204, description = "Confirmation email queued"),
        (status = 400, description = "Invalid email", body = String),
        (status = 401, description = "No Account session", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn change_email(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangeEmailRequest>>,
) -> impl IntoResponse {
    let request: ChangeEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let new_email = normalize_email(&request.new_email);
    if !valid_email(&new_email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let user = match session_user(&headers, &auth_state).await {
        Ok(user) => user,
        Err(status) => return status.into_response(),
    };

    if auth_state
        .rate_limiter()
        .check_email(&user.email, RateLimitAction::EmailChange)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    match auth_state
        .tokens()
        .issue(user.id, EmailTokenKind::EmailChange, Some(new_email.clone()))
        .await
    {
        Ok(raw) => {
            let url = build_token_url(
                auth_state.config().frontend_base_url(),
                "confirm-email-change",
                &raw,
            );
            // The link proves control of the address being switched to.
            send_detached(auth_state.email_sender(), email_change_message(&new_email, &url));
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to issue email-change token: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email change failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Apply a confirmed email change.
#[utoipa::path(
    post,
    path = "/v1/auth/confirm-email-change",
    request_body = ConfirmEmailChangeRequest,
    responses(
        (status = 204, description = "Email changed"),
        (status = 400, description = "Invalid or expired token", body = String),
        (status = 409, description = "Address already in use", body = String)
    ),
    tag = "auth"
)]
pub async fn confirm_email_change(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ConfirmEmailChangeRequest>>,
) -> impl IntoResponse {
    let request: ConfirmEmailChangeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let record = match auth_state
        .tokens()
        .validate(&request.token, EmailTokenKind::EmailChange)
        .await
    {
        Ok(record) => record,
        Err(err) => {
            debug!("email-change token rejected: {err}");
            return (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response();
        }
    };
    let Some(new_email) = record.new_email.clone() else {
        error!("email-change token has no target address");
        return (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response();
    };

    match auth_state.store().set_email(record.user_id, new_email).await {
        Ok(()) => {}
        Err(StoreError::Conflict(_)) => {
            // Someone registered the address between request and confirmation.
            return (
                StatusCode::CONFLICT,
                "Address already in use".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to apply email change: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email change failed".to_string(),
            )
                .into_response();
        }
    }
    match auth_state.tokens().consume(record.id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            debug!("email-change token consume rejected: {err}");
            (StatusCode::BAD_REQUEST, "Invalid token".to_string()).into_response()
        }
    }
}
