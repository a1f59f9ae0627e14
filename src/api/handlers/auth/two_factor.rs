//! Two-factor endpoints: login-time verification, enrollment, recovery codes.

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
use super::types::{
    RecoveryCodesResponse, TwoFactorEnrollFinishRequest, TwoFactorEnrollStartResponse,
    TwoFactorVerifyRequest, TwoFactorVerifyResponse,
};
use super::utils::{extract_client_ip, session_user};

/// Complete a 2FA-gated login with a TOTP code or a recovery code.
///
/// The pending token is read without consuming it so a wrong code does not
/// force the user back through the password step; it is consumed exactly once
/// on success.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = TwoFactorVerifyRequest,
    responses(
        (status = 200, description = "Session started", body = TwoFactorVerifyResponse),
        (status = 401, description = "Invalid token or code", body = String),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorVerifyRequest>>,
) -> impl IntoResponse {
    let request: TwoFactorVerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::TwoFactor)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let Some(pending) = auth_state.pending_two_factor().get(&request.token).await else {
        return (StatusCode::UNAUTHORIZED, "Invalid token".to_string()).into_response();
    };

    let (verified, used_recovery_code, remaining) = match (&request.code, &request.recovery_code) {
        (Some(code), _) => match auth_state
            .two_factor()
            .verify_code(pending.user_id, code)
            .await
        {
            Ok(ok) => (ok, false, None),
            Err(err) => {
                error!("Failed to verify 2FA code: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Verification failed".to_string(),
                )
                    .into_response();
            }
        },
        (None, Some(recovery_code)) => match auth_state
            .two_factor()
            .verify_recovery_code(pending.user_id, recovery_code)
            .await
        {
            Ok(Some(consumed)) => (true, true, Some(consumed.remaining)),
            Ok(None) => (false, true, None),
            Err(err) => {
                error!("Failed to verify recovery code: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Verification failed".to_string(),
                )
                    .into_response();
            }
        },
        (None, None) => {
            return (StatusCode::BAD_REQUEST, "Missing code".to_string()).into_response();
        }
    };

    if !verified {
        return (StatusCode::UNAUTHORIZED, "Invalid code".to_string()).into_response();
    }

    // Consume the pending entry only after the code checked out. If a
    // concurrent request won the race, treat this one as spent.
    if auth_state
        .pending_two_factor()
        .take(&request.token)
        .await
        .is_none()
    {
        return (StatusCode::UNAUTHORIZED, "Invalid token".to_string()).into_response();
    }

    let user = match auth_state.store().find_user_by_id(pending.user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, "Invalid token".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to load user after 2FA: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response();
        }
    };

    // The remember choice made at the password step rides the pending entry.
    match auth_state
        .sessions()
        .set_account_session(user.family_id, pending.remember_me)
    {
        Ok(cookie) => {
            let mut response_headers = HeaderMap::new();
            response_headers.insert(SET_COOKIE, cookie);
            (
                response_headers,
                Json(TwoFactorVerifyResponse {
                    used_recovery_code,
                    remaining_recovery_codes: remaining,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Begin enrollment: returns the secret, otpauth URL, and QR for the app.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/enroll/start",
    responses(
        (status = 200, description = "Enrollment started", body = TwoFactorEnrollStartResponse),
        (status = 401, description = "No Account session", body = String)
    ),
    tag = "auth"
)]
pub async fn enroll_start(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user = match session_user(&headers, &auth_state).await {
        Ok(user) => user,
        Err(status) => return status.into_response(),
    };

    match auth_state.two_factor().enroll_begin(&user).await {
        Ok(start) => Json(TwoFactorEnrollStartResponse {
            secret: start.secret_base32,
            otpauth_url: start.otpauth_url,
            qr_data_url: start.qr_data_url,
        })
        .into_response(),
        Err(err) => {
            error!("Failed to start 2FA enrollment: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Confirm enrollment with the first code; returns the one-time plaintext
/// recovery-code batch.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/enroll/finish",
    request_body = TwoFactorEnrollFinishRequest,
    responses(
        (status = 200, description = "Enrollment confirmed", body = RecoveryCodesResponse),
        (status = 401, description = "No Account session or wrong code", body = String)
    ),
    tag = "auth"
)]
pub async fn enroll_finish(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorEnrollFinishRequest>>,
) -> impl IntoResponse {
    let request: TwoFactorEnrollFinishRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    let user = match session_user(&headers, &auth_state).await {
        Ok(user) => user,
        Err(status) => return status.into_response(),
    };

    match auth_state
        .two_factor()
        .enroll_confirm(user.id, &request.code)
        .await
    {
        Ok(Some(recovery_codes)) => Json(RecoveryCodesResponse { recovery_codes }).into_response(),
        Ok(None) => (StatusCode::UNAUTHORIZED, "Invalid code".to_string()).into_response(),
        Err(err) => {
            error!("Failed to confirm 2FA enrollment: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Replace the whole recovery-code set; returns the fresh plaintext batch.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/recovery/regenerate",
    responses(
        (status = 200, description = "New batch minted", body = RecoveryCodesResponse),
        (status = 401, description = "No Account session", body = String)
    ),
    tag = "auth"
)]
pub async fn regenerate_recovery_codes(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user = match session_user(&headers, &auth_state).await {
        Ok(user) => user,
        Err(status) => return status.into_response(),
    };

    // Only meaningful for accounts with a confirmed credential.
    match auth_state.two_factor().is_enabled(user.id).await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::BAD_REQUEST, "2FA not enabled".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to check 2FA status: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match auth_state
        .two_factor()
        .regenerate_recovery_codes(user.id)
        .await
    {
        Ok(recovery_codes) => Json(RecoveryCodesResponse { recovery_codes }).into_response(),
        Err(err) => {
            error!("Failed to regenerate recovery codes: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
