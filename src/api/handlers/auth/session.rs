//! Session inspection and level transitions over the sealed cookie.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::state::AuthState;
use super::types::{ImpersonateRequest, SelectProfileRequest, SessionResponse};
use crate::session::{SessionLevel, SessionPayload};

fn session_response(session: &SessionPayload) -> SessionResponse {
    let level = match session.level() {
        SessionLevel::None => "none",
        SessionLevel::Account => "account",
        SessionLevel::Full => "full",
    };
    SessionResponse {
        family_id: session.family_id.map(|id| id.to_string()),
        member_id: session.member_id.map(|id| id.to_string()),
        level: level.to_string(),
        impersonating: session.is_impersonating(),
    }
}

fn cookie_response(cookie: axum::http::HeaderValue, session: &SessionPayload) -> axum::response::Response {
    let mut response_headers = HeaderMap::new();
    response_headers.insert(SET_COOKIE, cookie);
    (response_headers, Json(session_response(session))).into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Active session", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // A broken or expired cookie reads the same as no cookie at all.
    match auth_state.sessions().get_account_session(&headers) {
        Some(session) => (StatusCode::OK, Json(session_response(&session))).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Promote an Account session to Full by selecting a member profile.
#[utoipa::path(
    post,
    path = "/v1/auth/session/profile",
    request_body = SelectProfileRequest,
    responses(
        (status = 200, description = "Session promoted to Full", body = SessionResponse),
        (status = 400, description = "Invalid member id", body = String),
        (status = 401, description = "No Account session", body = String)
    ),
    tag = "auth"
)]
pub async fn select_profile(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SelectProfileRequest>>,
) -> impl IntoResponse {
    let request: SelectProfileRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    let Ok(member_id) = Uuid::parse_str(&request.member_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid member id".to_string()).into_response();
    };
    let Some(session) = auth_state.sessions().get_account_session(&headers) else {
        return (StatusCode::UNAUTHORIZED, "No session".to_string()).into_response();
    };

    match auth_state
        .sessions()
        .promote_to_full_session(&session, member_id)
    {
        Ok(cookie) => {
            let promoted = SessionPayload {
                family_id: session.family_id,
                member_id: Some(member_id),
                original_member_id: None,
                remember: session.remember,
            };
            cookie_response(cookie, &promoted)
        }
        Err(err) => {
            error!("Failed to promote session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Switch the active member profile; ends any running impersonation.
#[utoipa::path(
    post,
    path = "/v1/auth/session/switch-profile",
    request_body = SelectProfileRequest,
    responses(
        (status = 200, description = "Profile switched", body = SessionResponse),
        (status = 400, description = "Invalid member id", body = String),
        (status = 401, description = "No Full session", body = String)
    ),
    tag = "auth"
)]
pub async fn switch_profile(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SelectProfileRequest>>,
) -> impl IntoResponse {
    let request: SelectProfileRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    let Ok(member_id) = Uuid::parse_str(&request.member_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid member id".to_string()).into_response();
    };
    let Some(session) = auth_state.sessions().get_full_session(&headers) else {
        return (StatusCode::UNAUTHORIZED, "No session".to_string()).into_response();
    };

    match auth_state.sessions().switch_profile(&session, member_id) {
        Ok(cookie) => {
            let switched = SessionPayload {
                family_id: session.family_id,
                member_id: Some(member_id),
                original_member_id: None,
                remember: session.remember,
            };
            cookie_response(cookie, &switched)
        }
        Err(err) => {
            error!("Failed to switch profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Act as another member; the original actor is remembered in the cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/session/impersonate",
    request_body = ImpersonateRequest,
    responses(
        (status = 200, description = "Impersonation started", body = SessionResponse),
        (status = 400, description = "Invalid member id", body = String),
        (status = 401, description = "No Full session", body = String)
    ),
    tag = "auth"
)]
pub async fn impersonate(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ImpersonateRequest>>,
) -> impl IntoResponse {
    let request: ImpersonateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    let Ok(member_id) = Uuid::parse_str(&request.member_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid member id".to_string()).into_response();
    };
    let Some(session) = auth_state.sessions().get_full_session(&headers) else {
        return (StatusCode::UNAUTHORIZED, "No session".to_string()).into_response();
    };

    match auth_state.sessions().impersonate(&session, member_id) {
        Ok(cookie) => {
            let impersonated = SessionPayload {
                family_id: session.family_id,
                member_id: Some(member_id),
                original_member_id: session.original_member_id.or(session.member_id),
                remember: session.remember,
            };
            cookie_response(cookie, &impersonated)
        }
        Err(err) => {
            error!("Failed to start impersonation: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Return to the original member. A no-op for sessions not impersonating.
#[utoipa::path(
    post,
    path = "/v1/auth/session/stop-impersonating",
    responses(
        (status = 200, description = "Impersonation ended", body = SessionResponse),
        (status = 401, description = "No Full session", body = String)
    ),
    tag = "auth"
)]
pub async fn stop_impersonating(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(session) = auth_state.sessions().get_full_session(&headers) else {
        return (StatusCode::UNAUTHORIZED, "No session".to_string()).into_response();
    };

    match auth_state.sessions().stop_impersonating(&session) {
        Ok(cookie) => {
            let restored = SessionPayload {
                family_id: session.family_id,
                member_id: session.original_member_id.or(session.member_id),
                original_member_id: None,
                remember: session.remember,
            };
            cookie_response(cookie, &restored)
        }
        Err(err) => {
            error!("Failed to stop impersonation: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    // Always clear the cookie; there is no server-side state to delete.
    let mut response_headers = HeaderMap::new();
    match auth_state.sessions().clear_session() {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clear-session cookie: {err}"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}
