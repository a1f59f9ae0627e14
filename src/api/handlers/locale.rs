//! Locale preference cookie. Plain value, not sealed: the locale is not a
//! credential and the frontend reads it before any session exists.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::handlers::auth::AuthState;
use crate::session::cookie_value;

const LOCALE_COOKIE_NAME: &str = "hejmo_locale";
const LOCALE_COOKIE_MAX_AGE: u64 = 365 * 24 * 60 * 60;
const DEFAULT_LOCALE: &str = "en";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LocaleResponse {
    pub locale: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SetLocaleRequest {
    pub locale: String,
}

/// `en`, `eo`, `pt-BR` and the like; anything else is rejected.
fn valid_locale(locale: &str) -> bool {
    let mut parts = locale.split('-');
    let language = parts.next().unwrap_or_default();
    let language_ok =
        (2..=3).contains(&language.len()) && language.chars().all(|c| c.is_ascii_lowercase());
    match parts.next() {
        None => language_ok && locale.len() == language.len(),
        Some(region) => {
            language_ok
                && parts.next().is_none()
                && region.len() == 2
                && region.chars().all(|c| c.is_ascii_uppercase())
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/locale",
    responses(
        (status = 200, description = "Current locale", body = LocaleResponse)
    ),
    tag = "hejmo"
)]
pub async fn get_locale(headers: HeaderMap) -> impl IntoResponse {
    let locale = cookie_value(&headers, LOCALE_COOKIE_NAME)
        .filter(|locale| valid_locale(locale))
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
    Json(LocaleResponse { locale })
}

#[utoipa::path(
    put,
    path = "/v1/locale",
    request_body = SetLocaleRequest,
    responses(
        (status = 200, description = "Locale stored", body = LocaleResponse),
        (status = 400, description = "Invalid locale", body = String)
    ),
    tag = "hejmo"
)]
pub async fn set_locale(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SetLocaleRequest>>,
) -> impl IntoResponse {
    let request: SetLocaleRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };
    if !valid_locale(&request.locale) {
        return (StatusCode::BAD_REQUEST, "Invalid locale".to_string()).into_response();
    }

    let mut cookie = format!(
        "{LOCALE_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={LOCALE_COOKIE_MAX_AGE}",
        request.locale
    );
    if auth_state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    let mut response_headers = HeaderMap::new();
    match cookie.parse() {
        Ok(value) => {
            response_headers.insert(SET_COOKIE, value);
        }
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Invalid locale".to_string()).into_response();
        }
    }
    (
        response_headers,
        Json(LocaleResponse {
            locale: request.locale,
        }),
    )
        .into_response()
}
