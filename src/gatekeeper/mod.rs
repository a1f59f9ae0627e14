//! Edge routing guard over path category and session level.
//!
//! The guard inspects the sealed session cookie on page navigation and either
//! lets the request through or redirects to the level-appropriate page. The
//! cookie is decoded defensively: any unseal failure is level `None`.
//!
//! The decision table is the contract:
//!
//! | Path category | None | Account | Full |
//! |---|---|---|---|
//! | Public | allow | allow | allow |
//! | Token | allow | allow | allow |
//! | Auth | allow | → profile-selection | → dashboard |
//! | Account-only | → login | allow | → dashboard |
//! | Protected | → login | → profile-selection | allow |

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::session::{SessionLevel, SessionManager};

pub const LOGIN_PATH: &str = "/login";
pub const PROFILE_SELECTION_PATH: &str = "/profile-selection";
pub const DASHBOARD_PATH: &str = "/dashboard";

const PUBLIC_PREFIXES: &[&str] = &["/setup", "/hub", "/api", "/v1", "/static", "/health"];
const TOKEN_PREFIXES: &[&str] = &[
    "/verify-email",
    "/reset-password",
    "/forgot-password",
    "/verify-2fa",
];
const AUTH_PREFIXES: &[&str] = &["/login", "/register"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathCategory {
    /// Setup, hub, api, and static assets; reachable at any level.
    Public,
    /// Token-bearing pages; always reachable so emailed links work.
    Token,
    /// Login and registration pages.
    Auth,
    /// Profile selection; requires Account, not Full.
    AccountOnly,
    /// Everything else requires a Full session.
    Protected,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RouteAction {
    Allow,
    Redirect(&'static str),
}

/// Classify a request path into its gatekeeper category.
#[must_use]
pub fn classify(path: &str) -> PathCategory {
    if matches_prefix(path, PUBLIC_PREFIXES) {
        PathCategory::Public
    } else if matches_prefix(path, TOKEN_PREFIXES) {
        PathCategory::Token
    } else if matches_prefix(path, AUTH_PREFIXES) {
        PathCategory::Auth
    } else if matches_prefix(path, &[PROFILE_SELECTION_PATH]) {
        PathCategory::AccountOnly
    } else {
        PathCategory::Protected
    }
}

fn matches_prefix(path: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// The authoritative decision table.
#[must_use]
pub fn decide(category: PathCategory, level: SessionLevel) -> RouteAction {
    match (category, level) {
        (PathCategory::Public | PathCategory::Token, _)
        | (PathCategory::Auth, SessionLevel::None)
        | (PathCategory::AccountOnly, SessionLevel::Account)
        | (PathCategory::Protected, SessionLevel::Full) => RouteAction::Allow,
        (PathCategory::Auth, SessionLevel::Account) => RouteAction::Redirect(PROFILE_SELECTION_PATH),
        (PathCategory::Auth | PathCategory::AccountOnly, SessionLevel::Full) => {
            RouteAction::Redirect(DASHBOARD_PATH)
        }
        (PathCategory::AccountOnly | PathCategory::Protected, SessionLevel::None) => {
            RouteAction::Redirect(LOGIN_PATH)
        }
        (PathCategory::Protected, SessionLevel::Account) => {
            RouteAction::Redirect(PROFILE_SELECTION_PATH)
        }
    }
}

/// Decide the action for a concrete request.
#[must_use]
pub fn decide_for_request(
    manager: &SessionManager,
    headers: &axum::http::HeaderMap,
    path: &str,
) -> RouteAction {
    // Unseal failures already collapse to no-session inside the manager.
    let level = manager
        .get_session(headers)
        .map_or(SessionLevel::None, |session| session.level());
    decide(classify(path), level)
}

/// Axum middleware applying the decision table to page navigation.
pub async fn guard(
    State(manager): State<SessionManager>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match decide_for_request(&manager, request.headers(), &path) {
        RouteAction::Allow => next.run(request).await,
        RouteAction::Redirect(target) => {
            debug!(path, target, "gatekeeper redirect");
            Redirect::temporary(target).into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sealed::Sealer;
    use axum::http::{HeaderMap, HeaderValue, header::COOKIE};
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn classify_covers_every_category() {
        assert_eq!(classify("/setup"), PathCategory::Public);
        assert_eq!(classify("/hub/overview"), PathCategory::Public);
        assert_eq!(classify("/api/tasks"), PathCategory::Public);
        assert_eq!(classify("/static/app.css"), PathCategory::Public);
        assert_eq!(classify("/verify-email"), PathCategory::Token);
        assert_eq!(classify("/reset-password/abc"), PathCategory::Token);
        assert_eq!(classify("/forgot-password"), PathCategory::Token);
        assert_eq!(classify("/verify-2fa"), PathCategory::Token);
        assert_eq!(classify("/login"), PathCategory::Auth);
        assert_eq!(classify("/register"), PathCategory::Auth);
        assert_eq!(classify("/profile-selection"), PathCategory::AccountOnly);
        assert_eq!(classify("/dashboard"), PathCategory::Protected);
        assert_eq!(classify("/"), PathCategory::Protected);
        // Prefix matching must not swallow lookalike paths.
        assert_eq!(classify("/loginable"), PathCategory::Protected);
    }

    #[test]
    fn decision_table_matches_contract() {
        use PathCategory::{AccountOnly, Auth, Protected, Public, Token};
        use RouteAction::{Allow, Redirect};
        use SessionLevel::{Account, Full, None};

        let cells = [
            (Public, None, Allow),
            (Public, Account, Allow),
            (Public, Full, Allow),
            (Token, None, Allow),
            (Token, Account, Allow),
            (Token, Full, Allow),
            (Auth, None, Allow),
            (Auth, Account, Redirect(PROFILE_SELECTION_PATH)),
            (Auth, Full, Redirect(DASHBOARD_PATH)),
            (AccountOnly, None, Redirect(LOGIN_PATH)),
            (AccountOnly, Account, Allow),
            (AccountOnly, Full, Redirect(DASHBOARD_PATH)),
            (Protected, None, Redirect(LOGIN_PATH)),
            (Protected, Account, Redirect(PROFILE_SELECTION_PATH)),
            (Protected, Full, Allow),
        ];

        for (category, level, expected) in cells {
            assert_eq!(
                decide(category, level),
                expected,
                "cell ({category:?}, {level:?})"
            );
        }
    }

    #[test]
    fn garbage_cookie_is_treated_as_no_session() {
        let manager = SessionManager::new(Sealer::new("secret"), Duration::from_secs(60), false);
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("hejmo_session=garbage"));
        assert_eq!(
            decide_for_request(&manager, &headers, "/dashboard"),
            RouteAction::Redirect(LOGIN_PATH)
        );
    }

    #[test]
    fn account_session_reaches_profile_selection() {
        let manager = SessionManager::new(Sealer::new("secret"), Duration::from_secs(60), false);
        let cookie = manager.set_account_session(Uuid::new_v4(), true).unwrap();
        let pair = cookie.to_str().unwrap().split(';').next().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&pair).unwrap());

        assert_eq!(
            decide_for_request(&manager, &headers, "/profile-selection"),
            RouteAction::Allow
        );
        assert_eq!(
            decide_for_request(&manager, &headers, "/dashboard"),
            RouteAction::Redirect(PROFILE_SELECTION_PATH)
        );
    }
}
