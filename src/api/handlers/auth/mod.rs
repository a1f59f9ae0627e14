//! Auth handlers and supporting modules.
//!
//! This module coordinates password and OAuth login, the two-factor protocol,
//! sealed-cookie sessions, and the email-token flows. Handlers stay thin:
//! they validate input, consult the rate limiter, and call into the domain
//! modules (`tokens`, `twofactor`, `identity`, `session`).

pub(crate) mod login;
pub(crate) mod oauth;
mod rate_limit;
pub(crate) mod register;
pub(crate) mod session;
mod state;
pub(crate) mod two_factor;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use rate_limit::{NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter};
pub use state::{AuthConfig, AuthState};
