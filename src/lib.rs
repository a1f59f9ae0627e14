//! # Hejmo
//!
//! `hejmo` is the authentication and identity service behind the household
//! management app. It owns the multi-level session model, password and OAuth
//! sign-in, TOTP two-factor, and the email-token flows (verification,
//! password reset, email change).
//!
//! ## Session model
//!
//! The whole session lives in one sealed, HttpOnly cookie; there is no
//! server-side session table. Three ordered levels exist:
//!
//! 1. **None** — no cookie, or one that fails to unseal.
//! 2. **Account** — the household account holder is authenticated.
//! 3. **Full** — a member profile within the household is also selected.
//!
//! Handlers demand the level they need; the [`gatekeeper`] middleware decodes
//! the cookie defensively and routes page navigation by path category and
//! session level.
//!
//! ## Identity linking
//!
//! External identities (Google, Microsoft) resolve through a single decision
//! procedure in [`identity`]: explicit link from a live session, returning
//! provider account, verified-email auto-link, or registration. Unverified
//! provider emails never auto-link; that ordering is the takeover guard.
//!
//! ## Secrets at rest
//!
//! TOTP seeds are encrypted with a key derived from the server secret, email
//! tokens are stored as SHA-256 hashes, and recovery codes as peppered
//! Argon2id hashes. Raw tokens and codes never appear in logs.

pub mod api;
pub mod cli;
pub mod email;
pub mod gatekeeper;
pub mod identity;
pub mod sealed;
pub mod session;
pub mod store;
pub mod tokens;
pub mod twofactor;
