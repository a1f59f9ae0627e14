//! Two-factor authentication: TOTP secrets, recovery codes, and the
//! pending-login bridge between password and code verification.
//!
//! Security boundaries:
//! - TOTP secrets are encrypted at rest and only decrypted transiently.
//! - Recovery codes are Argon2id-hashed with a server-side pepper; each code
//!   is single-use.
//! - The pending-2FA token is an opaque capability with a 5-minute TTL; the
//!   user id never crosses the wire between the two login round trips.

pub(crate) mod crypto;
mod pending;
mod recovery;
mod service;
mod totp;

pub use pending::{PendingLogin, PendingTwoFactorStore};
pub use recovery::RecoveryCodeBatch;
pub use service::{EnrollmentStart, RecoveryConsumed, TwoFactorService};
