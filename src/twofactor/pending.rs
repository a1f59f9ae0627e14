//! Ephemeral bridge between password verification and code verification.
//!
//! After the password checks out on a 2FA-enabled account, the client gets an
//! opaque token; the `{user_id, remember_me}` payload stays server-side with
//! a hard TTL. `take` removes the entry unconditionally so a token can be
//! consumed at most once, and an expired or unknown token is a normal,
//! reportable miss rather than an error.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(5 * 60);

/// What the pending token stands in for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingLogin {
    pub user_id: Uuid,
    pub remember_me: bool,
}

struct Entry {
    login: PendingLogin,
    created_at: Instant,
}

/// TTL-bound token → pending-login map.
pub struct PendingTwoFactorStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl Default for PendingTwoFactorStore {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_TTL)
    }
}

impl PendingTwoFactorStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a pending login and return the opaque token for the client.
    pub async fn put(&self, login: PendingLogin) -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        entries.insert(
            token.clone(),
            Entry {
                login,
                created_at: Instant::now(),
            },
        );
        token
    }

    /// Look up a pending token without consuming it. A wrong code must not
    /// burn the token, so verification reads here and only `take`s on success.
    pub async fn get(&self, token: &str) -> Option<PendingLogin> {
        let entries = self.entries.lock().await;
        let entry = entries.get(token)?;
        if entry.created_at.elapsed() < self.ttl {
            Some(entry.login)
        } else {
            None
        }
    }

    /// Consume a pending token. Returns `None` for unknown, already consumed,
    /// or expired tokens; all three are indistinguishable to the caller.
    pub async fn take(&self, token: &str) -> Option<PendingLogin> {
        let mut entries = self.entries.lock().await;
        let entry = entries.remove(token)?;
        if entry.created_at.elapsed() < self.ttl {
            Some(entry.login)
        } else {
            None
        }
    }
}
