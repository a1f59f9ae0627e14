//! TOTP primitives: SHA1, 6 digits, 30-second step, ±1 step skew.

use anyhow::{Result, anyhow};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECONDS: u64 = 30;

/// Generate a fresh random TOTP seed.
///
/// # Errors
/// Returns an error if secret generation fails.
pub(super) fn generate_seed() -> Result<Vec<u8>> {
    Secret::generate_secret()
        .to_bytes()
        .map_err(|err| anyhow!("secret generation error: {err}"))
}

pub(super) fn build(seed: Vec<u8>, issuer: &str, account: &str) -> Result<TOTP> {
    TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP_SECONDS,
        seed,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|err| anyhow!("TOTP init error: {err}"))
}

/// Check a submitted code against the seed, tolerating one step of clock
/// skew in either direction. No side effects.
pub(super) fn check(seed: Vec<u8>, issuer: &str, code: &str) -> Result<bool> {
    let totp = build(seed, issuer, "member")?;
    Ok(totp.check_current(code).unwrap_or(false))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[test]
    fn accepts_adjacent_steps_rejects_distant_ones() {
        let seed = generate_seed().unwrap();
        let totp = build(seed, "hejmo", "member").unwrap();
        let t = now();

        // Codes from one step in the past or future are inside the skew window.
        assert!(totp.check(&totp.generate(t), t));
        assert!(totp.check(&totp.generate(t - STEP_SECONDS), t));
        assert!(totp.check(&totp.generate(t + STEP_SECONDS), t));

        // Two steps away is outside the window.
        let distant = totp.generate(t + 2 * STEP_SECONDS);
        let near = totp.generate(t);
        if distant != near {
            assert!(!totp.check(&distant, t));
        }
    }

    #[test]
    fn rejects_malformed_codes() {
        let seed = generate_seed().unwrap();
        assert!(!check(seed.clone(), "hejmo", "").unwrap());
        assert!(!check(seed, "hejmo", "not-a-code").unwrap());
    }
}
