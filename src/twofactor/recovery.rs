//! Recovery code generation and verification.
//!
//! Codes are random hex rendered as `XXXX-XXXX`. The plaintext batch is shown
//! to the user exactly once; only Argon2id hashes (with a server-side pepper)
//! are persisted. Submitted codes are normalized (separators stripped,
//! case-folded) before matching.

use anyhow::{Context, Result};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand::{RngCore, rngs::OsRng};

pub(super) const RECOVERY_CODE_COUNT: usize = 10;
const RECOVERY_CODE_LEN: usize = 8;
const RECOVERY_CODE_GROUP_SIZE: usize = 4;

/// A freshly generated recovery-code batch (plaintext + hashes).
#[derive(Debug)]
pub struct RecoveryCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

impl RecoveryCodeBatch {
    /// Generate a new batch of [`RECOVERY_CODE_COUNT`] codes.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn generate(pepper: &[u8]) -> Result<Self> {
        let mut codes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(RECOVERY_CODE_COUNT);
        for _ in 0..RECOVERY_CODE_COUNT {
            let code = generate_code()?;
            let hash = hash_recovery_code(&code, pepper)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(Self { codes, code_hashes })
    }
}

/// Normalize a submitted recovery code to its canonical ungrouped form.
///
/// # Errors
/// Rejects input that cannot be a recovery code (wrong length, non-hex).
pub(super) fn normalize_recovery_code(input: &str) -> Result<String> {
    let normalized: String = input
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect();

    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }
    if !normalized.bytes().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow::anyhow!("invalid recovery code characters"));
    }
    Ok(normalized)
}

/// Format a normalized code into the `XXXX-XXXX` display form.
pub(super) fn format_recovery_code(normalized: &str) -> Result<String> {
    if normalized.len() != RECOVERY_CODE_LEN {
        return Err(anyhow::anyhow!("invalid recovery code length"));
    }
    let mut out = String::with_capacity(RECOVERY_CODE_LEN + 1);
    for (idx, chunk) in normalized
        .as_bytes()
        .chunks(RECOVERY_CODE_GROUP_SIZE)
        .enumerate()
    {
        if idx > 0 {
            out.push('-');
        }
        out.push_str(std::str::from_utf8(chunk).context("invalid recovery code chunk")?);
    }
    Ok(out)
}

/// Verify a normalized code against one stored hash.
pub(super) fn verify_recovery_code(normalized: &str, stored_hash: &str, pepper: &[u8]) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    let Ok(argon2) = peppered_argon2(pepper) else {
        return false;
    };
    argon2
        .verify_password(normalized.as_bytes(), &parsed)
        .is_ok()
}

fn generate_code() -> Result<String> {
    let mut raw = [0u8; RECOVERY_CODE_LEN / 2];
    OsRng.fill_bytes(&mut raw);
    let mut normalized = String::with_capacity(RECOVERY_CODE_LEN);
    for byte in raw {
        normalized.push_str(&format!("{byte:02X}"));
    }
    format_recovery_code(&normalized)
}

fn hash_recovery_code(code: &str, pepper: &[u8]) -> Result<String> {
    let normalized = normalize_recovery_code(code)?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = peppered_argon2(pepper)?
        .hash_password(normalized.as_bytes(), &salt)
        .map_err(|_| anyhow::anyhow!("failed to hash recovery code"))?
        .to_string();
    Ok(hash)
}

fn peppered_argon2(pepper: &[u8]) -> Result<Argon2<'_>> {
    Argon2::new_with_secret(
        pepper,
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2::Params::default(),
    )
    .map_err(|_| anyhow::anyhow!("failed to initialize Argon2id"))
}
