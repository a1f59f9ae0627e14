//! Two-factor engine: enrollment, verification, and recovery-code consumption.

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{crypto, recovery, totp};
use crate::sealed::unix_now;
use crate::store::{AuthStore, TwoFactorRecord, User};

/// Data shown to the user once at enrollment start.
#[derive(Clone, Debug)]
pub struct EnrollmentStart {
    pub secret_base32: String,
    pub otpauth_url: String,
    /// `data:image/png;base64,...` QR of the otpauth URL.
    pub qr_data_url: String,
}

/// Result of consuming a recovery code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryConsumed {
    pub remaining: usize,
}

/// Orchestrates TOTP secrets and recovery codes over the injected store.
#[derive(Clone)]
pub struct TwoFactorService {
    store: Arc<dyn AuthStore>,
    dek: [u8; 32],
    pepper: Arc<[u8]>,
    issuer: String,
}

impl TwoFactorService {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, dek: [u8; 32], pepper: Arc<[u8]>, issuer: String) -> Self {
        Self {
            store,
            dek,
            pepper,
            issuer,
        }
    }

    /// Whether the user has a confirmed TOTP credential.
    ///
    /// # Errors
    /// Returns an error if the store lookup fails.
    pub async fn is_enabled(&self, user_id: Uuid) -> Result<bool> {
        Ok(self
            .store
            .get_two_factor(user_id)
            .await
            .context("failed to load two-factor record")?
            .is_some_and(|record| record.confirmed))
    }

    /// Begin enrollment: generate a seed, encrypt it at rest, and return the
    /// secret/QR for the authenticator app. The credential stays unconfirmed
    /// until the first code is verified.
    ///
    /// # Errors
    /// Returns an error if generation, encryption, or the store write fails.
    pub async fn enroll_begin(&self, user: &User) -> Result<EnrollmentStart> {
        let seed = totp::generate_seed()?;
        let ciphertext = crypto::encrypt_secret(&self.dek, &seed, user.id)?;

        self.store
            .upsert_two_factor(TwoFactorRecord {
                user_id: user.id,
                secret_ciphertext: ciphertext,
                confirmed: false,
            })
            .await
            .context("failed to store two-factor record")?;

        let handle = totp::build(seed, &self.issuer, &user.email)?;
        let qr = handle
            .get_qr_base64()
            .map_err(|err| anyhow!("QR generation error: {err}"))?;
        Ok(EnrollmentStart {
            secret_base32: handle.get_secret_base32(),
            otpauth_url: handle.get_url(),
            qr_data_url: format!("data:image/png;base64,{qr}"),
        })
    }

    /// Confirm enrollment with the first code. On success the credential is
    /// confirmed and a fresh recovery-code batch is returned in plaintext —
    /// the only time the codes are visible.
    ///
    /// # Errors
    /// Returns an error if no enrollment is in progress or the store fails.
    pub async fn enroll_confirm(&self, user_id: Uuid, code: &str) -> Result<Option<Vec<String>>> {
        let record = self
            .store
            .get_two_factor(user_id)
            .await
            .context("failed to load two-factor record")?
            .ok_or_else(|| anyhow!("no two-factor enrollment in progress"))?;

        let seed = crypto::decrypt_secret(&self.dek, &record.secret_ciphertext, user_id)?;
        if !totp::check(seed, &self.issuer, code)? {
            return Ok(None);
        }

        self.store
            .upsert_two_factor(TwoFactorRecord {
                confirmed: true,
                ..record
            })
            .await
            .context("failed to confirm two-factor record")?;

        let codes = self.regenerate_recovery_codes(user_id).await?;
        Ok(Some(codes))
    }

    /// Verify a TOTP code against the confirmed credential. Pure check, no
    /// side effects.
    ///
    /// # Errors
    /// Returns an error if decryption or the store lookup fails.
    pub async fn verify_code(&self, user_id: Uuid, code: &str) -> Result<bool> {
        let Some(record) = self
            .store
            .get_two_factor(user_id)
            .await
            .context("failed to load two-factor record")?
        else {
            return Ok(false);
        };
        if !record.confirmed {
            return Ok(false);
        }

        let seed = crypto::decrypt_secret(&self.dek, &record.secret_ciphertext, user_id)?;
        totp::check(seed, &self.issuer, code)
    }

    /// Match a submitted recovery code against the unused set and consume it.
    ///
    /// Exactly one hash may match. More than one match means colliding codes
    /// in storage, which is a data-integrity fault; it is logged and treated
    /// as no-match so the damaged set cannot be used to authenticate.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn verify_recovery_code(
        &self,
        user_id: Uuid,
        submitted: &str,
    ) -> Result<Option<RecoveryConsumed>> {
        let Ok(normalized) = recovery::normalize_recovery_code(submitted) else {
            return Ok(None);
        };

        let unused = self
            .store
            .list_unused_recovery_codes(user_id)
            .await
            .context("failed to list recovery codes")?;

        let matches: Vec<&str> = unused
            .iter()
            .filter(|record| {
                recovery::verify_recovery_code(&normalized, &record.code_hash, &self.pepper)
            })
            .map(|record| record.code_hash.as_str())
            .collect();

        let code_hash = match matches.as_slice() {
            [] => return Ok(None),
            [single] => *single,
            _ => {
                warn!(%user_id, "multiple recovery codes matched; refusing to consume");
                return Ok(None);
            }
        };

        let consumed = self
            .store
            .mark_recovery_code_used(user_id, code_hash, unix_now())
            .await
            .context("failed to consume recovery code")?;
        if !consumed {
            return Ok(None);
        }

        let remaining = self
            .store
            .count_unused_recovery_codes(user_id)
            .await
            .context("failed to count recovery codes")?;
        Ok(Some(RecoveryConsumed { remaining }))
    }

    /// Replace the whole recovery-code set; returns the new plaintext batch.
    ///
    /// # Errors
    /// Returns an error if generation or the store write fails.
    pub async fn regenerate_recovery_codes(&self, user_id: Uuid) -> Result<Vec<String>> {
        let batch = recovery::RecoveryCodeBatch::generate(&self.pepper)?;
        self.store
            .replace_recovery_codes(user_id, batch.code_hashes)
            .await
            .context("failed to store recovery codes")?;
        Ok(batch.codes)
    }

    /// Disable two-factor entirely (secret and recovery codes).
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn disable(&self, user_id: Uuid) -> Result<()> {
        self.store
            .delete_two_factor(user_id)
            .await
            .context("failed to delete two-factor record")?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewUser};
    use totp_rs::{Algorithm, Secret, TOTP};

    fn service(store: Arc<MemoryStore>) -> TwoFactorService {
        TwoFactorService::new(store, [7u8; 32], Arc::from(b"pepper".as_slice()), "hejmo".to_string())
    }

    async fn enrolled_user() -> (TwoFactorService, User, Vec<String>, TOTP) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                email: "a@x.com".to_string(),
                password_hash: None,
                email_verified: true,
                locale: "en".to_string(),
            })
            .await
            .unwrap();
        let service = service(store);

        let start = service.enroll_begin(&user).await.unwrap();
        let seed = Secret::Encoded(start.secret_base32.clone())
            .to_bytes()
            .unwrap();
        let totp = TOTP::new(Algorithm::SHA1, 6, 1, 30, seed, None, "test".to_string()).unwrap();

        let code = totp.generate_current().unwrap();
        let codes = service
            .enroll_confirm(user.id, &code)
            .await
            .unwrap()
            .expect("first code must confirm enrollment");
        (service, user, codes, totp)
    }

    #[tokio::test]
    async fn enrollment_confirms_and_enables() {
        let (service, user, codes, totp) = enrolled_user().await;
        assert_eq!(codes.len(), 10);
        assert!(service.is_enabled(user.id).await.unwrap());

        let code = totp.generate_current().unwrap();
        assert!(service.verify_code(user.id, &code).await.unwrap());
        assert!(!service.verify_code(user.id, "000000").await.unwrap() || code == "000000");
    }

    #[tokio::test]
    async fn unconfirmed_enrollment_does_not_enable() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                email: "a@x.com".to_string(),
                password_hash: None,
                email_verified: true,
                locale: "en".to_string(),
            })
            .await
            .unwrap();
        let service = service(store);

        service.enroll_begin(&user).await.unwrap();
        assert!(!service.is_enabled(user.id).await.unwrap());
        assert!(!service.verify_code(user.id, "123456").await.unwrap());
    }

    #[tokio::test]
    async fn wrong_confirmation_code_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                email: "a@x.com".to_string(),
                password_hash: None,
                email_verified: true,
                locale: "en".to_string(),
            })
            .await
            .unwrap();
        let service = service(store);

        service.enroll_begin(&user).await.unwrap();
        assert!(service
            .enroll_confirm(user.id, "not-a-code")
            .await
            .unwrap()
            .is_none());
        assert!(!service.is_enabled(user.id).await.unwrap());
    }

    #[tokio::test]
    async fn recovery_code_is_single_use() {
        let (service, user, codes, _totp) = enrolled_user().await;
        let code = codes.first().unwrap();

        let consumed = service
            .verify_recovery_code(user.id, code)
            .await
            .unwrap()
            .expect("fresh code must match");
        assert_eq!(consumed.remaining, 9);

        // Second submission of the same code must miss.
        assert!(service
            .verify_recovery_code(user.id, code)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn recovery_code_matching_is_normalization_tolerant() {
        let (service, user, codes, _totp) = enrolled_user().await;
        let sloppy = codes.first().unwrap().to_lowercase().replace('-', " ");
        assert!(service
            .verify_recovery_code(user.id, &sloppy)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn regeneration_invalidates_previous_batch() {
        let (service, user, codes, _totp) = enrolled_user().await;
        let fresh = service.regenerate_recovery_codes(user.id).await.unwrap();
        assert_eq!(fresh.len(), 10);

        let old = codes.first().unwrap();
        assert!(service
            .verify_recovery_code(user.id, old)
            .await
            .unwrap()
            .is_none());
        assert!(service
            .verify_recovery_code(user.id, fresh.first().unwrap())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn garbage_recovery_input_is_a_miss() {
        let (service, user, _codes, _totp) = enrolled_user().await;
        assert!(service
            .verify_recovery_code(user.id, "not a code at all")
            .await
            .unwrap()
            .is_none());
    }
}
