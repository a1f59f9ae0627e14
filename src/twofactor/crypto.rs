//! Secret-at-rest encryption for TOTP seeds.
//!
//! Ciphertext layout is `nonce (12 bytes) || ciphertext`; the AAD binds the
//! blob to its owning user so a copied row cannot be replayed for another
//! account.

use anyhow::Result;
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use uuid::Uuid;

/// Encrypt a TOTP seed with the data-encryption key.
///
/// # Errors
/// Returns an error if encryption fails.
pub fn encrypt_secret(dek: &[u8], seed: &[u8], user_id: Uuid) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(dek));

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = construct_aad(user_id);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: seed,
                aad: &aad,
            },
        )
        .map_err(|err| anyhow::anyhow!("encryption failure: {err}"))?;

    let mut result = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a TOTP seed previously produced by [`encrypt_secret`].
///
/// # Errors
/// Returns an error if the blob is too short, was tampered with, or belongs
/// to a different user.
pub fn decrypt_secret(dek: &[u8], data: &[u8], user_id: Uuid) -> Result<Vec<u8>> {
    if data.len() < 12 {
        return Err(anyhow::anyhow!("invalid ciphertext length"));
    }

    let (nonce_bytes, ciphertext) = data.split_at(12);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(dek));

    let aad = construct_aad(user_id);
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        )
        .map_err(|err| anyhow::anyhow!("decryption failure: {err}"))?;

    Ok(plaintext)
}

fn construct_aad(user_id: Uuid) -> Vec<u8> {
    format!("totp-secret:v1|{user_id}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn encrypt_decrypt_round_trip() {
        let dek = [42u8; 32];
        let seed = b"totp-seed-bytes-1234";
        let user_id = Uuid::new_v4();

        let encrypted = encrypt_secret(&dek, seed, user_id).unwrap();
        assert_ne!(encrypted.as_slice(), seed.as_slice());

        let decrypted = decrypt_secret(&dek, &encrypted, user_id).unwrap();
        assert_eq!(decrypted, seed);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn decrypt_fails_for_other_user() {
        let dek = [42u8; 32];
        let encrypted = encrypt_secret(&dek, b"seed", Uuid::new_v4()).unwrap();
        assert!(decrypt_secret(&dek, &encrypted, Uuid::new_v4()).is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn decrypt_fails_on_tampered_ciphertext() {
        let dek = [42u8; 32];
        let user_id = Uuid::new_v4();
        let mut encrypted = encrypt_secret(&dek, b"seed", user_id).unwrap();
        let last = encrypted.len() - 1;
        if let Some(byte) = encrypted.get_mut(last) {
            *byte ^= 0xFF;
        }
        assert!(decrypt_secret(&dek, &encrypted, user_id).is_err());
    }
}
