//! Encryption for Connection credentials at rest (§3, §4.2).
//!
//! A Connection's `credential` field (API key, token, password) is
//! never stored in plaintext. AES-256-GCM with a random nonce per
//! value; the nonce travels alongside the ciphertext so decryption
//! needs only the key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    /// `key` shorter than 32 bytes is zero-padded; longer is truncated.
    pub fn new(key: &[u8]) -> Result<Self> {
        let mut key_bytes = [0u8; KEY_SIZE];
        let len = key.len().min(KEY_SIZE);
        key_bytes[..len].copy_from_slice(&key[..len]);

        let cipher = Aes256Gcm::new_from_slice(&key_bytes).map_err(|e| anyhow!("building cipher: {e}"))?;
        Ok(Self { cipher })
    }

    pub fn from_base64_key(key_b64: &str) -> Result<Self> {
        let key = BASE64.decode(key_b64).map_err(|e| anyhow!("invalid base64 key: {e}"))?;
        Self::new(&key)
    }

    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }

    /// Returns `(ciphertext_b64, nonce_b64)`.
    pub fn encrypt(&self, plaintext: &str) -> Result<(String, String)> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("encryption failed: {e}"))?;

        Ok((BASE64.encode(&ciphertext), BASE64.encode(nonce_bytes)))
    }

    pub fn decrypt(&self, ciphertext_b64: &str, nonce_b64: &str) -> Result<String> {
        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| anyhow!("invalid ciphertext: {e}"))?;
        let nonce_bytes = BASE64.decode(nonce_b64).map_err(|e| anyhow!("invalid nonce: {e}"))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(anyhow!("invalid nonce length: expected {NONCE_SIZE}, got {}", nonce_bytes.len()));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| anyhow!("decryption failed: {e}"))?;
        String::from_utf8(plaintext).map_err(|e| anyhow!("decrypted value is not utf-8: {e}"))
    }
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").field("cipher", &"[redacted]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encrypt_decrypt() {
        let cipher = CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap();
        let (ciphertext, nonce) = cipher.encrypt("super-secret-token").unwrap();
        assert_ne!(ciphertext, "super-secret-token");
        assert_eq!(cipher.decrypt(&ciphertext, &nonce).unwrap(), "super-secret-token");
    }

    #[test]
    fn same_plaintext_yields_different_ciphertext() {
        let cipher = CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap();
        let (c1, n1) = cipher.encrypt("same").unwrap();
        let (c2, n2) = cipher.encrypt("same").unwrap();
        assert_ne!(c1, c2);
        assert_ne!(n1, n2);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let a = CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap();
        let b = CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap();
        let (ciphertext, nonce) = a.encrypt("secret").unwrap();
        assert!(b.decrypt(&ciphertext, &nonce).is_err());
    }
}
