//! AES-256-GCM sealing for stored secrets.
//!
//! Access tokens, refresh tokens, gateway API keys and signing secrets are each sealed
//! with their own random nonce. The master key is 32 bytes, supplied base64-encoded
//! through `PAYBRIDGE_ENCRYPTION_KEY`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const KEY_SIZE: usize = 32;

/// 96-bit nonce, standard for GCM
const NONCE_SIZE: usize = 12;

/// Decodes the base64 master key and checks it is exactly 32 bytes.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .context("Failed to decode base64 encryption key")?;

    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }

    Ok(key_bytes)
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }
    Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Failed to create cipher: {}", e))
}

/// Seals `plaintext`, returning base64 `(ciphertext, nonce)`.
///
/// A fresh nonce is drawn for every call; sealing the same value twice yields
/// different ciphertexts.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<(String, String)> {
    let cipher = cipher(key)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    Ok((BASE64.encode(&sealed), BASE64.encode(nonce)))
}

/// Opens a value sealed by [`encrypt`].
///
/// Fails on a wrong key, a mismatched nonce or any tampering with the ciphertext.
pub fn decrypt(ciphertext: &str, nonce: &str, key: &[u8]) -> Result<String> {
    let cipher = cipher(key)?;

    let sealed = BASE64
        .decode(ciphertext)
        .context("Failed to decode ciphertext")?;
    let nonce_bytes = BASE64.decode(nonce).context("Failed to decode nonce")?;

    if nonce_bytes.len() != NONCE_SIZE {
        return Err(anyhow!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        ));
    }

    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), sealed.as_ref())
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
}

/// A sealed column pair as stored in SQLite.
#[derive(Debug, Clone)]
pub(crate) struct SealedField {
    pub ciphertext: String,
    pub nonce: String,
}

impl SealedField {
    pub fn seal(plaintext: &str, key: &[u8], label: &str) -> Result<Self> {
        let (ciphertext, nonce) =
            encrypt(plaintext, key).with_context(|| format!("Failed to encrypt {}", label))?;
        Ok(Self { ciphertext, nonce })
    }

    pub fn open(&self, key: &[u8], label: &str) -> Result<String> {
        decrypt(&self.ciphertext, &self.nonce, key)
            .with_context(|| format!("Failed to decrypt {}", label))
    }
}
