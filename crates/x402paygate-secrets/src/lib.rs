//! Authenticated-encryption storage for tenant secrets, and expansion of
//! `{{SECRET:NAME}}` placeholders in endpoint auth configuration.
//!
//! Encryption is AES-256-GCM with a fresh random 96-bit nonce per call; the
//! auth tag rides along appended to the ciphertext, the same layout used
//! elsewhere in this codebase for encrypt-at-rest payloads.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("encryption key must be exactly 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("failed to decrypt secret: bad key or tampered ciphertext")]
    Decrypt,
}

/// A 256-bit key used to encrypt and decrypt secret plaintexts.
#[derive(Clone)]
pub struct EncryptionKey(Key<Aes256Gcm>);

impl EncryptionKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SecretError> {
        if bytes.len() != 32 {
            return Err(SecretError::BadKeyLength(bytes.len()));
        }
        Ok(Self(*Key::<Aes256Gcm>::from_slice(bytes)))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, SecretError> {
        let bytes = hex::decode(hex_str).map_err(|_| SecretError::BadKeyLength(hex_str.len() / 2))?;
        Self::from_bytes(&bytes)
    }
}

/// Ciphertext (tag appended) plus the nonce it was sealed with, as stored
/// on a `Secret` row.
#[derive(Debug, Clone)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Encrypts a plaintext secret value with a freshly generated nonce.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<SealedSecret, SecretError> {
    let cipher = Aes256Gcm::new(&key.0);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| SecretError::Decrypt)?;
    Ok(SealedSecret {
        ciphertext,
        nonce: nonce.to_vec(),
    })
}

/// Decrypts a previously sealed secret.
pub fn decrypt(key: &EncryptionKey, sealed: &SealedSecret) -> Result<Vec<u8>, SecretError> {
    let cipher = Aes256Gcm::new(&key.0);
    let nonce = aes_gcm::Nonce::from_slice(&sealed.nonce);
    cipher
        .decrypt(nonce, sealed.ciphertext.as_ref())
        .map_err(|_| SecretError::Decrypt)
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{SECRET:([A-Z_][A-Z0-9_]*)\}\}").unwrap());

/// Replaces every `{{SECRET:NAME}}` occurrence in `template` by calling
/// `lookup` for each referenced name and decrypting the result. Unknown
/// references are left intact -- resolution must never abort because one
/// secret is missing.
pub fn resolve_references<F>(
    key: &EncryptionKey,
    template: &str,
    mut lookup: F,
) -> String
where
    F: FnMut(&str) -> Option<SealedSecret>,
{
    let mut cache: HashMap<String, String> = HashMap::new();
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            if let Some(resolved) = cache.get(name) {
                return resolved.clone();
            }
            let Some(sealed) = lookup(name) else {
                tracing::warn!(secret = name, "unknown secret reference, leaving placeholder intact");
                return caps[0].to_string();
            };
            match decrypt(key, &sealed) {
                Ok(plaintext) => {
                    let value = String::from_utf8_lossy(&plaintext).into_owned();
                    cache.insert(name.to_string(), value.clone());
                    value
                }
                Err(_) => {
                    tracing::error!(secret = name, "failed to decrypt referenced secret");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}
