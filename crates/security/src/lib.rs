//! Secret-aware masking and value encryption.
//!
//! Sensitivity is a property of the key name, matched case-insensitively
//! against a fixed pattern list. Encrypted values are AES-256-GCM with a
//! random nonce, carried inline as `ENC:<base64(nonce || ciphertext)>` so
//! they still fit a flat `KEY=value` file.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use regex::Regex;
use thiserror::Error;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;

/// Marker distinguishing encrypted values from plaintext.
pub const ENC_PREFIX: &str = "ENC:";

static SENSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)PASSWORD|PASSWD|PASS|SECRET|TOKEN|API_KEY|APIKEY|PRIVATE_KEY|PRIVATE|ACCESS_KEY|ACCESS_TOKEN|AUTH|AUTHORIZATION|CREDENTIAL|CREDENTIALS",
    )
    .unwrap()
});

// ── Errors ────────────────────────────────────────────────────────────────────

pub type Result<T> = std::result::Result<T, SecurityError>;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The token is not `ENC:` plus valid base64 of at least a nonce.
    #[error("malformed encrypted token")]
    MalformedToken,

    #[error("malformed key file: {0}")]
    MalformedKey(String),

    #[error("invalid encryption key: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

// ── Masking ───────────────────────────────────────────────────────────────────

/// Whether a key name looks like it holds a secret.
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE.is_match(key)
}

/// Keeps the first four characters and replaces the rest with `***`. Values
/// of four characters or fewer mask entirely.
pub fn mask_value(value: &str) -> String {
    if value.chars().count() <= 4 {
        return "***".to_string();
    }
    let visible: String = value.chars().take(4).collect();
    format!("{visible}***")
}

/// Copy of `data` with every sensitive value masked.
pub fn mask_map(data: &HashMap<String, String>) -> HashMap<String, String> {
    data.iter()
        .map(|(key, value)| {
            let shown = if is_sensitive_key(key) {
                mask_value(value)
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

// ── Encryption ────────────────────────────────────────────────────────────────

pub fn generate_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

pub fn encrypt_value(plaintext: &str, key: &[u8; KEY_SIZE]) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|err| SecurityError::Encryption(err.to_string()))?;
    let mut packed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(&ciphertext);
    Ok(format!("{ENC_PREFIX}{}", BASE64.encode(packed)))
}

/// Inverse of [`encrypt_value`]; expects the full `ENC:` token.
pub fn decrypt_value(token: &str, key: &[u8; KEY_SIZE]) -> Result<String> {
    let encoded = token
        .strip_prefix(ENC_PREFIX)
        .ok_or(SecurityError::MalformedToken)?;
    let packed = BASE64
        .decode(encoded)
        .map_err(|_| SecurityError::MalformedToken)?;
    if packed.len() <= NONCE_SIZE {
        return Err(SecurityError::MalformedToken);
    }
    let (nonce_bytes, ciphertext) = packed.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|err| SecurityError::Decryption(err.to_string()))?;
    String::from_utf8(plaintext).map_err(|_| SecurityError::Decryption("not valid UTF-8".into()))
}

/// Encrypts map values in place of the plaintext. With `only_sensitive`,
/// non-sensitive keys pass through untouched. Values already carrying the
/// `ENC:` prefix are never encrypted twice.
pub fn encrypt_map(
    data: &HashMap<String, String>,
    key: &[u8; KEY_SIZE],
    only_sensitive: bool,
) -> Result<HashMap<String, String>> {
    let mut result = HashMap::with_capacity(data.len());
    for (name, value) in data {
        let skip = (only_sensitive && !is_sensitive_key(name)) || value.starts_with(ENC_PREFIX);
        let stored = if skip {
            value.clone()
        } else {
            encrypt_value(value, key)?
        };
        result.insert(name.clone(), stored);
    }
    Ok(result)
}

/// Decrypts every `ENC:` value; plaintext values pass through.
pub fn decrypt_map(
    data: &HashMap<String, String>,
    key: &[u8; KEY_SIZE],
) -> Result<HashMap<String, String>> {
    let mut result = HashMap::with_capacity(data.len());
    for (name, value) in data {
        let stored = if value.starts_with(ENC_PREFIX) {
            decrypt_value(value, key)?
        } else {
            value.clone()
        };
        result.insert(name.clone(), stored);
    }
    Ok(result)
}

// ── Key files ─────────────────────────────────────────────────────────────────

/// Reads a base64 key file, or generates one with owner-only permissions
/// when it does not exist.
pub fn load_or_create_key(path: impl AsRef<Path>) -> Result<[u8; KEY_SIZE]> {
    let path = path.as_ref();
    if path.exists() {
        return load_key(path);
    }
    let key = generate_key();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, BASE64.encode(key))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(key)
}

pub fn load_key(path: impl AsRef<Path>) -> Result<[u8; KEY_SIZE]> {
    let encoded = fs::read_to_string(path)?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|err| SecurityError::MalformedKey(err.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| SecurityError::InvalidKeySize {
            expected: KEY_SIZE,
            actual,
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
