use std::{env, fmt, sync::LazyLock};

use base64::{engine::general_purpose::STANDARD, Engine};

const KEY_VAR: &str = "TOKEN_ENCRYPTION_KEY";

static KEY: LazyLock<Option<String>> = LazyLock::new(|| env::var(KEY_VAR).ok());

#[derive(Debug)]
pub enum Error {
    MissingKey,
    EncryptFailed(anyhow::Error),
    DecryptFailed(anyhow::Error),
    DecodeFailed(base64::DecodeError),
    StringConversionFailed(std::string::FromUtf8Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MissingKey => write!(f, "{KEY_VAR} is not set"),
            Error::EncryptFailed(e) => write!(f, "encryption failed: {e}"),
            Error::DecryptFailed(e) => write!(f, "decryption failed: {e}"),
            Error::DecodeFailed(e) => write!(f, "base64 decode failed: {e}"),
            Error::StringConversionFailed(e) => write!(f, "decrypted value is not utf-8: {e}"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

fn key() -> Result<&'static str> {
    KEY.as_deref().ok_or(Error::MissingKey)
}

/// Encrypts with the process key and returns base64 text suitable for a text column.
pub fn encrypt(plain: &str) -> Result<String> {
    encrypt_with_key(plain, key()?)
}

pub fn decrypt(encoded: &str) -> Result<String> {
    decrypt_with_key(encoded, key()?)
}

pub fn encrypt_with_key(plain: &str, key: &str) -> Result<String> {
    let bytes = simple_crypt::encrypt(plain.as_bytes(), key.as_bytes())
        .map_err(Error::EncryptFailed)?;
    Ok(STANDARD.encode(bytes))
}

pub fn decrypt_with_key(encoded: &str, key: &str) -> Result<String> {
    let bytes = STANDARD.decode(encoded).map_err(Error::DecodeFailed)?;
    let plain = simple_crypt::decrypt(&bytes, key.as_bytes()).map_err(Error::DecryptFailed)?;
    String::from_utf8(plain).map_err(Error::StringConversionFailed)
}
