//! Decryption of Chrome's locally stored password blobs.
//!
//! On Linux and macOS Chrome prefixes encrypted values with `v10` or `v11`
//! and encrypts them with AES-128-CBC:
//! - key: PBKDF2-HMAC-SHA1(secret, "saltysalt", iterations), 16 bytes
//! - IV: 16 spaces
//! - PKCS#7 padding
//!
//! The secret is `peanuts` with 1 iteration for the Linux fallback store,
//! the keyring/keychain entry otherwise (1 iteration on Linux, 1003 on macOS).
//! The provider is picked from configuration, never by probing the system.

use crate::{PassbridgeError, Result};
use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const SALT: &[u8] = b"saltysalt";
const IV: [u8; 16] = [b' '; 16];
const VERSION_PREFIXES: [&[u8]; 2] = [b"v10", b"v11"];

/// Secret Chrome uses when no keyring is available on Linux.
pub const LINUX_DEFAULT_SECRET: &str = "peanuts";
pub const LINUX_ITERATIONS: u32 = 1;
pub const MACOS_ITERATIONS: u32 = 1003;

/// Turns a stored `password_value` blob into the plaintext password.
pub trait LocalKeyProvider: Send + Sync {
    fn decrypt_password(&self, blob: &[u8]) -> Result<String>;
}

/// Which provider to build, as named in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyProviderKind {
    /// Values are stored unencrypted
    Plaintext,
    /// Linux store without a keyring (`peanuts`)
    #[default]
    LinuxDefault,
    /// Keyring or keychain secret supplied in `chrome.key_secret`
    Secret,
}

/// Build the provider named by `kind`.
pub fn provider_for(
    kind: KeyProviderKind,
    secret: Option<&str>,
    iterations: Option<u32>,
) -> Result<Box<dyn LocalKeyProvider>> {
    match kind {
        KeyProviderKind::Plaintext => Ok(Box::new(PlaintextKeyProvider)),
        KeyProviderKind::LinuxDefault => Ok(Box::new(ChromeObfuscationKeyProvider::linux_default())),
        KeyProviderKind::Secret => {
            let secret = secret.filter(|s| !s.is_empty()).ok_or_else(|| {
                PassbridgeError::Configuration(
                    "chrome.key_provider = \"secret\" requires chrome.key_secret".to_string(),
                )
            })?;
            let iterations = iterations.unwrap_or(if cfg!(target_os = "macos") {
                MACOS_ITERATIONS
            } else {
                LINUX_ITERATIONS
            });
            Ok(Box::new(ChromeObfuscationKeyProvider::new(
                secret.as_bytes(),
                iterations,
            )?))
        }
    }
}

fn split_version(blob: &[u8]) -> Option<&[u8]> {
    VERSION_PREFIXES
        .iter()
        .find_map(|prefix| blob.strip_prefix(*prefix))
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|_| PassbridgeError::LocalStore("password is not valid UTF-8".to_string()))
}

/// Accepts only unencrypted values.
#[derive(Debug, Default)]
pub struct PlaintextKeyProvider;

impl LocalKeyProvider for PlaintextKeyProvider {
    fn decrypt_password(&self, blob: &[u8]) -> Result<String> {
        if split_version(blob).is_some() {
            return Err(PassbridgeError::Configuration(
                "password is encrypted; configure chrome.key_provider".to_string(),
            ));
        }
        utf8(blob.to_vec())
    }
}

/// AES-128-CBC provider with a PBKDF2-derived key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ChromeObfuscationKeyProvider {
    key: [u8; 16],
}

impl ChromeObfuscationKeyProvider {
    pub fn new(secret: &[u8], iterations: u32) -> Result<Self> {
        if iterations == 0 {
            return Err(PassbridgeError::Configuration(
                "chrome.key_iterations must be at least 1".to_string(),
            ));
        }
        let mut key = [0u8; 16];
        pbkdf2::pbkdf2_hmac::<Sha1>(secret, SALT, iterations, &mut key);
        Ok(Self { key })
    }

    pub fn linux_default() -> Self {
        let mut key = [0u8; 16];
        pbkdf2::pbkdf2_hmac::<Sha1>(
            LINUX_DEFAULT_SECRET.as_bytes(),
            SALT,
            LINUX_ITERATIONS,
            &mut key,
        );
        Self { key }
    }
}

impl std::fmt::Debug for ChromeObfuscationKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChromeObfuscationKeyProvider([REDACTED])")
    }
}

impl LocalKeyProvider for ChromeObfuscationKeyProvider {
    fn decrypt_password(&self, blob: &[u8]) -> Result<String> {
        let Some(ciphertext) = split_version(blob) else {
            return utf8(blob.to_vec());
        };
        let plaintext = Aes128CbcDec::new((&self.key).into(), (&IV).into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| {
                PassbridgeError::LocalStore(
                    "could not decrypt password; check chrome.key_provider and key_secret"
                        .to_string(),
                )
            })?;
        utf8(plaintext)
    }
}
