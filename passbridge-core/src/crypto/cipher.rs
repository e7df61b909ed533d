//! AES-256-CBC encryption and HMAC-SHA256 authentication.
//!
//! The sync record format uses:
//! - 256-bit encryption key, 256-bit HMAC key
//! - 128-bit (16 byte) random IV per record
//! - PKCS#7 padding to the 16 byte block size
//! - Hex-encoded HMAC-SHA256 tag over the base64 ciphertext

use crate::crypto::{CryptoError, Result};
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block and IV size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Generate a fresh random IV
pub fn generate_iv() -> [u8; BLOCK_SIZE] {
    let mut iv = [0u8; BLOCK_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt with AES-256-CBC, applying PKCS#7 padding.
///
/// # Security Notes
/// - Never reuse an IV with the same key; use [`generate_iv`] per record.
/// - CBC alone is malleable. Callers must authenticate the output.
pub fn encrypt_cbc(key: &[u8; 32], iv: &[u8; BLOCK_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.is_empty() {
        return Err(CryptoError::EncryptionFailed(
            "Cannot encrypt empty data".to_string(),
        ));
    }

    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt AES-256-CBC data and strip PKCS#7 padding.
///
/// Fails on empty input, input that is not a whole number of blocks, and
/// bad padding.
pub fn decrypt_cbc(key: &[u8; 32], iv: &[u8; BLOCK_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.is_empty() {
        return Err(CryptoError::DecryptionFailed(
            "Cannot decrypt empty data".to_string(),
        ));
    }
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::DecryptionFailed(format!(
            "Ciphertext length {} is not a multiple of the block size",
            ciphertext.len()
        )));
    }

    let cipher = Aes256CbcDec::new(key.into(), iv.into());
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("Invalid padding".to_string()))
}

/// Compute the lowercase hex HMAC-SHA256 of `data`.
pub fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("HMAC key: {}", e)))?;
    mac.update(data);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a stored hex tag against the tag recomputed over `data`.
///
/// The comparison is exact (no case folding) and constant-time.
pub fn verify_hmac_hex(key: &[u8], data: &[u8], expected: &str) -> Result<()> {
    let computed = hmac_sha256_hex(key, data)?;
    if computed.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(CryptoError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let iv = generate_iv();
        let plaintext = b"Hello, World! This is a test.";

        let ciphertext = encrypt_cbc(&KEY, &iv, plaintext).unwrap();
        let decrypted = decrypt_cbc(&KEY, &iv, &ciphertext).unwrap();

        assert_eq!(plaintext.to_vec(), decrypted);
    }

    #[test]
    fn test_padding_to_block_size() {
        let iv = generate_iv();

        // A full block of input still gets a full block of padding
        let ciphertext = encrypt_cbc(&KEY, &iv, &[7u8; 16]).unwrap();
        assert_eq!(ciphertext.len(), 32);

        let ciphertext = encrypt_cbc(&KEY, &iv, &[7u8; 5]).unwrap();
        assert_eq!(ciphertext.len(), 16);
    }

    #[test]
    fn test_different_ivs() {
        let iv1 = generate_iv();
        let iv2 = generate_iv();
        assert_ne!(iv1, iv2);

        let c1 = encrypt_cbc(&KEY, &iv1, b"Same data").unwrap();
        let c2 = encrypt_cbc(&KEY, &iv2, b"Same data").unwrap();
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_empty_data_fails() {
        let iv = generate_iv();
        assert!(encrypt_cbc(&KEY, &iv, b"").is_err());
        assert!(decrypt_cbc(&KEY, &iv, b"").is_err());
    }

    #[test]
    fn test_partial_block_fails() {
        let iv = generate_iv();
        assert!(decrypt_cbc(&KEY, &iv, &[0u8; 17]).is_err());
    }

    #[test]
    fn test_wrong_key_does_not_yield_plaintext() {
        let iv = generate_iv();
        let plaintext = b"Secret data that spans more than one block";
        let ciphertext = encrypt_cbc(&KEY, &iv, plaintext).unwrap();

        // Wrong key usually fails on padding; when padding happens to parse,
        // the output is still garbage.
        match decrypt_cbc(&[0x24; 32], &iv, &ciphertext) {
            Ok(output) => assert_ne!(output, plaintext.to_vec()),
            Err(e) => assert!(matches!(e, CryptoError::DecryptionFailed(_))),
        }
    }

    #[test]
    fn test_hmac_is_hex_sha256() {
        let tag = hmac_sha256_hex(&KEY, b"data").unwrap();
        assert_eq!(tag.len(), 64);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_hmac_verification() {
        let tag = hmac_sha256_hex(&KEY, b"data").unwrap();
        assert!(verify_hmac_hex(&KEY, b"data", &tag).is_ok());
        assert!(matches!(
            verify_hmac_hex(&KEY, b"dato", &tag),
            Err(CryptoError::AuthenticationFailed)
        ));
        assert!(verify_hmac_hex(&[0u8; 32], b"data", &tag).is_err());
        assert!(verify_hmac_hex(&KEY, b"data", &tag.to_uppercase()).is_err());
        assert!(verify_hmac_hex(&KEY, b"data", &tag[..63]).is_err());
    }
}
