//! Key hierarchy holders.
//!
//! Master Secret → HKDF → root bundle → unwraps → collection bundle.
//! Neither the secret nor any bundle is ever persisted; all of them zeroize
//! on drop.

use crate::crypto::{CryptoError, Result};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The account master secret (`kB`) handed over by the login flow.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterSecret {
    bytes: Vec<u8>,
}

impl MasterSecret {
    /// Shortest secret accepted.
    pub const MIN_LEN: usize = 32;

    /// Wrap raw secret bytes, rejecting anything shorter than [`Self::MIN_LEN`].
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < Self::MIN_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: Self::MIN_LEN,
                got: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    /// Parse a hex-encoded secret, as printed by most account tooling.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("master secret: {}", e)))?;
        Self::new(bytes)
    }

    /// Get the secret bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MasterSecret([REDACTED; {}])", self.bytes.len())
    }
}

/// An (encryption key, HMAC key) pair.
///
/// Immutable once built. Two of these are alive during a run: the root
/// bundle derived from the master secret and the collection bundle it
/// unwraps from the `crypto/keys` record.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyBundle {
    encryption_key: [u8; 32],
    hmac_key: [u8; 32],
}

impl KeyBundle {
    /// Create a bundle from its two halves
    pub fn new(encryption_key: [u8; 32], hmac_key: [u8; 32]) -> Self {
        Self {
            encryption_key,
            hmac_key,
        }
    }

    /// Create a bundle from variable-length slices, checking each is 32 bytes.
    pub fn from_slices(encryption_key: &[u8], hmac_key: &[u8]) -> Result<Self> {
        let encryption_key: [u8; 32] =
            encryption_key
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 32,
                    got: encryption_key.len(),
                })?;
        let hmac_key: [u8; 32] = hmac_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                got: hmac_key.len(),
            })?;
        Ok(Self::new(encryption_key, hmac_key))
    }

    /// Split 64 bytes of key material: first half encrypts, second half authenticates.
    pub fn from_expanded(material: &[u8; 64]) -> Self {
        let mut encryption_key = [0u8; 32];
        let mut hmac_key = [0u8; 32];
        encryption_key.copy_from_slice(&material[..32]);
        hmac_key.copy_from_slice(&material[32..]);
        Self::new(encryption_key, hmac_key)
    }

    /// Generate a fresh random bundle
    pub fn random() -> Self {
        let mut material = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut material);
        let bundle = Self::from_expanded(&material);
        material.zeroize();
        bundle
    }

    pub fn encryption_key(&self) -> &[u8; 32] {
        &self.encryption_key
    }

    pub fn hmac_key(&self) -> &[u8; 32] {
        &self.hmac_key
    }
}

impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyBundle([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_master_secret_rejected() {
        let err = MasterSecret::new(vec![7u8; 16]).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::InvalidKeyLength {
                expected: 32,
                got: 16
            }
        ));
    }

    #[test]
    fn master_secret_from_hex() {
        let secret = MasterSecret::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(secret.as_bytes(), &[0xab; 32][..]);
        assert!(MasterSecret::from_hex("not hex").is_err());
    }

    #[test]
    fn expanded_material_splits_in_halves() {
        let mut material = [0u8; 64];
        material[..32].fill(1);
        material[32..].fill(2);

        let bundle = KeyBundle::from_expanded(&material);
        assert_eq!(bundle.encryption_key(), &[1u8; 32]);
        assert_eq!(bundle.hmac_key(), &[2u8; 32]);
    }

    #[test]
    fn from_slices_checks_lengths() {
        assert!(KeyBundle::from_slices(&[0u8; 32], &[0u8; 32]).is_ok());
        assert!(KeyBundle::from_slices(&[0u8; 16], &[0u8; 32]).is_err());
        assert!(KeyBundle::from_slices(&[0u8; 32], &[0u8; 33]).is_err());
    }

    #[test]
    fn debug_output_redacts_keys() {
        let bundle = KeyBundle::new([9u8; 32], [9u8; 32]);
        assert_eq!(format!("{:?}", bundle), "KeyBundle([REDACTED])");
        let secret = MasterSecret::new(vec![1u8; 32]).unwrap();
        assert_eq!(format!("{:?}", secret), "MasterSecret([REDACTED; 32])");
    }

    #[test]
    fn random_bundles_differ() {
        assert_ne!(KeyBundle::random(), KeyBundle::random());
    }
}
