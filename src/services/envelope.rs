//! AES-256-GCM envelopes for stored blobs.
//!
//! Encryption: AES-256-GCM, fresh random 12-byte nonce per seal, no AAD.
//! Stored format: nonce (12 bytes) || tag (16 bytes) || ciphertext.
//! The nonce and tag are also copied into backend metadata as base64 hints;
//! the blob is authoritative and the hints are only cross-checked.

use crate::{
    backend::Metadata,
    config::ConfigError,
    errors::{StoreError, StoreResult},
};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{Engine as _, engine::general_purpose};
use rand::{TryRngCore, rngs::OsRng};
use std::fmt;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = NONCE_LEN + TAG_LEN;

pub const META_IV: &str = "encryption_iv";
pub const META_TAG: &str = "encryption_tag";

/// Process-wide 256-bit secret.
#[derive(Clone)]
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Decode the configured secret.
    ///
    /// Base64 that decodes to exactly 32 bytes wins; otherwise the raw value
    /// is used if it is exactly 32 bytes long.
    pub fn from_encoded(value: &str) -> Result<Self, ConfigError> {
        if let Ok(decoded) = general_purpose::STANDARD.decode(value.trim()) {
            if let Ok(bytes) = <[u8; KEY_LEN]>::try_from(decoded.as_slice()) {
                return Ok(Self(bytes));
            }
        }
        <[u8; KEY_LEN]>::try_from(value.as_bytes())
            .map(Self)
            .map_err(|_| ConfigError::InvalidKeyLength(value.len()))
    }

    fn cipher(&self) -> StoreResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|e| StoreError::Crypto(e.to_string()))
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// The nonce, tag and ciphertext produced by one seal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encrypt `plaintext` under `key` with a fresh nonce from the OS RNG.
    pub fn seal(plaintext: &[u8], key: &SecretKey) -> StoreResult<Self> {
        let cipher = key.cipher()?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| StoreError::Crypto(format!("nonce generation failed: {e}")))?;

        let mut sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| StoreError::Crypto(format!("encryption failed: {e}")))?;

        // The tag is the trailing block of the AEAD output.
        let split = sealed
            .len()
            .checked_sub(TAG_LEN)
            .ok_or_else(|| StoreError::Crypto("cipher output shorter than tag".into()))?;
        let tag = <[u8; TAG_LEN]>::try_from(&sealed[split..])
            .map_err(|_| StoreError::Crypto("malformed tag".into()))?;
        sealed.truncate(split);

        Ok(Self {
            nonce,
            tag,
            ciphertext: sealed,
        })
    }

    /// Verify and decrypt. A bad tag never yields any plaintext.
    pub fn open(&self, key: &SecretKey) -> StoreResult<Vec<u8>> {
        let cipher = key.cipher()?;
        let mut combined = Vec::with_capacity(self.ciphertext.len() + TAG_LEN);
        combined.extend_from_slice(&self.ciphertext);
        combined.extend_from_slice(&self.tag);

        cipher
            .decrypt(Nonce::from_slice(&self.nonce), combined.as_slice())
            .map_err(|_| StoreError::Authentication)
    }

    /// Serialize as `nonce || tag || ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the stored layout back into its parts.
    pub fn from_bytes(raw: &[u8]) -> StoreResult<Self> {
        if raw.len() < HEADER_LEN {
            return Err(StoreError::Crypto(format!(
                "envelope too short ({} < {} bytes)",
                raw.len(),
                HEADER_LEN
            )));
        }
        let (nonce, rest) = raw.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        Ok(Self {
            nonce: nonce
                .try_into()
                .map_err(|_| StoreError::Crypto("malformed nonce".into()))?,
            tag: tag
                .try_into()
                .map_err(|_| StoreError::Crypto("malformed tag".into()))?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Record the nonce and tag as base64 metadata hints.
    pub fn write_hints(&self, metadata: &mut Metadata) {
        metadata.insert(META_IV.into(), general_purpose::STANDARD.encode(self.nonce));
        metadata.insert(META_TAG.into(), general_purpose::STANDARD.encode(self.tag));
    }

    /// Cross-check metadata hints against the envelope's own nonce and tag.
    ///
    /// Missing hints are fine; present but disagreeing hints are corruption.
    pub fn verify_hints(&self, metadata: &Metadata) -> StoreResult<()> {
        check_hint(metadata, META_IV, &self.nonce)?;
        check_hint(metadata, META_TAG, &self.tag)
    }
}

fn check_hint(metadata: &Metadata, name: &str, expected: &[u8]) -> StoreResult<()> {
    let Some(encoded) = metadata.get(name) else {
        return Ok(());
    };
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| StoreError::CorruptData(format!("metadata `{name}` is not base64: {e}")))?;
    if decoded != expected {
        return Err(StoreError::CorruptData(format!(
            "metadata `{name}` disagrees with stored envelope"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_key() -> SecretKey {
        SecretKey::from_bytes([7u8; KEY_LEN])
    }

    #[test]
    fn test_roundtrip_seal_open() {
        let key = test_key();
        for plaintext in [&b""[..], b"hello", &[0u8; 4096][..]] {
            let envelope = Envelope::seal(plaintext, &key).unwrap();
            assert_eq!(envelope.ciphertext.len(), plaintext.len());
            assert_eq!(envelope.to_bytes().len(), HEADER_LEN + plaintext.len());

            let parsed = Envelope::from_bytes(&envelope.to_bytes()).unwrap();
            assert_eq!(parsed, envelope);
            assert_eq!(parsed.open(&key).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_any_flipped_bit_fails_authentication() {
        let key = test_key();
        let stored = Envelope::seal(b"sensitive content", &key).unwrap().to_bytes();

        for byte in NONCE_LEN..stored.len() {
            for bit in 0..8 {
                let mut tampered = stored.clone();
                tampered[byte] ^= 1 << bit;
                let result = Envelope::from_bytes(&tampered).unwrap().open(&key);
                assert!(
                    matches!(result, Err(StoreError::Authentication)),
                    "flip at byte {byte} bit {bit} was not detected"
                );
            }
        }
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let envelope = Envelope::seal(b"data", &test_key()).unwrap();
        let other = SecretKey::from_bytes([8u8; KEY_LEN]);
        assert!(matches!(envelope.open(&other), Err(StoreError::Authentication)));
    }

    #[test]
    fn test_nonces_are_unique() {
        let key = test_key();
        let nonces: HashSet<[u8; NONCE_LEN]> = (0..1000)
            .map(|_| Envelope::seal(b"same", &key).unwrap().nonce)
            .collect();
        assert_eq!(nonces.len(), 1000);
    }

    #[test]
    fn test_too_short_envelope_is_crypto_error() {
        assert!(matches!(
            Envelope::from_bytes(&[0u8; HEADER_LEN - 1]),
            Err(StoreError::Crypto(_))
        ));
    }

    #[test]
    fn test_hints_cross_check() {
        let envelope = Envelope::seal(b"data", &test_key()).unwrap();
        let mut meta = Metadata::new();
        envelope.verify_hints(&meta).unwrap();

        envelope.write_hints(&mut meta);
        envelope.verify_hints(&meta).unwrap();

        let other = Envelope::seal(b"data", &test_key()).unwrap();
        let mut mismatched = Metadata::new();
        other.write_hints(&mut mismatched);
        assert!(matches!(
            envelope.verify_hints(&mismatched),
            Err(StoreError::CorruptData(_))
        ));

        meta.insert(META_TAG.into(), "not base64!".into());
        assert!(matches!(
            envelope.verify_hints(&meta),
            Err(StoreError::CorruptData(_))
        ));
    }

    #[test]
    fn test_key_decoding() {
        let raw = [42u8; KEY_LEN];
        let encoded = general_purpose::STANDARD.encode(raw);
        assert_eq!(SecretKey::from_encoded(&encoded).unwrap().0, raw);

        // 32 raw characters that are not 32 bytes of base64
        let ascii = "0123456789abcdef0123456789abcdef";
        assert_eq!(SecretKey::from_encoded(ascii).unwrap().0, *ascii.as_bytes());

        assert!(matches!(
            SecretKey::from_encoded("too-short"),
            Err(ConfigError::InvalidKeyLength(9))
        ));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", test_key()), "SecretKey(<redacted>)");
    }
}
