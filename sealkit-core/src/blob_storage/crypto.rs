//! Cryptographic primitives and key containers.
//!
//! Pure functions over the device-resident keys: keyed MAC
//! (HMAC-SHA-256), authenticated cipher (AES-GCM, 12-byte nonce, 16-byte
//! tag), constant-time comparison, and random generation. No file or
//! platform state lives here.
//!
//! The AEAD wrappers return [`aead::Error`] and leave classification to
//! the caller: the store knows which blob failed, this module only knows
//! that a tag did not verify.

use aes_gcm::aead::{self, Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::envelope::{MAC_SIZE, NONCE_SIZE, TAG_SIZE};
use super::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Size of an AES-128 sealing key in bytes.
pub const AES_128_KEY_SIZE: usize = 16;

/// Size of an AES-256 sealing key in bytes.
pub const AES_256_KEY_SIZE: usize = 32;

/// Size of the HMAC-SHA-256 key in bytes.
pub const MAC_KEY_SIZE: usize = 32;

/// Device-bound symmetric sealing key.
///
/// Supplied by the platform secret store per operation and never written
/// to any blob. The key bytes are zeroized on drop, so scoped acquisition
/// guarantees a wipe on every exit path.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum SealingKey {
    /// 128-bit key; seals with AES-128-GCM.
    Aes128([u8; AES_128_KEY_SIZE]),
    /// 256-bit key; seals with AES-256-GCM.
    Aes256([u8; AES_256_KEY_SIZE]),
}

impl SealingKey {
    /// Creates a sealing key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidInput`] unless the slice is exactly
    /// 16 or 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        match bytes.len() {
            AES_128_KEY_SIZE => {
                let mut key = [0u8; AES_128_KEY_SIZE];
                key.copy_from_slice(bytes);
                Ok(Self::Aes128(key))
            }
            AES_256_KEY_SIZE => {
                let mut key = [0u8; AES_256_KEY_SIZE];
                key.copy_from_slice(bytes);
                Ok(Self::Aes256(key))
            }
            len => Err(StorageError::invalid_input(
                "sealing_key",
                format!("expected 16 or 32 bytes, got {len}"),
            )),
        }
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Aes128(key) => key,
            Self::Aes256(key) => key,
        }
    }

    /// Returns the key length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Aes128(_) => AES_128_KEY_SIZE,
            Self::Aes256(_) => AES_256_KEY_SIZE,
        }
    }

    /// A key is never empty; provided for clippy's `len` convention.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingKey")
            .field("key", &"[REDACTED]")
            .field("len", &self.len())
            .finish()
    }
}

/// Device-bound HMAC-SHA-256 key.
///
/// Same hygiene as [`SealingKey`]: zeroized on drop, never persisted by
/// the store.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MacKey([u8; MAC_KEY_SIZE]);

impl MacKey {
    /// Creates a MAC key from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; MAC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; MAC_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for MacKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacKey").field("key", &"[REDACTED]").finish()
    }
}

/// Computes HMAC-SHA-256 over `msg`. Deterministic; no hidden state.
#[must_use]
pub fn hmac_sha256(key: &MacKey, msg: &[u8]) -> [u8; MAC_SIZE] {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(msg);
    let mut out = [0u8; MAC_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Encrypts `plaintext` with AES-GCM under `key` and `nonce`.
///
/// Returns the ciphertext (same length as the plaintext) and the detached
/// 16-byte authentication tag, matching the sealed frame layout. No
/// associated data is authenticated; existing blobs were sealed that way.
///
/// # Errors
///
/// Returns [`aead::Error`] if encryption fails (unreachable for payload
/// lengths the store accepts).
pub fn aes_gcm_encrypt(
    key: &SealingKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_SIZE]), aead::Error> {
    let mut sealed = match key {
        SealingKey::Aes128(k) => Aes128Gcm::new_from_slice(k)
            .expect("16-byte AES-128-GCM key")
            .encrypt(Nonce::from_slice(nonce), plaintext)?,
        SealingKey::Aes256(k) => Aes256Gcm::new_from_slice(k)
            .expect("32-byte AES-256-GCM key")
            .encrypt(Nonce::from_slice(nonce), plaintext)?,
    };

    let tag_at = sealed.len() - TAG_SIZE;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&sealed[tag_at..]);
    sealed.truncate(tag_at);
    Ok((sealed, tag))
}

/// Decrypts an AES-GCM ciphertext and verifies its tag.
///
/// Tag verification is constant-time inside the cipher implementation; on
/// failure no plaintext bytes are returned.
///
/// # Errors
///
/// Returns [`aead::Error`] when the tag does not verify (tampered
/// ciphertext, tag, or nonce, or a different key).
pub fn aes_gcm_decrypt(
    key: &SealingKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
) -> Result<Vec<u8>, aead::Error> {
    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    match key {
        SealingKey::Aes128(k) => Aes128Gcm::new_from_slice(k)
            .expect("16-byte AES-128-GCM key")
            .decrypt(Nonce::from_slice(nonce), sealed.as_slice()),
        SealingKey::Aes256(k) => Aes256Gcm::new_from_slice(k)
            .expect("32-byte AES-256-GCM key")
            .decrypt(Nonce::from_slice(nonce), sealed.as_slice()),
    }
}

/// Constant-time buffer equality.
///
/// Timing is independent of the position of the first differing byte.
/// Slices of different lengths compare unequal.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Fills `buf` with cryptographically strong random bytes.
///
/// # Panics
///
/// Panics if the system's random number generator fails.
pub fn fill_random(buf: &mut [u8]) {
    getrandom::getrandom(buf).expect("getrandom failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key_256() -> SealingKey {
        SealingKey::from_bytes(&[0x42; 32]).unwrap()
    }

    #[test]
    fn test_sealing_key_lengths() {
        assert_eq!(SealingKey::from_bytes(&[0; 16]).unwrap().len(), 16);
        assert_eq!(SealingKey::from_bytes(&[0; 32]).unwrap().len(), 32);
        assert!(matches!(
            SealingKey::from_bytes(&[0; 24]),
            Err(StorageError::InvalidInput { .. })
        ));
        assert!(matches!(
            SealingKey::from_bytes(&[]),
            Err(StorageError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_key_debug_redacted() {
        let sealing = test_key_256();
        let debug = format!("{sealing:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));

        let mac = MacKey::from_bytes([0x42; 32]);
        let debug = format!("{mac:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }

    #[test]
    fn test_hmac_deterministic() {
        let key = MacKey::from_bytes([0x0b; 32]);
        let a = hmac_sha256(&key, b"Hi There");
        let b = hmac_sha256(&key, b"Hi There");
        assert_eq!(a, b);
        assert_ne!(a, hmac_sha256(&key, b"Hi there"));
        assert_ne!(a, hmac_sha256(&MacKey::from_bytes([0x0c; 32]), b"Hi There"));
    }

    #[test]
    fn test_gcm_roundtrip_both_key_sizes() {
        let nonce = [0x07; NONCE_SIZE];
        for key in [
            SealingKey::from_bytes(&[0x11; 16]).unwrap(),
            SealingKey::from_bytes(&[0x22; 32]).unwrap(),
        ] {
            let (ciphertext, tag) = aes_gcm_encrypt(&key, &nonce, b"secret state").unwrap();
            assert_eq!(ciphertext.len(), b"secret state".len());
            assert_ne!(ciphertext.as_slice(), b"secret state".as_slice());

            let plaintext = aes_gcm_decrypt(&key, &nonce, &ciphertext, &tag).unwrap();
            assert_eq!(plaintext, b"secret state");
        }
    }

    #[test]
    fn test_gcm_rejects_tampered_inputs() {
        let key = test_key_256();
        let nonce = [0x07; NONCE_SIZE];
        let (ciphertext, tag) = aes_gcm_encrypt(&key, &nonce, b"secret state").unwrap();

        let mut bad_ct = ciphertext.clone();
        bad_ct[0] ^= 0x01;
        assert!(aes_gcm_decrypt(&key, &nonce, &bad_ct, &tag).is_err());

        let mut bad_tag = tag;
        bad_tag[15] ^= 0x01;
        assert!(aes_gcm_decrypt(&key, &nonce, &ciphertext, &bad_tag).is_err());

        let bad_nonce = [0x08; NONCE_SIZE];
        assert!(aes_gcm_decrypt(&key, &bad_nonce, &ciphertext, &tag).is_err());

        let other_key = SealingKey::from_bytes(&[0x43; 32]).unwrap();
        assert!(aes_gcm_decrypt(&other_key, &nonce, &ciphertext, &tag).is_err());
    }

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(b"same", b"same"));
        assert!(!ct_eq(b"same", b"sane"));
        assert!(!ct_eq(b"same", b"longer"));
        assert!(ct_eq(b"", b""));
    }

    #[test]
    fn test_fill_random_varies() {
        let mut a = [0u8; 12];
        let mut b = [0u8; 12];
        fill_random(&mut a);
        fill_random(&mut b);
        assert_ne!(a, b);
    }
}
