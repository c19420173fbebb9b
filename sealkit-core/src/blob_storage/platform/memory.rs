//! In-memory secret store for testing.
//!
//! NOT secure for production use: keys are fixed process memory and the
//! nonce slot does not survive the process. Designed to exercise the
//! engine without touching platform key storage.

// Allow certain clippy lints for test-only code
#![allow(clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::blob_storage::crypto::{MacKey, SealingKey, MAC_KEY_SIZE};
use crate::blob_storage::{NonceSlot, StorageError, StorageResult};

use super::SecretStore;

/// In-memory implementation of [`SecretStore`].
///
/// Defaults to fixed test keys; the nonce slot can be pre-seeded to put
/// the manager into any state, and key release can be switched off to
/// exercise `KeyUnavailable` paths.
pub struct MemorySecretStore {
    sealing_key: Vec<u8>,
    mac_key: [u8; MAC_KEY_SIZE],
    slot: Mutex<Option<NonceSlot>>,
    keys_available: AtomicBool,
}

impl MemorySecretStore {
    /// Creates a store with fixed 256-bit test keys.
    #[must_use]
    pub fn new() -> Self {
        Self::with_keys(
            (0u8..32).collect(),
            [
                0x20, 0x21, 0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x2B, 0x2C,
                0x2D, 0x2E, 0x2F, 0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
                0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F,
            ],
        )
    }

    /// Creates a store with explicit key material.
    #[must_use]
    pub fn with_keys(sealing_key: Vec<u8>, mac_key: [u8; MAC_KEY_SIZE]) -> Self {
        Self {
            sealing_key,
            mac_key,
            slot: Mutex::new(None),
            keys_available: AtomicBool::new(true),
        }
    }

    /// Makes both key accessors fail with `KeyUnavailable`.
    pub fn deny_keys(&self) {
        self.keys_available.store(false, Ordering::SeqCst);
    }

    /// Restores key access after [`deny_keys`](Self::deny_keys).
    pub fn allow_keys(&self) {
        self.keys_available.store(true, Ordering::SeqCst);
    }

    /// Returns a copy of the current nonce slot.
    #[must_use]
    pub fn slot(&self) -> Option<NonceSlot> {
        *self.slot.lock().unwrap()
    }

    fn check_keys(&self) -> StorageResult<()> {
        if self.keys_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::key_unavailable(
                "memory secret store is denying key access",
            ))
        }
    }
}

impl Default for MemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for MemorySecretStore {
    fn sealing_key(&self) -> StorageResult<SealingKey> {
        self.check_keys()?;
        SealingKey::from_bytes(&self.sealing_key)
    }

    fn mac_key(&self) -> StorageResult<MacKey> {
        self.check_keys()?;
        Ok(MacKey::from_bytes(self.mac_key))
    }

    fn read_nonce_slot(&self) -> StorageResult<Option<NonceSlot>> {
        Ok(*self.slot.lock().unwrap())
    }

    fn write_nonce_slot(&self, slot: &NonceSlot) -> StorageResult<()> {
        *self.slot.lock().unwrap() = Some(*slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys() {
        let store = MemorySecretStore::new();
        assert_eq!(store.sealing_key().unwrap().len(), 32);
        store.mac_key().unwrap();
    }

    #[test]
    fn test_deny_keys() {
        let store = MemorySecretStore::new();
        store.deny_keys();
        assert!(matches!(
            store.sealing_key(),
            Err(StorageError::KeyUnavailable { .. })
        ));
        assert!(matches!(
            store.mac_key(),
            Err(StorageError::KeyUnavailable { .. })
        ));
        store.allow_keys();
        assert!(store.sealing_key().is_ok());
    }

    #[test]
    fn test_slot_storage() {
        let store = MemorySecretStore::new();
        assert!(store.read_nonce_slot().unwrap().is_none());

        let slot = NonceSlot::initialize();
        store.write_nonce_slot(&slot).unwrap();
        assert_eq!(store.read_nonce_slot().unwrap(), Some(slot));
        assert_eq!(store.slot(), Some(slot));
    }
}
