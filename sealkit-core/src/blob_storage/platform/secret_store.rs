//! Secret store trait for device-bound key material and the nonce slot.

use crate::blob_storage::crypto::{MacKey, SealingKey};
use crate::blob_storage::{NonceSlot, StorageResult};

/// Provider of the device-bound sealing key, MAC key, and nonce slot.
///
/// Production implementations should keep keys in hardware-backed storage
/// where available (secure element, TPM, OS keyring); a file-backed
/// provider is acceptable for PC-class devices and testing.
///
/// # Security Requirements
///
/// - Keys MUST be device-bound: sealed blobs are not portable and the
///   keys must not travel via backup or restore.
/// - Returned key containers are zeroized on drop; implementations must
///   not retain extra plaintext copies beyond their own backing store.
/// - `write_nonce_slot` MUST be durable before it returns: the engine
///   persists an advanced counter *before* writing the sealed frame, and
///   a lost slot update would allow nonce reuse after a crash.
///
/// # Concurrency
///
/// The engine serializes all nonce-slot access behind its own lock, so
/// implementations only need `read`/`write` to be individually atomic.
/// Multi-process coordination is out of scope.
pub trait SecretStore: Send + Sync {
    /// Returns the device-bound AES-GCM sealing key (128- or 256-bit).
    ///
    /// # Errors
    ///
    /// Returns [`KeyUnavailable`](crate::blob_storage::StorageError::KeyUnavailable)
    /// if the key does not exist or the provider refuses to release it.
    fn sealing_key(&self) -> StorageResult<SealingKey>;

    /// Returns the device-bound HMAC-SHA-256 key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyUnavailable`](crate::blob_storage::StorageError::KeyUnavailable)
    /// if the key does not exist or the provider refuses to release it.
    fn mac_key(&self) -> StorageResult<MacKey>;

    /// Reads the persistent nonce slot.
    ///
    /// Returns `Ok(None)` on a device that has never performed a sealed
    /// write.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot exists but cannot be read or decoded.
    fn read_nonce_slot(&self) -> StorageResult<Option<NonceSlot>>;

    /// Persists the nonce slot durably.
    ///
    /// The slot must be readable back after a crash as soon as this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be persisted.
    fn write_nonce_slot(&self, slot: &NonceSlot) -> StorageResult<()>;
}
