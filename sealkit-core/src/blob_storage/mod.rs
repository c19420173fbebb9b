//! Secure blob storage for device-onboarding state.
//!
//! A device participating in an onboarding protocol persists long-lived
//! credentials and protocol state to local files. Those files must survive
//! untrusted filesystem exposure with one of three per-blob guarantees:
//!
//! 1. **Plain** — stored as-is; integrity is delegated to the filesystem.
//!
//! 2. **Authenticated** — the payload is bound by an HMAC-SHA-256 under a
//!    device-resident MAC key, so any on-disk tampering is detected at read
//!    time.
//!
//! 3. **Sealed** — the payload is additionally encrypted with AES-GCM under
//!    a device-resident sealing key, using a strictly non-repeating nonce
//!    drawn from a persistent counter slot.
//!
//! # Platform Integration
//!
//! The engine depends on one platform-provided capability:
//!
//! - [`SecretStore`] — provider of the device-bound sealing key, the MAC
//!   key, and the durable nonce slot
//!
//! A file-backed implementation ([`FileSecretStore`]) and an in-memory test
//! double ([`MemorySecretStore`]) are included.
//!
//! [`SecretStore`]: platform::SecretStore
//! [`FileSecretStore`]: platform::FileSecretStore
//! [`MemorySecretStore`]: platform::MemorySecretStore

pub mod crypto;
pub mod envelope;
mod error;
mod nonce;
pub mod platform;
mod store;
mod types;

pub use error::StorageError;
pub use nonce::{NonceManager, NonceSlot};
pub use store::BlobStore;
pub use types::{BlobMode, StoreConfig, DEFAULT_MAX_BLOB_BYTES};

/// Result type alias for blob storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
