//! Core type definitions for the blob storage engine.

/// Default payload ceiling, in bytes.
///
/// Onboarding credentials and protocol state are small; 1 MiB bounds every
/// legitimate blob while keeping whole-frame buffering cheap.
pub const DEFAULT_MAX_BLOB_BYTES: u64 = 1024 * 1024;

/// Protection mode applied to a stored blob.
///
/// The mode is chosen by the caller per operation. Mixing modes on the same
/// blob name is undefined behavior the store does not detect: a frame
/// written under one mode parses as garbage under another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobMode {
    /// Stored as-is. Integrity and confidentiality delegated to the
    /// filesystem.
    Plain,
    /// Payload bound by HMAC-SHA-256 under the device MAC key.
    Authenticated,
    /// Payload encrypted with AES-GCM under the device sealing key.
    Sealed,
}

/// Configuration for a [`BlobStore`](super::BlobStore).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Maximum accepted payload length, in bytes.
    ///
    /// Payloads above this are rejected on write, and frames declaring a
    /// larger payload are reported as malformed on read. Independent of
    /// this setting, payload lengths are capped at `u32::MAX` by the
    /// 4-byte frame length prefix.
    pub max_blob_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: DEFAULT_MAX_BLOB_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.max_blob_bytes, 1024 * 1024);
    }
}
