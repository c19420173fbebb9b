//! The blob store façade.
//!
//! Orchestrates the envelope codec, crypto primitives, nonce manager, and
//! the platform secret store to implement `size`, `read`, and `write` per
//! protection mode. All operations are blocking and synchronous; errors
//! surface to the caller and nothing is retried internally.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use zeroize::{Zeroize, Zeroizing};

use super::crypto;
use super::envelope;
use super::nonce::NonceManager;
use super::platform::{atomic_replace, SecretStore};
use super::{BlobMode, StorageError, StorageResult, StoreConfig};

/// Secure blob store rooted at a directory.
///
/// Blob names resolve against the root directory and are otherwise opaque;
/// uniqueness is the caller's responsibility. Mixing modes on one name is
/// undefined behavior the store does not detect.
///
/// # Concurrency
///
/// Reads of distinct blobs proceed in parallel. Sealed writes serialize
/// their nonce allocation internally; the per-blob files themselves are
/// not locked against concurrent writers, which callers serialize
/// externally.
///
/// # Crash Safety
///
/// For sealed writes the advanced nonce counter is persisted durably
/// *before* the frame file is replaced. A crash in between wastes a nonce
/// and leaves the previous frame intact; it can never make a used nonce
/// reappear. A write that fails after the counter advanced reports the
/// error, and the nonce stays consumed.
pub struct BlobStore<S: SecretStore> {
    /// Directory blobs are stored under.
    directory: PathBuf,
    config: StoreConfig,
    secrets: Arc<S>,
    nonces: NonceManager<S>,
}

impl<S: SecretStore> BlobStore<S> {
    /// Creates a store with the default configuration, creating the root
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(directory: P, secrets: Arc<S>) -> StorageResult<Self> {
        Self::with_config(directory, secrets, StoreConfig::default())
    }

    /// Creates a store with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn with_config<P: AsRef<Path>>(
        directory: P,
        secrets: Arc<S>,
        config: StoreConfig,
    ) -> StorageResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            StorageError::io(
                format!("creating blob directory '{}'", directory.display()),
                e,
            )
        })?;
        Ok(Self {
            directory,
            config,
            secrets: Arc::clone(&secrets),
            nonces: NonceManager::new(secrets),
        })
    }

    /// Returns the root directory blobs are stored under.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns whether the named blob exists on disk.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.blob_path(name).exists()
    }

    /// Returns the stored payload length of a blob.
    ///
    /// Returns `0` for an absent blob. The length is computed from the
    /// file size and the mode's fixed frame overhead, without reading the
    /// file.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Malformed`] if the file is shorter than the
    ///   frame header or declares a payload above the configured maximum.
    /// - [`StorageError::Io`] on filesystem failure.
    pub fn size(&self, name: &str, mode: BlobMode) -> StorageResult<u64> {
        let path = self.blob_path(name);
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(format!("sizing blob '{name}'"), e)),
        };

        let payload_len = envelope::payload_len(mode, metadata.len())?;
        self.check_payload_len(payload_len)?;
        Ok(payload_len)
    }

    /// Reads and verifies a blob into `out`.
    ///
    /// Returns the number of payload bytes copied. Verification happens
    /// before any payload byte reaches `out`; on an authentication
    /// failure the whole buffer is zeroized so no stale or partial
    /// plaintext survives in it.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the blob does not exist.
    /// - [`StorageError::BufferTooSmall`] if `out` is shorter than the
    ///   stored payload.
    /// - [`StorageError::MacMismatch`] / [`StorageError::SealMismatch`]
    ///   on tampered frames.
    /// - [`StorageError::Malformed`], [`StorageError::KeyUnavailable`],
    ///   [`StorageError::Io`] as applicable.
    pub fn read(&self, name: &str, mode: BlobMode, out: &mut [u8]) -> StorageResult<usize> {
        if out.is_empty() {
            return Err(StorageError::invalid_input("out", "empty read buffer"));
        }

        let frame = self.load_frame(name)?;

        match mode {
            BlobMode::Plain => {
                self.check_payload_len(frame.len() as u64)?;
                Self::copy_payload(&frame, out)
            }
            BlobMode::Authenticated => {
                let parsed = envelope::parse_authenticated(&frame)?;
                self.check_payload_len(parsed.payload.len() as u64)?;
                Self::check_capacity(parsed.payload.len(), out.len())?;

                let mac_key = self.secrets.mac_key()?;
                let computed = crypto::hmac_sha256(&mac_key, parsed.payload);
                if !crypto::ct_eq(&computed, &parsed.mac) {
                    out.zeroize();
                    warn!("HMAC mismatch reading blob '{name}'");
                    return Err(StorageError::mac_mismatch(name));
                }

                Self::copy_payload(parsed.payload, out)
            }
            BlobMode::Sealed => {
                let parsed = envelope::parse_sealed(&frame)?;
                self.check_payload_len(parsed.ciphertext.len() as u64)?;
                Self::check_capacity(parsed.ciphertext.len(), out.len())?;

                let sealing_key = self.secrets.sealing_key()?;
                let plaintext = match crypto::aes_gcm_decrypt(
                    &sealing_key,
                    &parsed.nonce,
                    parsed.ciphertext,
                    &parsed.tag,
                ) {
                    Ok(plaintext) => Zeroizing::new(plaintext),
                    Err(_) => {
                        out.zeroize();
                        warn!("seal authentication failed reading blob '{name}'");
                        return Err(StorageError::seal_mismatch(name));
                    }
                };

                Self::copy_payload(&plaintext, out)
            }
        }
    }

    /// Writes a blob, replacing any previous content atomically.
    ///
    /// The frame is assembled in memory and published with
    /// write-to-temp-then-rename, so readers observe either the previous
    /// blob or the new one in full. For sealed blobs the nonce counter is
    /// advanced and persisted durably before the frame is published.
    ///
    /// Returns `data.len()` on success.
    ///
    /// # Errors
    ///
    /// - [`StorageError::InvalidInput`] for an empty payload or one above
    ///   the configured maximum.
    /// - [`StorageError::NonceExhausted`] once the sealed-mode nonce
    ///   counter is spent; permanent.
    /// - [`StorageError::KeyUnavailable`], [`StorageError::Io`] as
    ///   applicable.
    pub fn write(&self, name: &str, mode: BlobMode, data: &[u8]) -> StorageResult<usize> {
        if data.is_empty() {
            return Err(StorageError::invalid_input("data", "empty payload"));
        }
        if data.len() as u64 > self.config.max_blob_bytes {
            return Err(StorageError::invalid_input(
                "data",
                format!(
                    "payload is {} bytes, maximum is {}",
                    data.len(),
                    self.config.max_blob_bytes
                ),
            ));
        }
        if u32::try_from(data.len()).is_err() {
            return Err(StorageError::invalid_input(
                "data",
                "payload exceeds the 4-byte frame length prefix",
            ));
        }

        let frame = match mode {
            BlobMode::Plain => data.to_vec(),
            BlobMode::Authenticated => {
                let mac_key = self.secrets.mac_key()?;
                let mac = crypto::hmac_sha256(&mac_key, data);
                envelope::encode_authenticated(&mac, data)
            }
            BlobMode::Sealed => {
                // The advanced counter is durable before the frame exists;
                // a crash here only wastes the nonce.
                let nonce = self.nonces.next_nonce(data.len() as u64)?;
                let sealing_key = self.secrets.sealing_key()?;
                let (ciphertext, tag) = crypto::aes_gcm_encrypt(&sealing_key, &nonce, data)
                    .map_err(|_| StorageError::internal("AES-GCM encryption failed"))?;
                envelope::encode_sealed(&nonce, &tag, &ciphertext)
            }
        };

        atomic_replace(&self.blob_path(name), &frame)?;
        debug!("wrote {mode:?} blob '{name}' ({} bytes)", data.len());
        Ok(data.len())
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    fn load_frame(&self, name: &str) -> StorageResult<Vec<u8>> {
        match fs::read(self.blob_path(name)) {
            Ok(frame) => Ok(frame),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(name))
            }
            Err(e) => Err(StorageError::io(format!("reading blob '{name}'"), e)),
        }
    }

    fn check_payload_len(&self, payload_len: u64) -> StorageResult<()> {
        if payload_len > self.config.max_blob_bytes {
            return Err(StorageError::malformed(format!(
                "payload length {payload_len} exceeds the configured maximum {}",
                self.config.max_blob_bytes
            )));
        }
        Ok(())
    }

    fn check_capacity(needed: usize, available: usize) -> StorageResult<()> {
        if available < needed {
            return Err(StorageError::BufferTooSmall { needed, available });
        }
        Ok(())
    }

    fn copy_payload(payload: &[u8], out: &mut [u8]) -> StorageResult<usize> {
        Self::check_capacity(payload.len(), out.len())?;
        out[..payload.len()].copy_from_slice(payload);
        Ok(payload.len())
    }
}

impl<S: SecretStore> std::fmt::Debug for BlobStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("directory", &self.directory)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
