//! File-backed secret store.
//!
//! The reference provider for PC-class devices: key material and the
//! nonce slot live as plain files inside a dedicated directory. Slot
//! updates use the write-to-temp-then-rename pattern so a crash leaves
//! either the old record or the new one, never a torn write:
//!
//! 1. Write the new bytes to a temporary file in the same directory
//! 2. `fsync` the temporary file
//! 3. Atomically rename it over the target
//! 4. `fsync` the parent directory so the rename itself is durable

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

use crate::blob_storage::crypto::{self, MacKey, SealingKey, AES_256_KEY_SIZE, MAC_KEY_SIZE};
use crate::blob_storage::{NonceSlot, StorageError, StorageResult};

use super::SecretStore;

const SEALING_KEY_FILE: &str = "sealing.key";
const MAC_KEY_FILE: &str = "mac.key";
const NONCE_SLOT_FILE: &str = "nonce.slot";

/// File-backed implementation of [`SecretStore`].
///
/// Keys are raw bytes in `sealing.key` (16 or 32 bytes) and `mac.key`
/// (32 bytes); the nonce slot is the 25-byte record in `nonce.slot`.
/// [`provision`](Self::provision) generates missing keys on first use.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    /// Directory holding the key and slot files.
    directory: PathBuf,
}

impl FileSecretStore {
    /// Creates a store over the given directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new<P: AsRef<Path>>(directory: P) -> StorageResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| {
            StorageError::io(
                format!("creating secret store directory '{}'", directory.display()),
                e,
            )
        })?;
        Ok(Self { directory })
    }

    /// Generates any missing key files with fresh random material.
    ///
    /// The sealing key is provisioned as 256-bit. Existing key files are
    /// left untouched, so provisioning an already-provisioned device is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a key file cannot be written.
    pub fn provision(&self) -> StorageResult<()> {
        let sealing_path = self.directory.join(SEALING_KEY_FILE);
        if !sealing_path.exists() {
            let mut key = Zeroizing::new([0u8; AES_256_KEY_SIZE]);
            crypto::fill_random(key.as_mut_slice());
            atomic_replace(&sealing_path, key.as_slice())?;
        }

        let mac_path = self.directory.join(MAC_KEY_FILE);
        if !mac_path.exists() {
            let mut key = Zeroizing::new([0u8; MAC_KEY_SIZE]);
            crypto::fill_random(key.as_mut_slice());
            atomic_replace(&mac_path, key.as_slice())?;
        }

        Ok(())
    }

    fn read_key_file(&self, file: &str) -> StorageResult<Zeroizing<Vec<u8>>> {
        let path = self.directory.join(file);
        match fs::read(&path) {
            Ok(bytes) => Ok(Zeroizing::new(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                StorageError::key_unavailable(format!("key file '{file}' does not exist")),
            ),
            Err(e) => Err(StorageError::io(format!("reading key file '{file}'"), e)),
        }
    }
}

impl SecretStore for FileSecretStore {
    fn sealing_key(&self) -> StorageResult<SealingKey> {
        let bytes = self.read_key_file(SEALING_KEY_FILE)?;
        SealingKey::from_bytes(&bytes).map_err(|_| {
            StorageError::key_unavailable(format!(
                "key file '{SEALING_KEY_FILE}' holds {} bytes, expected 16 or 32",
                bytes.len()
            ))
        })
    }

    fn mac_key(&self) -> StorageResult<MacKey> {
        let bytes = self.read_key_file(MAC_KEY_FILE)?;
        if bytes.len() != MAC_KEY_SIZE {
            return Err(StorageError::key_unavailable(format!(
                "key file '{MAC_KEY_FILE}' holds {} bytes, expected {MAC_KEY_SIZE}",
                bytes.len()
            )));
        }
        let mut key = [0u8; MAC_KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(MacKey::from_bytes(key))
    }

    fn read_nonce_slot(&self) -> StorageResult<Option<NonceSlot>> {
        let path = self.directory.join(NONCE_SLOT_FILE);
        match fs::read(&path) {
            Ok(bytes) => NonceSlot::decode(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io("reading nonce slot", e)),
        }
    }

    fn write_nonce_slot(&self, slot: &NonceSlot) -> StorageResult<()> {
        atomic_replace(&self.directory.join(NONCE_SLOT_FILE), &slot.encode())
    }
}

/// Atomically replaces `path` with `data`.
///
/// Write-to-temp, `fsync`, rename, directory `fsync`. Readers observe
/// either the previous content or the new content in full.
pub(crate) fn atomic_replace(path: &Path, data: &[u8]) -> StorageResult<()> {
    let directory = path.parent().ok_or_else(|| {
        StorageError::invalid_input("path", format!("'{}' has no parent", path.display()))
    })?;
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        StorageError::invalid_input("path", format!("'{}' has no file name", path.display()))
    })?;
    let temp_path = directory.join(format!(".{file_name}.tmp"));

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| {
            StorageError::io(
                format!("creating temporary file '{}'", temp_path.display()),
                e,
            )
        })?;

    file.write_all(data).map_err(|e| {
        StorageError::io(
            format!("writing temporary file '{}'", temp_path.display()),
            e,
        )
    })?;

    file.sync_all()
        .map_err(|e| StorageError::io(format!("syncing '{}'", temp_path.display()), e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::io(
            format!(
                "renaming '{}' to '{}'",
                temp_path.display(),
                path.display()
            ),
            e,
        )
    })?;

    sync_directory(directory)
}

#[cfg(unix)]
fn sync_directory(directory: &Path) -> StorageResult<()> {
    let dir = File::open(directory).map_err(|e| {
        StorageError::io(
            format!("opening directory '{}' for sync", directory.display()),
            e,
        )
    })?;

    // fsync on the directory so the rename is durable
    unsafe {
        if libc::fsync(dir.as_raw_fd()) != 0 {
            let err = std::io::Error::last_os_error();
            return Err(StorageError::io(
                format!("syncing directory '{}'", directory.display()),
                err,
            ));
        }
    }

    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_directory: &Path) -> StorageResult<()> {
    // No portable directory sync; the rename is still atomic on modern
    // filesystems.
    Ok(())
}
