#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod blob_storage;

pub use blob_storage::{BlobMode, BlobStore, StorageError, StorageResult, StoreConfig};
