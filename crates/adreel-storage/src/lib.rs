//! Remote object storage for the adreel backend.
//!
//! This crate provides:
//! - The [`ObjectStore`] collaborator trait (upload/download/exists/presign)
//! - An S3-compatible implementation ([`S3Store`])
//! - [`RemoteObjectCache`], a local LRU disk cache fronting the store, used
//!   by the compositing stage to avoid re-downloading scene assets

pub mod error;
pub mod object_cache;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use object_cache::{ObjectCacheConfig, RemoteObjectCache};
pub use store::{ObjectStore, S3Config, S3Store};
