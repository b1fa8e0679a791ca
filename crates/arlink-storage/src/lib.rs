//! Arlink Storage Library
//!
//! Storage abstraction and implementations: the `Storage` trait plus local
//! filesystem, S3-compatible object store and OAuth cloud-disk backends.
//!
//! # Storage key format
//!
//! Keys are tenant-scoped: `content/{tenant_id}/{filename}`. Keys must not
//! contain `..` or a leading `/`, and a backend must never let a key resolve
//! outside its tenant prefix. Key generation is centralized in the `keys`
//! module so all backends stay consistent.

#[cfg(feature = "storage-cloud")]
pub mod cloud;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use arlink_core::BackendKind;
#[cfg(feature = "storage-cloud")]
pub use cloud::CloudDiskStorage;
pub use factory::create_storage;
pub use keys::generate_storage_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
