//! Codegate content store
//!
//! This crate persists uploaded reports. It provides the `ContentStore` trait with
//! local filesystem and S3 implementations, streaming decompression and SHA-256
//! hashing, and the malware scan integration that maintains each blob's scan status.
//!
//! # Storage key format
//!
//! All backends use the same key layout: `{organisation}/{project}/{timestamp}_{fileName}`
//! with a UTC `%Y%m%d%H%M%S` timestamp. Keys must not contain `..`, a backslash or a
//! leading `/`, and never start with the reserved `.codegate-meta` prefix that holds
//! blob attributes.

#[cfg(feature = "clamav")]
pub mod clamav;
pub mod decode;
pub mod digest;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub(crate) mod manifest;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod scan;
pub mod traits;

// Re-export commonly used types
#[cfg(feature = "clamav")]
pub use clamav::ClamAvScanner;
pub use codegate_core::StorageBackend;
pub use digest::{sha256_hex, ContentDigest};
pub use factory::create_content_store;
#[cfg(feature = "storage-local")]
pub use local::LocalContentStore;
#[cfg(feature = "storage-s3")]
pub use s3::S3ContentStore;
pub use scan::{MalwareScanner, ScanResult, ScanningContentStore};
pub use traits::{ContentStore, StorageError, StorageResult, WriteOptions, WriteRequest};
