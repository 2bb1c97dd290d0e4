//! Codegate Core Library
//!
//! This crate provides the domain models, error types, configuration and constants
//! shared by the report ingestion pipeline components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BackoffMode, BaseConfig, Config, PipelineConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{ContentEncoding, ProcessingOutcome, ScanStatus, StoredReport};
pub use storage_types::{QueueBackend, StorageBackend};
