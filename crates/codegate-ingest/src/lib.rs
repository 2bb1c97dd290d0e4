//! Codegate report upload
//!
//! Validates an upload, writes it through the content store and enqueues exactly
//! one processing message for it.

pub mod request;
pub mod submitter;
pub mod validator;

pub use request::UploadRequest;
pub use submitter::UploadSubmitter;
pub use validator::{UploadValidator, ValidationError};
