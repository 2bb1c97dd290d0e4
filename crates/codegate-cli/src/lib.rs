//! Codegate CLI support: component wiring and upload helpers shared by the
//! `codegate` binary.

pub mod pipeline;
pub mod upload;

pub use pipeline::Pipeline;
pub use upload::{open_upload, UploadOptions};
