//! Codegate report processor
//!
//! Drains the report queue: each message is decoded into a `StoredReport`, run
//! through the [`ProcessingDecision`], and settled by acknowledging, abandoning with
//! backoff, or dead-lettering.

pub mod decision;
pub mod processor;
#[cfg(test)]
pub(crate) mod testing;

pub use decision::{AcceptAllAnalyzer, ProcessingDecision, ReportAnalyzer};
pub use processor::{
    compute_retry_backoff_seconds, ProcessorConfig, ProcessorHandle, ReportProcessor, Settlement,
};
