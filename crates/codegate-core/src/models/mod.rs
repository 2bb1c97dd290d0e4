//! Domain models shared by the submitter, the content store and the processor.

pub mod encoding;
pub mod outcome;
pub mod report;
pub mod scan;

pub use encoding::ContentEncoding;
pub use outcome::ProcessingOutcome;
pub use report::StoredReport;
pub use scan::ScanStatus;
