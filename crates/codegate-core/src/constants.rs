//! Pipeline-wide constants.

/// Upper bound on the declared (as-transmitted) upload size.
pub const MAX_UPLOAD_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Content types accepted at the upload boundary (compared case-insensitively).
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/zip",
    "application/x-zip-compressed",
    "application/json",
    "text/plain",
    "text/csv",
];

/// Application property carrying the processing attempt counter.
pub const ATTEMPT_COUNT_PROPERTY: &str = "AttemptCount";

/// Content type of every queue message body.
pub const MESSAGE_CONTENT_TYPE: &str = "application/json";

/// A message makes at most this many processing attempts.
pub const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Dead-letter reason codes.
pub const DEAD_LETTER_DESERIALIZATION_ERROR: &str = "DeserializationError";
pub const DEAD_LETTER_PROCESSING_FAILED: &str = "ProcessingFailed";
pub const DEAD_LETTER_RETRIES_EXHAUSTED: &str = "MaxRetryAttemptsExceeded";
pub const DEAD_LETTER_UNEXPECTED_ERROR: &str = "UnexpectedError";
