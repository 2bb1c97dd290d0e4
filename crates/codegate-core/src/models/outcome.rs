/// Result of deciding what to do with one delivery of a stored report.
///
/// Exactly three states are meaningful: accepted, retryable failure and terminal
/// failure. The report processor maps them onto ack, abandon and dead-letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Accepted,
    Retryable { reason: String },
    Terminal { reason: String },
}

impl ProcessingOutcome {
    pub fn retryable(reason: impl Into<String>) -> Self {
        ProcessingOutcome::Retryable {
            reason: reason.into(),
        }
    }

    pub fn terminal(reason: impl Into<String>) -> Self {
        ProcessingOutcome::Terminal {
            reason: reason.into(),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ProcessingOutcome::Accepted)
    }

    /// Only meaningful when `success()` is false.
    pub fn should_retry(&self) -> bool {
        matches!(self, ProcessingOutcome::Retryable { .. })
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            ProcessingOutcome::Accepted => None,
            ProcessingOutcome::Retryable { reason } | ProcessingOutcome::Terminal { reason } => {
                Some(reason)
            }
        }
    }
}
