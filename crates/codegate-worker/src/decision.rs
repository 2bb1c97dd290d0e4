//! Processing decision
//!
//! Maps a stored report's scan state to a [`ProcessingOutcome`]. The decision reads
//! the scan status once per attempt and never mutates anything; clean reports are
//! handed to the [`ReportAnalyzer`] extension point.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use codegate_core::{ProcessingOutcome, ScanStatus, StoredReport};
use codegate_storage::ContentStore;

pub const REASON_INFECTED: &str = "file is infected";
pub const REASON_SCAN_NOT_COMPLETE: &str = "scan not complete";
pub const REASON_SCAN_ERROR: &str = "scan error";

/// Analysis of a clean report.
///
/// Implementations return `Retryable` or `Terminal` outcomes for domain failures;
/// an `Err` is treated as unexpected and dead-letters the message.
#[async_trait]
pub trait ReportAnalyzer: Send + Sync {
    async fn analyze(&self, report: &StoredReport) -> Result<ProcessingOutcome>;
}

/// Analyzer used until real analysis exists: every clean report is accepted.
pub struct AcceptAllAnalyzer;

#[async_trait]
impl ReportAnalyzer for AcceptAllAnalyzer {
    async fn analyze(&self, report: &StoredReport) -> Result<ProcessingOutcome> {
        tracing::debug!(storage_path = %report.storage_path, "Report accepted without analysis");
        Ok(ProcessingOutcome::Accepted)
    }
}

pub struct ProcessingDecision {
    store: Arc<dyn ContentStore>,
    analyzer: Arc<dyn ReportAnalyzer>,
    scan_check_enabled: bool,
}

impl ProcessingDecision {
    pub fn new(
        store: Arc<dyn ContentStore>,
        analyzer: Arc<dyn ReportAnalyzer>,
        scan_check_enabled: bool,
    ) -> Self {
        Self {
            store,
            analyzer,
            scan_check_enabled,
        }
    }

    #[tracing::instrument(skip(self, report), fields(storage_path = %report.storage_path))]
    pub async fn decide(&self, report: &StoredReport) -> Result<ProcessingOutcome> {
        if !self.scan_check_enabled {
            return Ok(ProcessingOutcome::Accepted);
        }

        let status = self
            .store
            .scan_status(&report.storage_url)
            .await
            .with_context(|| format!("Failed to read scan status of {}", report.storage_url))?;

        tracing::debug!(scan_status = %status, "Scan status read");

        match status {
            ScanStatus::Infected => Ok(ProcessingOutcome::terminal(REASON_INFECTED)),
            ScanStatus::Scanning | ScanStatus::NotScanned => {
                Ok(ProcessingOutcome::retryable(REASON_SCAN_NOT_COMPLETE))
            }
            ScanStatus::Error => Ok(ProcessingOutcome::retryable(REASON_SCAN_ERROR)),
            ScanStatus::Clean => self.analyzer.analyze(report).await,
        }
    }
}
