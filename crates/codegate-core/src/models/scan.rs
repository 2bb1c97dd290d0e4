use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Malware scan state of a stored blob, as seen by the content store's scan
/// integration. The processor only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    NotScanned,
    Scanning,
    Clean,
    Infected,
    Error,
}

impl ScanStatus {
    /// True once the scanner has reached a verdict (including a scanner fault).
    pub fn is_final(self) -> bool {
        matches!(self, ScanStatus::Clean | ScanStatus::Infected | ScanStatus::Error)
    }
}

impl FromStr for ScanStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "not_scanned" | "notscanned" => Ok(ScanStatus::NotScanned),
            "scanning" => Ok(ScanStatus::Scanning),
            "clean" => Ok(ScanStatus::Clean),
            "infected" => Ok(ScanStatus::Infected),
            "error" => Ok(ScanStatus::Error),
            _ => Err(anyhow::anyhow!("Invalid scan status: {}", s)),
        }
    }
}

impl Display for ScanStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ScanStatus::NotScanned => write!(f, "not_scanned"),
            ScanStatus::Scanning => write!(f, "scanning"),
            ScanStatus::Clean => write!(f, "clean"),
            ScanStatus::Infected => write!(f, "infected"),
            ScanStatus::Error => write!(f, "error"),
        }
    }
}
