use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Compression applied to an upload stream on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    Identity,
    Brotli,
    Gzip,
}

impl FromStr for ContentEncoding {
    type Err = anyhow::Error;

    /// Accepts `Content-Encoding` header tokens.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "identity" => Ok(ContentEncoding::Identity),
            "br" | "brotli" => Ok(ContentEncoding::Brotli),
            "gzip" | "x-gzip" => Ok(ContentEncoding::Gzip),
            other => Err(anyhow::anyhow!("Unsupported content encoding: {}", other)),
        }
    }
}

impl Display for ContentEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ContentEncoding::Identity => write!(f, "identity"),
            ContentEncoding::Brotli => write!(f, "br"),
            ContentEncoding::Gzip => write!(f, "gzip"),
        }
    }
}
