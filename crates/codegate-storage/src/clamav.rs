use crate::scan::{MalwareScanner, ScanResult};
use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use std::str;
use std::time::{Duration, Instant};

/// ClamAV daemon scanner.
///
/// Scan failures and timeouts are always reported as [`ScanResult::Error`]; a report
/// is never treated as clean unless clamd said so.
#[derive(Clone)]
pub struct ClamAvScanner {
    host: String,
    port: u16,
    /// Timeout in seconds for each scan operation
    timeout_secs: u64,
}

impl ClamAvScanner {
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    /// * `timeout_secs` - Upper bound for a single scan
    pub fn new(host: String, port: u16, timeout_secs: u64) -> Self {
        Self {
            host,
            port,
            timeout_secs,
        }
    }
}

/// Extract the signature name from a clamd `stream: <name> FOUND` reply.
fn signature_name(response: &[u8]) -> String {
    let response_str = str::from_utf8(response).map(str::trim).unwrap_or("");
    if !response_str.contains("FOUND") {
        return "unknown".to_string();
    }
    response_str
        .split(':')
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("unknown")
        .to_string()
}

#[async_trait]
impl MalwareScanner for ClamAvScanner {
    /// Uses the sync client inside spawn_blocking to avoid !Send tokio futures.
    async fn scan(&self, data: &[u8]) -> ScanResult {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = %self.port, size_bytes = data.len(), "Starting ClamAV scan");
        let data = data.to_vec();
        let address = format!("{}:{}", self.host, self.port);
        let timeout_secs = self.timeout_secs;

        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::task::spawn_blocking(move || {
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                let response = clamav_client::scan_buffer(data.as_slice(), connection, None)
                    .map_err(|e| format!("ClamAV scan error: {}", e))?;
                match clean(&response) {
                    Ok(true) => Ok(ScanResult::Clean),
                    Ok(false) => Ok(ScanResult::Infected(signature_name(&response))),
                    Err(e) => Err(format!("Failed to parse ClamAV response: {}", e)),
                }
            }),
        )
        .await;

        let verdict = match result {
            Ok(Ok(Ok(verdict))) => verdict,
            Ok(Ok(Err(error_msg))) => ScanResult::Error(error_msg),
            Ok(Err(e)) => ScanResult::Error(format!("ClamAV scan task join error: {}", e)),
            Err(_) => ScanResult::Error(format!(
                "ClamAV scan timeout (exceeded {} seconds)",
                timeout_secs
            )),
        };

        tracing::debug!(
            duration_ms = start.elapsed().as_millis(),
            status = %verdict.status(),
            "ClamAV scan finished"
        );
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_parsed_from_found_reply() {
        assert_eq!(
            signature_name(b"stream: Eicar-Test-Signature FOUND\0"),
            "Eicar-Test-Signature"
        );
        assert_eq!(signature_name(b"stream: OK\0"), "unknown");
        assert_eq!(signature_name(&[0xff, 0xfe]), "unknown");
    }

    #[tokio::test]
    async fn unreachable_daemon_is_scan_error() {
        // Port 1 on loopback refuses connections.
        let scanner = ClamAvScanner::new("127.0.0.1".to_string(), 1, 5);
        let verdict = scanner.scan(b"report").await;
        assert!(matches!(verdict, ScanResult::Error(_)));
    }
}
