//! Configuration module
//!
//! This module provides configuration for the ingestion pipeline: storage backend,
//! queue transport, report processor and scan integration settings. Values come
//! from the environment (optionally a `.env` file).

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::constants::{DEFAULT_ALLOWED_CONTENT_TYPES, MAX_RETRY_ATTEMPTS};
use crate::storage_types::{QueueBackend, StorageBackend};

const MAX_UPLOAD_SIZE_MB: u64 = 100;
const STORAGE_CONTAINER: &str = "reports";
const QUEUE_NAME: &str = "report-processing";
const QUEUE_LOCK_DURATION_SECS: u64 = 60;
const QUEUE_RECEIVE_WAIT_SECS: u64 = 20;
const PROCESSOR_MAX_CONCURRENT_MESSAGES: usize = 1;
const PROCESSOR_BACKOFF_BASE_SECS: u64 = 2;
const LOCK_RENEWAL_INTERVAL_SECS: u64 = 20;
const CLAMAV_PORT: u16 = 3310;
const CLAMAV_TIMEOUT_SECS: u64 = 30;

/// How the processor waits before a retried message is seen again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffMode {
    /// Sleep inside the processing slot after abandoning the message.
    #[default]
    Blocking,
    /// Hand the delay to the transport and free the slot immediately.
    Delayed,
}

impl FromStr for BackoffMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocking" => Ok(BackoffMode::Blocking),
            "delayed" => Ok(BackoffMode::Delayed),
            _ => Err(anyhow::anyhow!("Invalid backoff mode: {}", s)),
        }
    }
}

impl Display for BackoffMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            BackoffMode::Blocking => write!(f, "blocking"),
            BackoffMode::Delayed => write!(f, "delayed"),
        }
    }
}

/// Base configuration shared by every binary
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub environment: String,
    pub log_filter: String,
    pub log_json: bool,
}

/// Ingestion pipeline configuration
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub base: BaseConfig,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub storage_container: String,
    pub storage_unique_paths: bool,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub aws_region: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    /// Unset means decompressed content is not size-limited.
    pub max_decompressed_size_bytes: Option<u64>,
    // Upload validation
    pub max_upload_size_bytes: u64,
    pub allowed_content_types: Vec<String>,
    // Queue transport
    pub queue_backend: QueueBackend,
    pub queue_name: String,
    pub sqs_queue_url: Option<String>,
    pub sqs_dead_letter_queue_url: Option<String>,
    pub queue_lock_duration_secs: u64,
    pub queue_receive_wait_secs: u64,
    // Report processor
    pub processor_max_retry_attempts: u32,
    pub processor_max_concurrent_messages: usize,
    pub processor_backoff_mode: BackoffMode,
    pub processor_backoff_base_secs: u64,
    pub lock_renewal_interval_secs: u64,
    // Scan integration
    pub scan_check_enabled: bool,
    pub clamav_enabled: bool,
    pub clamav_host: String,
    pub clamav_port: u16,
    pub clamav_timeout_secs: u64,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<PipelineConfig>);

impl Config {
    fn as_pipeline(&self) -> &PipelineConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let environment = self.as_pipeline().base.environment.to_lowercase();
        environment == "production" || environment == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = PipelineConfig::from_source(|key| env::var(key).ok())?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_pipeline().validate()
    }

    pub fn environment(&self) -> &str {
        &self.as_pipeline().base.environment
    }

    pub fn log_filter(&self) -> &str {
        &self.as_pipeline().base.log_filter
    }

    pub fn log_json(&self) -> bool {
        self.as_pipeline().base.log_json
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.as_pipeline().storage_backend
    }

    pub fn storage_container(&self) -> &str {
        &self.as_pipeline().storage_container
    }

    pub fn storage_unique_paths(&self) -> bool {
        self.as_pipeline().storage_unique_paths
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.as_pipeline().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.as_pipeline().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.as_pipeline().s3_endpoint.as_deref()
    }

    pub fn aws_region(&self) -> Option<&str> {
        self.as_pipeline().aws_region.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.as_pipeline().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.as_pipeline().local_storage_base_url.as_deref()
    }

    pub fn max_decompressed_size_bytes(&self) -> Option<u64> {
        self.as_pipeline().max_decompressed_size_bytes
    }

    pub fn max_upload_size_bytes(&self) -> u64 {
        self.as_pipeline().max_upload_size_bytes
    }

    pub fn allowed_content_types(&self) -> &[String] {
        &self.as_pipeline().allowed_content_types
    }

    pub fn queue_backend(&self) -> QueueBackend {
        self.as_pipeline().queue_backend
    }

    pub fn queue_name(&self) -> &str {
        &self.as_pipeline().queue_name
    }

    pub fn sqs_queue_url(&self) -> Option<&str> {
        self.as_pipeline().sqs_queue_url.as_deref()
    }

    pub fn sqs_dead_letter_queue_url(&self) -> Option<&str> {
        self.as_pipeline().sqs_dead_letter_queue_url.as_deref()
    }

    pub fn queue_lock_duration_secs(&self) -> u64 {
        self.as_pipeline().queue_lock_duration_secs
    }

    pub fn queue_receive_wait_secs(&self) -> u64 {
        self.as_pipeline().queue_receive_wait_secs
    }

    pub fn processor_max_retry_attempts(&self) -> u32 {
        self.as_pipeline().processor_max_retry_attempts
    }

    pub fn processor_max_concurrent_messages(&self) -> usize {
        self.as_pipeline().processor_max_concurrent_messages
    }

    pub fn processor_backoff_mode(&self) -> BackoffMode {
        self.as_pipeline().processor_backoff_mode
    }

    pub fn processor_backoff_base_secs(&self) -> u64 {
        self.as_pipeline().processor_backoff_base_secs
    }

    pub fn lock_renewal_interval_secs(&self) -> u64 {
        self.as_pipeline().lock_renewal_interval_secs
    }

    pub fn scan_check_enabled(&self) -> bool {
        self.as_pipeline().scan_check_enabled
    }

    pub fn clamav_enabled(&self) -> bool {
        self.as_pipeline().clamav_enabled
    }

    pub fn clamav_host(&self) -> &str {
        &self.as_pipeline().clamav_host
    }

    pub fn clamav_port(&self) -> u16 {
        self.as_pipeline().clamav_port
    }

    pub fn clamav_timeout_secs(&self) -> u64 {
        self.as_pipeline().clamav_timeout_secs
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_bool_or(value: Option<String>, default: bool) -> bool {
    value
        .map(|v| v.trim().to_lowercase())
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn megabytes(name: &str, mb: u64) -> Result<u64, anyhow::Error> {
    mb.checked_mul(1024 * 1024)
        .ok_or_else(|| anyhow::anyhow!("{} is too large: {} MB", name, mb))
}

impl PipelineConfig {
    /// Build the configuration from a key lookup (the process environment in production).
    pub fn from_source<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let base = BaseConfig {
            environment,
            log_filter: var("RUST_LOG").unwrap_or_else(|| "codegate=info".to_string()),
            log_json: var("LOG_FORMAT")
                .map(|s| s.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let storage_backend = match non_empty(var("STORAGE_BACKEND")) {
            Some(s) => s.parse()?,
            None => StorageBackend::Local,
        };

        let queue_backend = match non_empty(var("QUEUE_BACKEND")) {
            Some(s) => s.parse()?,
            None => QueueBackend::Memory,
        };

        let processor_backoff_mode = match non_empty(var("PROCESSOR_BACKOFF_MODE")) {
            Some(s) => s.parse()?,
            None => BackoffMode::Blocking,
        };

        let allowed_content_types = var("ALLOWED_CONTENT_TYPES")
            .map(|s| {
                s.split(',')
                    .map(|ct| ct.trim().to_lowercase())
                    .filter(|ct| !ct.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_CONTENT_TYPES
                    .iter()
                    .map(|ct| ct.to_string())
                    .collect()
            });

        let max_upload_size_bytes = megabytes(
            "MAX_UPLOAD_SIZE_MB",
            parse_or(var("MAX_UPLOAD_SIZE_MB"), MAX_UPLOAD_SIZE_MB),
        )?;
        let max_decompressed_size_bytes = var("MAX_DECOMPRESSED_SIZE_MB")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(|mb| megabytes("MAX_DECOMPRESSED_SIZE_MB", mb))
            .transpose()?;

        let config = PipelineConfig {
            base,
            storage_backend,
            storage_container: var("STORAGE_CONTAINER")
                .unwrap_or_else(|| STORAGE_CONTAINER.to_string()),
            storage_unique_paths: parse_bool_or(var("STORAGE_UNIQUE_PATHS"), false),
            s3_bucket: non_empty(var("S3_BUCKET")),
            s3_region: non_empty(var("S3_REGION")),
            s3_endpoint: non_empty(var("S3_ENDPOINT")),
            aws_region: non_empty(var("AWS_REGION")),
            local_storage_path: non_empty(var("LOCAL_STORAGE_PATH")),
            local_storage_base_url: non_empty(var("LOCAL_STORAGE_BASE_URL")),
            max_decompressed_size_bytes,
            max_upload_size_bytes,
            allowed_content_types,
            queue_backend,
            queue_name: var("QUEUE_NAME").unwrap_or_else(|| QUEUE_NAME.to_string()),
            sqs_queue_url: non_empty(var("SQS_QUEUE_URL")),
            sqs_dead_letter_queue_url: non_empty(var("SQS_DEAD_LETTER_QUEUE_URL")),
            queue_lock_duration_secs: parse_or(
                var("QUEUE_LOCK_DURATION_SECS"),
                QUEUE_LOCK_DURATION_SECS,
            ),
            queue_receive_wait_secs: parse_or(
                var("QUEUE_RECEIVE_WAIT_SECS"),
                QUEUE_RECEIVE_WAIT_SECS,
            ),
            processor_max_retry_attempts: parse_or(
                var("PROCESSOR_MAX_RETRY_ATTEMPTS"),
                MAX_RETRY_ATTEMPTS,
            ),
            processor_max_concurrent_messages: parse_or(
                var("PROCESSOR_MAX_CONCURRENT_MESSAGES"),
                PROCESSOR_MAX_CONCURRENT_MESSAGES,
            ),
            processor_backoff_mode,
            processor_backoff_base_secs: parse_or(
                var("PROCESSOR_BACKOFF_BASE_SECS"),
                PROCESSOR_BACKOFF_BASE_SECS,
            ),
            lock_renewal_interval_secs: parse_or(
                var("LOCK_RENEWAL_INTERVAL_SECS"),
                LOCK_RENEWAL_INTERVAL_SECS,
            ),
            scan_check_enabled: parse_bool_or(var("SCAN_CHECK_ENABLED"), true),
            clamav_enabled: parse_bool_or(var("CLAMAV_ENABLED"), false),
            clamav_host: var("CLAMAV_HOST").unwrap_or_else(|| "localhost".to_string()),
            clamav_port: parse_or(var("CLAMAV_PORT"), CLAMAV_PORT),
            clamav_timeout_secs: parse_or(var("CLAMAV_TIMEOUT_SECS"), CLAMAV_TIMEOUT_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be greater than 0"));
        }

        if self.allowed_content_types.is_empty() {
            return Err(anyhow::anyhow!(
                "ALLOWED_CONTENT_TYPES must list at least one content type"
            ));
        }

        if self.queue_receive_wait_secs == 0 {
            return Err(anyhow::anyhow!(
                "QUEUE_RECEIVE_WAIT_SECS must be at least 1"
            ));
        }

        if self.processor_max_retry_attempts == 0 {
            return Err(anyhow::anyhow!(
                "PROCESSOR_MAX_RETRY_ATTEMPTS must be at least 1"
            ));
        }

        if self.processor_max_concurrent_messages == 0 {
            return Err(anyhow::anyhow!(
                "PROCESSOR_MAX_CONCURRENT_MESSAGES must be at least 1"
            ));
        }

        if self.lock_renewal_interval_secs == 0
            || self.lock_renewal_interval_secs >= self.queue_lock_duration_secs
        {
            return Err(anyhow::anyhow!(
                "LOCK_RENEWAL_INTERVAL_SECS must be greater than 0 and shorter than QUEUE_LOCK_DURATION_SECS"
            ));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.aws_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.queue_backend == QueueBackend::Sqs {
            if self.sqs_queue_url.is_none() {
                return Err(anyhow::anyhow!(
                    "SQS_QUEUE_URL must be set when using the SQS queue backend"
                ));
            }
            if self.sqs_dead_letter_queue_url.is_none() {
                return Err(anyhow::anyhow!(
                    "SQS_DEAD_LETTER_QUEUE_URL must be set when using the SQS queue backend"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<PipelineConfig, anyhow::Error> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_source(|key| vars.get(key).cloned())
    }

    fn local() -> Vec<(&'static str, &'static str)> {
        vec![
            ("LOCAL_STORAGE_PATH", "/var/lib/codegate"),
            ("LOCAL_STORAGE_BASE_URL", "http://localhost:4000/reports"),
        ]
    }

    #[test]
    fn defaults_follow_pipeline_contract() {
        let config = load(&local()).unwrap();
        assert_eq!(config.max_upload_size_bytes, 100 * 1024 * 1024);
        assert_eq!(config.processor_max_retry_attempts, 5);
        assert_eq!(config.processor_max_concurrent_messages, 1);
        assert_eq!(config.processor_backoff_mode, BackoffMode::Blocking);
        assert_eq!(config.processor_backoff_base_secs, 2);
        assert!(config.scan_check_enabled);
        assert!(!config.storage_unique_paths);
        assert_eq!(config.max_decompressed_size_bytes, None);
        assert_eq!(config.queue_backend, QueueBackend::Memory);
        assert!(config
            .allowed_content_types
            .contains(&"application/x-zip-compressed".to_string()));
    }

    #[test]
    fn local_backend_requires_path() {
        let err = load(&[("LOCAL_STORAGE_BASE_URL", "http://localhost")]).unwrap_err();
        assert!(err.to_string().contains("LOCAL_STORAGE_PATH"));
    }

    #[test]
    fn s3_backend_requires_bucket_and_region() {
        let err = load(&[("STORAGE_BACKEND", "s3")]).unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));

        let err = load(&[("STORAGE_BACKEND", "s3"), ("S3_BUCKET", "reports")]).unwrap_err();
        assert!(err.to_string().contains("REGION"));

        let config = load(&[
            ("STORAGE_BACKEND", "s3"),
            ("S3_BUCKET", "reports"),
            ("AWS_REGION", "eu-west-1"),
        ])
        .unwrap();
        assert_eq!(config.storage_backend, StorageBackend::S3);
    }

    #[test]
    fn sqs_backend_requires_both_queue_urls() {
        let mut vars = local();
        vars.push(("QUEUE_BACKEND", "sqs"));
        vars.push(("SQS_QUEUE_URL", "https://sqs.eu-west-1.amazonaws.com/1/reports"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("SQS_DEAD_LETTER_QUEUE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = local();
        vars.push(("PROCESSOR_BACKOFF_MODE", "Delayed"));
        vars.push(("MAX_DECOMPRESSED_SIZE_MB", "512"));
        vars.push(("ALLOWED_CONTENT_TYPES", "Application/JSON, text/xml"));
        vars.push(("SCAN_CHECK_ENABLED", "FALSE"));
        let config = load(&vars).unwrap();
        assert_eq!(config.processor_backoff_mode, BackoffMode::Delayed);
        assert_eq!(config.max_decompressed_size_bytes, Some(512 * 1024 * 1024));
        assert_eq!(
            config.allowed_content_types,
            vec!["application/json".to_string(), "text/xml".to_string()]
        );
        assert!(!config.scan_check_enabled);
    }

    #[test]
    fn invalid_backoff_mode_is_rejected() {
        let mut vars = local();
        vars.push(("PROCESSOR_BACKOFF_MODE", "sometimes"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn lock_renewal_must_be_shorter_than_lock() {
        let mut vars = local();
        vars.push(("QUEUE_LOCK_DURATION_SECS", "10"));
        vars.push(("LOCK_RENEWAL_INTERVAL_SECS", "10"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn size_limits_that_overflow_bytes_are_rejected() {
        let mut vars = local();
        vars.push(("MAX_UPLOAD_SIZE_MB", "18446744073709551615"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("MAX_UPLOAD_SIZE_MB"));

        let mut vars = local();
        vars.push(("MAX_DECOMPRESSED_SIZE_MB", "17592186044416"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("MAX_DECOMPRESSED_SIZE_MB"));
    }

    #[test]
    fn zero_receive_wait_is_rejected() {
        let mut vars = local();
        vars.push(("QUEUE_RECEIVE_WAIT_SECS", "0"));
        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("QUEUE_RECEIVE_WAIT_SECS"));
    }
}
