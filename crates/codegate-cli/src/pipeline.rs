use anyhow::Context;
use std::sync::Arc;

use codegate_core::Config;
use codegate_ingest::UploadSubmitter;
use codegate_queue::{create_queue, QueueTransport};
use codegate_storage::{create_content_store, ContentStore};
use codegate_worker::{AcceptAllAnalyzer, ProcessingDecision, ProcessorConfig, ReportProcessor};

/// The configured content store and queue transport, plus constructors for the
/// components that sit on top of them.
#[derive(Clone)]
pub struct Pipeline {
    config: Config,
    store: Arc<dyn ContentStore>,
    queue: Arc<dyn QueueTransport>,
}

impl Pipeline {
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let store = create_content_store(&config)
            .await
            .context("Failed to initialize content store")?;
        let queue = create_queue(&config)
            .await
            .context("Failed to initialize queue transport")?;

        tracing::info!(
            storage_backend = %store.backend_type(),
            queue_backend = %queue.backend_type(),
            container = %config.storage_container(),
            queue = %config.queue_name(),
            "Pipeline components initialized"
        );

        Ok(Self::new(config, store, queue))
    }

    pub fn new(
        config: Config,
        store: Arc<dyn ContentStore>,
        queue: Arc<dyn QueueTransport>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn QueueTransport> {
        &self.queue
    }

    pub fn submitter(&self) -> UploadSubmitter {
        UploadSubmitter::from_config(&self.config, self.store.clone(), self.queue.clone())
    }

    pub fn processor(&self) -> ReportProcessor {
        let decision = ProcessingDecision::new(
            self.store.clone(),
            Arc::new(AcceptAllAnalyzer),
            self.config.scan_check_enabled(),
        );
        ReportProcessor::new(
            self.queue.clone(),
            Arc::new(decision),
            ProcessorConfig::from_config(&self.config),
        )
    }
}
