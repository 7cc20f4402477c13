//! Composition root
//!
//! [`Runtime`] is built once from a validated [`Config`]. It owns the storage
//! sink, the registry client, the orchestrator and the job tracker, and hands
//! out fresh verification sessions on demand.

use crate::config::{load_config_with_hash, Config};
use crate::crawler::{
    Clock, CrawlOrchestrator, CrawlReport, JobId, JobTracker, PhaseFetchers, RegistryClient,
    TokioClock,
};
use crate::session::CaptchaSession;
use crate::storage::{open_storage, SharedSink};
use crate::{FetchResult, PresaleError};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

pub struct Runtime {
    config: Config,
    config_hash: String,
    sink: SharedSink,
    orchestrator: Arc<CrawlOrchestrator>,
    tracker: JobTracker,
}

impl Runtime {
    /// Loads, validates and hashes a config file, then builds the runtime
    pub fn from_config_file(path: &Path) -> Result<Self, PresaleError> {
        let (config, hash) = load_config_with_hash(path)?;
        Self::init(config, hash)
    }

    /// Builds the live runtime: SQLite sink, registry client and wall clock
    pub fn init(config: Config, config_hash: impl Into<String>) -> Result<Self, PresaleError> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let sink: SharedSink = Arc::new(Mutex::new(storage));
        let client = Arc::new(RegistryClient::new(config.registry.clone())?);

        Ok(Self::with_parts(
            config,
            config_hash,
            PhaseFetchers::from_client(client),
            sink,
            Arc::new(TokioClock::new()),
        ))
    }

    /// Builds a runtime around caller-supplied fetchers, sink and clock
    pub fn with_parts(
        config: Config,
        config_hash: impl Into<String>,
        fetchers: PhaseFetchers,
        sink: SharedSink,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config_hash = config_hash.into();
        let orchestrator = Arc::new(CrawlOrchestrator::new(
            fetchers,
            sink.clone(),
            config.crawler.clone(),
            clock,
            config_hash.clone(),
        ));
        let tracker = JobTracker::new(orchestrator.clone());

        tracing::debug!(
            "Runtime ready: registry {}, database {}",
            config.registry.base_url,
            config.output.database_path
        );

        Self {
            config,
            config_hash,
            sink,
            orchestrator,
            tracker,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn sink(&self) -> SharedSink {
        self.sink.clone()
    }

    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Opens a new verification session with its own cookie jar
    pub fn new_session(&self) -> Result<CaptchaSession, PresaleError> {
        Ok(CaptchaSession::new(&self.config.registry)?)
    }

    /// Starts a background crawl and returns its job id immediately
    pub fn trigger_crawl(&self, property_id: &str) -> Result<JobId, PresaleError> {
        self.tracker.spawn(property_id)
    }

    /// Runs a crawl on the current task
    pub async fn crawl(
        &self,
        property_id: &str,
        cancel: &CancellationToken,
    ) -> FetchResult<CrawlReport> {
        self.orchestrator.run(property_id, cancel).await
    }

    /// Cancels running jobs and waits for them to record their outcome
    pub async fn shutdown(self) {
        let running = self.tracker.running();
        if !running.is_empty() {
            tracing::info!("Shutting down with {} running crawl jobs", running.len());
        }
        self.tracker.shutdown().await;
    }
}
