//! Orchestration Queue
//!
//! Persistent job queue executed by one worker per registered model endpoint.
//! Job state lives in the [`GenerationStore`]; this module only owns the
//! in-process worker tasks, so a crash loses nothing but in-flight calls,
//! which are returned to pending on the next start.

pub mod job;
mod worker;

pub use job::{EnqueueOptions, Job, JobId, JobStatus, NewJob, PlanRef};

use crate::endpoint::{EndpointConfig, ModelEndpoint};
use crate::error::ApiError;
use crate::store::{GenerationStore, QueueStats};
use crate::template::TemplateConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info};

/// Queue execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Upper bound on a single endpoint call
    #[serde(default = "default_invocation_timeout_secs")]
    pub invocation_timeout_secs: u64,

    /// How often idle workers re-check the store
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum number of pending plus processing jobs
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
}

fn default_invocation_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_queue_size() -> usize {
    10_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_secs: default_invocation_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_queue_size: default_max_queue_size(),
        }
    }
}

impl QueueConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.invocation_timeout_secs == 0 {
            return Err("invocation_timeout_secs must be greater than zero".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than zero".to_string());
        }
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

struct Registration {
    endpoint: Arc<dyn ModelEndpoint>,
    settings: EndpointConfig,
    /// Epoch at which this endpoint's worker last found nothing to claim
    idle_epoch: Arc<AtomicU64>,
}

/// Shared wake-up state between the queue handle and its workers.
pub(crate) struct Signal {
    notify: Notify,
    /// Bumped on every wake-up; a worker is idle when it came up empty at the
    /// current epoch
    epoch: AtomicU64,
    running: RwLock<bool>,
}

impl Signal {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            epoch: AtomicU64::new(1),
            running: RwLock::new(false),
        }
    }

    pub(crate) fn wake(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.running.read()
    }

    pub(crate) async fn wait(&self, poll_interval: Duration) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = sleep(poll_interval) => {}
        }
    }
}

/// Worker pool over a generation store.
pub struct GenerationQueue {
    store: Arc<dyn GenerationStore>,
    template: TemplateConfig,
    config: QueueConfig,
    endpoints: RwLock<Vec<Registration>>,
    signal: Arc<Signal>,
    workers: RwLock<Vec<tokio::task::JoinHandle<()>>>,
}

impl GenerationQueue {
    pub fn new(
        store: Arc<dyn GenerationStore>,
        template: TemplateConfig,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            template,
            config,
            endpoints: RwLock::new(Vec::new()),
            signal: Arc::new(Signal::new()),
            workers: RwLock::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn GenerationStore> {
        &self.store
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Add an endpoint. Takes effect on the next `start`.
    pub fn register_endpoint(
        &self,
        endpoint: Arc<dyn ModelEndpoint>,
        settings: EndpointConfig,
    ) -> Result<(), ApiError> {
        let mut endpoints = self.endpoints.write();
        if endpoints
            .iter()
            .any(|r| r.endpoint.name() == endpoint.name())
        {
            return Err(ApiError::ConfigError(format!(
                "Endpoint '{}' is already registered",
                endpoint.name()
            )));
        }
        debug!(endpoint = endpoint.name(), "Registered endpoint");
        endpoints.push(Registration {
            endpoint,
            settings,
            idle_epoch: Arc::new(AtomicU64::new(0)),
        });
        Ok(())
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints
            .read()
            .iter()
            .map(|r| r.endpoint.name().to_string())
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.signal.is_running()
    }

    /// Wake idle workers after new jobs were stored.
    pub fn notify(&self) {
        self.signal.wake();
    }

    /// Spawn one worker per registered endpoint.
    ///
    /// Jobs left processing by a previous run are returned to pending first.
    /// Returns the number of workers started.
    pub fn start(&self) -> Result<usize, ApiError> {
        let endpoints = self.endpoints.read();
        if endpoints.is_empty() {
            return Err(ApiError::EndpointNotConfigured(
                "no endpoints registered".to_string(),
            ));
        }

        {
            let mut running = self.signal.running.write();
            if *running {
                return Ok(self.workers.read().len());
            }
            *running = true;
        }

        let recovered = self.store.reset_processing()?;
        if recovered > 0 {
            info!(recovered, "Returned interrupted jobs to pending");
        }

        let mut workers = self.workers.write();
        for registration in endpoints.iter() {
            registration.idle_epoch.store(0, Ordering::SeqCst);
            let context = worker::WorkerContext {
                endpoint: Arc::clone(&registration.endpoint),
                settings: registration.settings.clone(),
                store: Arc::clone(&self.store),
                template: self.template.clone(),
                invocation_timeout: registration
                    .settings
                    .timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| self.config.invocation_timeout()),
                poll_interval: self.config.poll_interval(),
                signal: Arc::clone(&self.signal),
                idle_epoch: Arc::clone(&registration.idle_epoch),
            };
            workers.push(tokio::spawn(worker::worker_loop(context)));
        }

        info!(worker_count = workers.len(), "Started generation queue workers");
        Ok(workers.len())
    }

    /// Stop all workers, letting in-flight jobs finish.
    pub async fn stop(&self) -> Result<(), ApiError> {
        {
            let mut running = self.signal.running.write();
            if !*running {
                return Ok(());
            }
            *running = false;
        }
        self.signal.wake();

        let workers = std::mem::take(&mut *self.workers.write());
        futures::future::join_all(workers).await;

        info!("Stopped generation queue workers");
        Ok(())
    }

    pub fn stats(&self) -> Result<QueueStats, ApiError> {
        Ok(self.store.stats()?)
    }

    /// Whether no job is processing and every worker has come up empty since
    /// the last wake-up.
    pub fn is_idle(&self) -> Result<bool, ApiError> {
        let epoch = self.signal.epoch();
        let workers_idle = self
            .endpoints
            .read()
            .iter()
            .all(|r| r.idle_epoch.load(Ordering::SeqCst) == epoch);
        Ok(workers_idle && self.store.stats()?.processing == 0)
    }

    /// Wait until no runnable work remains.
    ///
    /// Pending jobs blocked behind a failed job of the same plan do not keep
    /// the queue busy.
    pub async fn wait_for_idle(&self, timeout: Option<Duration>) -> Result<QueueStats, ApiError> {
        let start = Instant::now();
        loop {
            if self.is_idle()? {
                return self.stats();
            }
            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(ApiError::Timeout(timeout));
                }
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    /// Start workers, drain all runnable jobs, then stop.
    pub async fn run_until_idle(&self, timeout: Option<Duration>) -> Result<QueueStats, ApiError> {
        self.start()?;
        self.signal.wake();
        let result = self.wait_for_idle(timeout).await;
        self.stop().await?;
        result
    }
}

impl Drop for GenerationQueue {
    fn drop(&mut self) {
        *self.signal.running.write() = false;
        for handle in self.workers.get_mut().drain(..) {
            handle.abort();
        }
    }
}
