//! Calendar sync scheduler
//!
//! Runs periodic sync passes over every enabled integration. Passes
//! for distinct integrations run concurrently (the engine serializes
//! passes against the same integration); a pass ending with a quota
//! delay is re-attempted once after the provider-indicated backoff.
//! Lifecycle follows the workspace worker rules: tracked join handle,
//! explicit cancellation, timeouts on stop.

use std::sync::Arc;
use std::time::Duration;

use semestra_core::{CalendarSyncEngine, IntegrationRepository, SyncError};
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::{SchedulerError, SchedulerResult};

/// Type alias for the tracked task handle
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the sync scheduler
#[derive(Debug, Clone)]
pub struct SyncSchedulerConfig {
    /// Interval between scheduled passes
    pub interval: Duration,
    /// Timeout for a single integration's pass
    pub pass_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for SyncSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            pass_timeout: Duration::from_secs(120),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Periodic calendar sync scheduler.
pub struct CalendarSyncScheduler {
    engine: Arc<CalendarSyncEngine>,
    integrations: Arc<dyn IntegrationRepository>,
    config: SyncSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl CalendarSyncScheduler {
    pub fn new(
        engine: Arc<CalendarSyncEngine>,
        integrations: Arc<dyn IntegrationRepository>,
        config: SyncSchedulerConfig,
    ) -> Self {
        Self {
            engine,
            integrations,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the scheduler, spawning the background loop.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        info!("Starting calendar sync scheduler");

        // Fresh token supports restart after stop
        self.cancellation_token = CancellationToken::new();

        let engine = Arc::clone(&self.engine);
        let integrations = Arc::clone(&self.integrations);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::run_loop(engine, integrations, config, cancel).await;
        });

        *self.task_handle.lock().await = Some(handle);
        info!("Calendar sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping calendar sync scheduler");
        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: join_timeout, source })??;
        }

        info!("Calendar sync scheduler stopped");
        Ok(())
    }

    /// Whether a scheduler task is active.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn run_loop(
        engine: Arc<CalendarSyncEngine>,
        integrations: Arc<dyn IntegrationRepository>,
        config: SyncSchedulerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sync scheduler loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    let enabled = match integrations.list_enabled().await {
                        Ok(enabled) => enabled,
                        Err(e) => {
                            error!(error = %e, "Failed to list enabled integrations");
                            continue;
                        }
                    };

                    debug!(count = enabled.len(), "Scheduling sync passes");

                    let mut passes = JoinSet::new();
                    for integration in enabled {
                        let engine = Arc::clone(&engine);
                        let cancel = cancel.clone();
                        let pass_timeout = config.pass_timeout;
                        passes.spawn(async move {
                            Self::run_pass(&engine, &integration.id, pass_timeout, &cancel).await;
                        });
                    }

                    while let Some(result) = passes.join_next().await {
                        if let Err(e) = result {
                            warn!(error = %e, "Sync pass task failed");
                        }
                    }
                }
            }
        }
    }

    /// Execute one pass with timeout; quota delays get a single
    /// delayed re-attempt.
    async fn run_pass(
        engine: &Arc<CalendarSyncEngine>,
        integration_id: &str,
        pass_timeout: Duration,
        cancel: &CancellationToken,
    ) {
        let outcome =
            tokio::time::timeout(pass_timeout, engine.sync_pass(integration_id)).await;

        let retry_after = match outcome {
            Ok(Ok(summary)) => {
                debug!(
                    integration_id,
                    created = summary.created,
                    updated = summary.updated,
                    pulled = summary.pulled,
                    conflicts = summary.conflicts,
                    errors = summary.errors,
                    "scheduled sync pass finished"
                );
                summary.retry_after
            }
            Ok(Err(SyncError::Auth(message))) => {
                warn!(integration_id, %message, "integration disabled pending re-authorization");
                None
            }
            Ok(Err(e)) => {
                error!(integration_id, error = %e, "sync pass failed");
                e.should_retry().then(|| Duration::from_secs(e.retry_delay_secs()))
            }
            Err(_) => {
                warn!(integration_id, timeout_secs = pass_timeout.as_secs(), "sync pass timed out");
                None
            }
        };

        let Some(delay) = retry_after else {
            return;
        };

        debug!(integration_id, delay_secs = delay.as_secs(), "scheduling delayed quota retry");
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                if let Err(e) =
                    tokio::time::timeout(pass_timeout, engine.sync_pass(integration_id)).await
                {
                    warn!(integration_id, error = %e, "delayed retry pass timed out");
                }
            }
        }
    }
}

/// Best-effort cleanup when dropped while running.
impl Drop for CalendarSyncScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            warn!("CalendarSyncScheduler dropped while running; cancelling");
            self.cancellation_token.cancel();
        }
    }
}
