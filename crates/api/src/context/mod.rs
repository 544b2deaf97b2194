//! Application context: the composition root
//!
//! Builds the database pool, repositories, clients, orchestrator, sync
//! engine, and scheduler, and subscribes the sync work queue to the
//! materialization events. Everything is owned here and handed out as
//! `Arc`s; no component reaches for ambient global state.

use std::sync::Arc;
use std::time::Duration;

use semestra_common::resilience::{RetryConfig, TokenBucket};
use semestra_core::{
    CalendarSyncEngine, DomainEvent, EventBus, EventTopic, ExtractionEngine, IntegrationRepository,
    JobOrchestrator, Materializer,
};
use semestra_domain::{AppConfig, CalendarProviderKind, Result, SemestraError};
use semestra_infra::{
    CalendarSyncScheduler, DatabaseManager, FsDocumentStore, GoogleCalendarProvider, HttpClient,
    MicrosoftCalendarProvider, SqliteCourseRepository, SqliteIntegrationRepository,
    SqliteJobRepository, SqliteMappingRepository, SqliteTokenUsageRepository,
    StaticCredentialProvider, SyncSchedulerConfig, UnderstandingClient,
};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// Owns every service and the background workers.
pub struct AppContext {
    pub config: AppConfig,
    pub db: DatabaseManager,
    pub orchestrator: Arc<JobOrchestrator>,
    pub sync_engine: Arc<CalendarSyncEngine>,
    pub integrations: Arc<SqliteIntegrationRepository>,
    pub courses: Arc<SqliteCourseRepository>,
    pub credentials: Arc<StaticCredentialProvider>,
    pub bus: Arc<EventBus>,
    scheduler: Mutex<CalendarSyncScheduler>,
    sync_worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AppContext {
    /// Build the full application graph from configuration.
    pub fn new(config: AppConfig) -> Result<Arc<Self>> {
        let db = DatabaseManager::new(&config.database)?;

        let jobs = Arc::new(SqliteJobRepository::new(db.clone()));
        let courses = Arc::new(SqliteCourseRepository::new(db.clone()));
        let integrations = Arc::new(SqliteIntegrationRepository::new(db.clone()));
        let mappings = Arc::new(SqliteMappingRepository::new(db.clone()));
        let usage = Arc::new(SqliteTokenUsageRepository::new(db.clone()));

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.pipeline.request_timeout_secs))
            .user_agent("semestra")
            .build()?;

        let understanding = Arc::new(UnderstandingClient::new(
            config.pipeline.understanding_api_url.clone(),
            config.pipeline.understanding_api_key.clone(),
            http_client.clone(),
        ));

        let bus = Arc::new(EventBus::new());
        let engine = ExtractionEngine::new(understanding, usage);
        let materializer = Materializer::new(courses.clone(), bus.clone());
        let documents = Arc::new(FsDocumentStore::new(config.storage.root.clone()));

        let orchestrator = Arc::new(JobOrchestrator::new(
            jobs,
            documents,
            courses.clone(),
            engine,
            materializer,
            RetryConfig::default(),
        ));

        let credentials = Arc::new(StaticCredentialProvider::new());
        let rate = config.sync.provider_rate_per_minute;
        let google_limiter = Arc::new(
            TokenBucket::per_minute(rate).map_err(SemestraError::Config)?,
        );
        let microsoft_limiter = Arc::new(
            TokenBucket::per_minute(rate).map_err(SemestraError::Config)?,
        );

        let sync_engine = Arc::new(
            CalendarSyncEngine::new(
                integrations.clone(),
                mappings,
                courses.clone(),
                credentials.clone(),
            )
            .with_provider(
                CalendarProviderKind::Google,
                Arc::new(GoogleCalendarProvider::new(http_client.clone())),
                google_limiter,
            )
            .with_provider(
                CalendarProviderKind::Microsoft,
                Arc::new(MicrosoftCalendarProvider::new(http_client)),
                microsoft_limiter,
            ),
        );

        let scheduler = CalendarSyncScheduler::new(
            sync_engine.clone(),
            integrations.clone(),
            SyncSchedulerConfig {
                interval: Duration::from_secs(config.sync.interval_seconds),
                ..Default::default()
            },
        );

        let context = Arc::new(Self {
            config,
            db,
            orchestrator,
            sync_engine,
            integrations,
            courses,
            credentials,
            bus,
            scheduler: Mutex::new(scheduler),
            sync_worker: Mutex::new(None),
        });

        context.wire_sync_events();

        Ok(context)
    }

    /// Subscribe the sync work queue to materialization events: every
    /// materialized or updated course triggers passes for the owning
    /// user's integrations.
    fn wire_sync_events(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        let tx_materialized = tx.clone();
        self.bus.subscribe(EventTopic::CourseMaterialized, move |event| {
            if let DomainEvent::CourseMaterialized { user_id, .. } = event {
                let _ = tx_materialized.send(user_id.clone());
            }
        });
        self.bus.subscribe(EventTopic::CourseUpdated, move |event| {
            if let DomainEvent::CourseUpdated { user_id, .. } = event {
                let _ = tx.send(user_id.clone());
            }
        });

        let context = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(user_id) = rx.recv().await {
                let Some(context) = context.upgrade() else { break };

                let integrations = match context.integrations.list_for_user(&user_id).await {
                    Ok(integrations) => integrations,
                    Err(e) => {
                        error!(user_id, error = %e, "failed to resolve integrations for sync");
                        continue;
                    }
                };

                for integration in integrations.into_iter().filter(|i| i.sync_enabled) {
                    if let Err(e) = context.sync_engine.sync_pass(&integration.id).await {
                        warn!(
                            integration_id = %integration.id,
                            error = %e,
                            "event-driven sync pass failed"
                        );
                    }
                }
            }
        });

        if let Ok(mut guard) = self.sync_worker.try_lock() {
            *guard = Some(handle);
        }
    }

    /// Start background work (the periodic sync scheduler).
    pub async fn start(&self) -> Result<()> {
        if self.config.sync.enabled {
            self.scheduler
                .lock()
                .await
                .start()
                .await
                .map_err(|e| SemestraError::Internal(e.to_string()))?;
        }
        info!("application context started");
        Ok(())
    }

    /// Stop background work gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_running() {
            scheduler.stop().await.map_err(|e| SemestraError::Internal(e.to_string()))?;
        }
        if let Some(handle) = self.sync_worker.lock().await.take() {
            handle.abort();
        }
        info!("application context stopped");
        Ok(())
    }
}
