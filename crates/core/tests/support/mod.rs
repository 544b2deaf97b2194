//! Shared mock port implementations for core integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use semestra_core::sync::error::{SyncError, SyncResult};
use semestra_core::sync::ports::{
    CalendarProvider, CredentialProvider, ExternalEventPayload, IntegrationRepository,
    MappingRepository, RemoteChanges,
};
use semestra_core::{
    CourseRepository, DocumentStore, ExtractionRequest, ExtractionResponse, TokenUsageRecorder,
    UnderstandingService, UploadJobRepository,
};
use semestra_domain::{
    normalize_term, CalendarEventMapping, CalendarIntegration, ConflictRecord, Course,
    CourseEvent, FileReference, JobStatus, MappingSyncStatus, Result, SemestraError,
    StatusTransition, UploadJob,
};

// ---------------------------------------------------------------------
// Pipeline mocks
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct MockJobRepository {
    jobs: Mutex<HashMap<String, UploadJob>>,
    transitions: Mutex<Vec<StatusTransition>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.lock().unwrap().get(job_id).map(|job| job.status)
    }
}

#[async_trait]
impl UploadJobRepository for MockJobRepository {
    async fn create_job(&self, job: &UploadJob) -> Result<()> {
        self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<UploadJob> {
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| SemestraError::NotFound(format!("job {}", job_id)))
    }

    async fn update_job(&self, job: &UploadJob) -> Result<()> {
        self.jobs.lock().unwrap().insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn transition(&self, job_id: &str, from: JobStatus, to: JobStatus) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| SemestraError::NotFound(format!("job {}", job_id)))?;
        if job.status != from {
            return Ok(false);
        }
        job.status = to;
        job.updated_at = Utc::now().timestamp();
        self.transitions.lock().unwrap().push(StatusTransition {
            job_id: job_id.to_string(),
            from,
            to,
            occurred_at: job.updated_at,
        });
        Ok(true)
    }

    async fn transitions(&self, job_id: &str) -> Result<Vec<StatusTransition>> {
        Ok(self
            .transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.job_id == job_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockDocumentStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, location: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(location.to_string(), bytes);
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn fetch(&self, file: &FileReference) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&file.location)
            .cloned()
            .ok_or_else(|| SemestraError::NotFound(format!("file {}", file.location)))
    }
}

#[derive(Default)]
pub struct MockCourseRepository {
    pub courses: Mutex<Vec<Course>>,
    pub events: Mutex<Vec<CourseEvent>>,
    pub fail_create: AtomicBool,
}

impl MockCourseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn course_count(&self) -> usize {
        self.courses.lock().unwrap().len()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn seed_course(&self, course: Course) {
        self.courses.lock().unwrap().push(course);
    }

    pub fn seed_event(&self, event: CourseEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn event(&self, event_id: &str) -> Option<CourseEvent> {
        self.events.lock().unwrap().iter().find(|e| e.id == event_id).cloned()
    }
}

#[async_trait]
impl CourseRepository for MockCourseRepository {
    async fn create_course_with_events(
        &self,
        course: &Course,
        events: &[CourseEvent],
    ) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SemestraError::Database("unique constraint violation".into()));
        }
        self.courses.lock().unwrap().push(course.clone());
        self.events.lock().unwrap().extend(events.iter().cloned());
        Ok(())
    }

    async fn get_course(&self, course_id: &str) -> Result<Course> {
        self.courses
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == course_id)
            .cloned()
            .ok_or_else(|| SemestraError::NotFound(format!("course {}", course_id)))
    }

    async fn find_by_user_term(&self, user_id: &str, term: &str) -> Result<Vec<Course>> {
        let normalized = normalize_term(term);
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id && normalize_term(&c.term) == normalized)
            .cloned()
            .collect())
    }

    async fn events_for_course(&self, course_id: &str) -> Result<Vec<CourseEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn events_for_user(&self, user_id: &str) -> Result<Vec<CourseEvent>> {
        let course_ids: Vec<String> = self
            .courses
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.id.clone())
            .collect();
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| course_ids.contains(&e.course_id))
            .cloned()
            .collect())
    }

    async fn get_event(&self, event_id: &str) -> Result<CourseEvent> {
        self.event(event_id)
            .ok_or_else(|| SemestraError::NotFound(format!("event {}", event_id)))
    }

    async fn update_event(&self, event: &CourseEvent) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        match events.iter_mut().find(|e| e.id == event.id) {
            Some(stored) => {
                *stored = event.clone();
                Ok(())
            }
            None => Err(SemestraError::NotFound(format!("event {}", event.id))),
        }
    }
}

pub struct MockUnderstandingService {
    scripted: Mutex<VecDeque<Result<ExtractionResponse>>>,
    default_payload: Option<serde_json::Value>,
    pub calls: AtomicU32,
    delay: Option<Duration>,
}

impl MockUnderstandingService {
    /// Always answers with the given payload.
    pub fn with_payload(payload: serde_json::Value) -> Self {
        Self {
            scripted: Mutex::new(VecDeque::new()),
            default_payload: Some(payload),
            calls: AtomicU32::new(0),
            delay: None,
        }
    }

    /// Answers from the script first, then the default payload.
    pub fn scripted(
        responses: Vec<Result<ExtractionResponse>>,
        default_payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            scripted: Mutex::new(responses.into()),
            default_payload,
            calls: AtomicU32::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnderstandingService for MockUnderstandingService {
    async fn extract(&self, _request: ExtractionRequest) -> Result<ExtractionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(response) = self.scripted.lock().unwrap().pop_front() {
            return response;
        }
        match &self.default_payload {
            Some(payload) => Ok(ExtractionResponse {
                payload: payload.clone(),
                prompt_tokens: 500,
                completion_tokens: 120,
            }),
            None => Err(SemestraError::Internal("mock service exhausted".into())),
        }
    }
}

#[derive(Default)]
pub struct MockUsageRecorder {
    pub recorded: Mutex<Vec<(String, u32, u32)>>,
}

#[async_trait]
impl TokenUsageRecorder for MockUsageRecorder {
    async fn record_usage(
        &self,
        job_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Result<()> {
        self.recorded.lock().unwrap().push((job_id.to_string(), prompt_tokens, completion_tokens));
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Sync mocks
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct MockIntegrationRepository {
    pub integrations: Mutex<HashMap<String, CalendarIntegration>>,
}

impl MockIntegrationRepository {
    pub fn with(integration: CalendarIntegration) -> Self {
        let repo = Self::default();
        repo.integrations.lock().unwrap().insert(integration.id.clone(), integration);
        repo
    }

    pub fn get(&self, id: &str) -> Option<CalendarIntegration> {
        self.integrations.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl IntegrationRepository for MockIntegrationRepository {
    async fn get_integration(&self, integration_id: &str) -> Result<CalendarIntegration> {
        self.get(integration_id)
            .ok_or_else(|| SemestraError::NotFound(format!("integration {}", integration_id)))
    }

    async fn list_enabled(&self) -> Result<Vec<CalendarIntegration>> {
        Ok(self
            .integrations
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.sync_enabled)
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<CalendarIntegration>> {
        Ok(self
            .integrations
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_sync_token(&self, integration_id: &str, token: &str) -> Result<()> {
        if let Some(integration) =
            self.integrations.lock().unwrap().get_mut(integration_id)
        {
            integration.last_sync_token = Some(token.to_string());
        }
        Ok(())
    }

    async fn clear_sync_token(&self, integration_id: &str) -> Result<()> {
        if let Some(integration) =
            self.integrations.lock().unwrap().get_mut(integration_id)
        {
            integration.last_sync_token = None;
        }
        Ok(())
    }

    async fn set_sync_enabled(&self, integration_id: &str, enabled: bool) -> Result<()> {
        if let Some(integration) =
            self.integrations.lock().unwrap().get_mut(integration_id)
        {
            integration.sync_enabled = enabled;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockMappingRepository {
    pub mappings: Mutex<Vec<CalendarEventMapping>>,
}

impl MockMappingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<CalendarEventMapping> {
        self.mappings.lock().unwrap().clone()
    }

    pub fn by_event(&self, course_event_id: &str) -> Option<CalendarEventMapping> {
        self.mappings
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.course_event_id == course_event_id)
            .cloned()
    }
}

#[async_trait]
impl MappingRepository for MockMappingRepository {
    async fn mapping_for(
        &self,
        course_event_id: &str,
        integration_id: &str,
    ) -> Result<Option<CalendarEventMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.course_event_id == course_event_id && m.integration_id == integration_id)
            .cloned())
    }

    async fn find_by_external_id(
        &self,
        integration_id: &str,
        external_event_id: &str,
    ) -> Result<Option<CalendarEventMapping>> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .iter()
            .find(|m| {
                m.integration_id == integration_id && m.external_event_id == external_event_id
            })
            .cloned())
    }

    async fn upsert_mapping(&self, mapping: &CalendarEventMapping) -> Result<()> {
        let mut mappings = self.mappings.lock().unwrap();
        match mappings.iter_mut().find(|m| {
            m.course_event_id == mapping.course_event_id
                && m.integration_id == mapping.integration_id
        }) {
            Some(stored) => *stored = mapping.clone(),
            None => mappings.push(mapping.clone()),
        }
        Ok(())
    }

    async fn set_status(
        &self,
        mapping_id: &str,
        status: MappingSyncStatus,
        last_error: Option<&str>,
        last_synced_at: Option<i64>,
    ) -> Result<()> {
        let mut mappings = self.mappings.lock().unwrap();
        let mapping = mappings
            .iter_mut()
            .find(|m| m.id == mapping_id)
            .ok_or_else(|| SemestraError::NotFound(format!("mapping {}", mapping_id)))?;
        mapping.sync_status = status;
        mapping.last_error = last_error.map(String::from);
        if let Some(at) = last_synced_at {
            mapping.last_synced_at = Some(at);
        }
        Ok(())
    }

    async fn record_conflict(&self, mapping_id: &str, record: &ConflictRecord) -> Result<()> {
        let mut mappings = self.mappings.lock().unwrap();
        let mapping = mappings
            .iter_mut()
            .find(|m| m.id == mapping_id)
            .ok_or_else(|| SemestraError::NotFound(format!("mapping {}", mapping_id)))?;
        mapping.conflict_log.push(record.clone());
        Ok(())
    }
}

pub struct MockCalendarProvider {
    pub created: Mutex<Vec<(String, ExternalEventPayload)>>,
    pub updated: Mutex<Vec<(String, ExternalEventPayload)>>,
    pub create_results: Mutex<VecDeque<SyncResult<String>>>,
    pub update_results: Mutex<VecDeque<SyncResult<()>>>,
    pub change_results: Mutex<VecDeque<SyncResult<RemoteChanges>>>,
    pub calls: AtomicU32,
    next_id: AtomicU32,
}

impl MockCalendarProvider {
    pub fn new() -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
            create_results: Mutex::new(VecDeque::new()),
            update_results: Mutex::new(VecDeque::new()),
            change_results: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
            next_id: AtomicU32::new(1),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn script_create(&self, result: SyncResult<String>) {
        self.create_results.lock().unwrap().push_back(result);
    }

    pub fn script_update(&self, result: SyncResult<()>) {
        self.update_results.lock().unwrap().push_back(result);
    }

    pub fn script_changes(&self, result: SyncResult<RemoteChanges>) {
        self.change_results.lock().unwrap().push_back(result);
    }
}

impl Default for MockCalendarProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CalendarProvider for MockCalendarProvider {
    async fn create_event(
        &self,
        _access_token: &str,
        calendar_id: &str,
        payload: &ExternalEventPayload,
    ) -> SyncResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.create_results.lock().unwrap().pop_front() {
            return result;
        }
        self.created.lock().unwrap().push((calendar_id.to_string(), payload.clone()));
        Ok(format!("ext-{}", self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn update_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        external_event_id: &str,
        payload: &ExternalEventPayload,
    ) -> SyncResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.update_results.lock().unwrap().pop_front() {
            return result;
        }
        self.updated.lock().unwrap().push((external_event_id.to_string(), payload.clone()));
        Ok(())
    }

    async fn delete_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        _external_event_id: &str,
    ) -> SyncResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_changes_since(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        _sync_token: Option<&str>,
    ) -> SyncResult<RemoteChanges> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.change_results.lock().unwrap().pop_front() {
            return result;
        }
        Ok(RemoteChanges { changes: Vec::new(), next_sync_token: "fresh-token".to_string() })
    }
}

pub struct MockCredentialProvider {
    result: Mutex<SyncResult<String>>,
}

impl MockCredentialProvider {
    pub fn ok() -> Self {
        Self { result: Mutex::new(Ok("access-token".to_string())) }
    }

    pub fn failing_auth() -> Self {
        Self { result: Mutex::new(Err(SyncError::Auth("token revoked".into()))) }
    }
}

#[async_trait]
impl CredentialProvider for MockCredentialProvider {
    async fn access_token(&self, _integration: &CalendarIntegration) -> SyncResult<String> {
        self.result.lock().unwrap().clone()
    }
}
