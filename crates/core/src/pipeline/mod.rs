//! Job orchestrator
//!
//! Drives an upload job through the pipeline state machine:
//! `Pending -> ExtractingText -> AiAnalyzing -> Scoring ->
//! DuplicateCheck -> {Materializing | AwaitingReview} -> Completed`,
//! with `Failed` reachable from every active state and `Cancelled` on
//! owner request. Transitions are compare-and-set in the repository,
//! so a duplicate external trigger is a no-op rather than an error.
//!
//! Transient understanding-service failures retry with exponential
//! backoff up to the retry cap; every other failure kind is terminal
//! immediately. The duplicate-check-to-materializing window runs under
//! an advisory lock keyed by the normalized (user, term, code)
//! signature, so two concurrent uploads of the same course cannot both
//! win past duplicate detection.

pub mod ports;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use semestra_common::resilience::RetryConfig;
use semestra_domain::constants::MAX_TRANSIENT_RETRIES;
use semestra_domain::{
    duplicate_signature, normalize_term, DraftCorrections, DuplicateCandidate, ExtractedDraft,
    FileReference, JobErrorRecord, JobStatus, Result, SemestraError, StatusTransition, UploadJob,
};

use crate::dedup::DuplicateDetector;
use crate::extraction::engine::ExtractionEngine;
use crate::extraction::text::extract_text;
use crate::materialize::Materializer;
use crate::scoring::ConfidenceScorer;
use crate::util::locks::KeyedLocks;

use self::ports::{CourseRepository, DocumentStore, UploadJobRepository};

/// Status-query projection of a job.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress_stage: &'static str,
    pub extracted_draft: Option<ExtractedDraft>,
    pub duplicate_candidates: Vec<DuplicateCandidate>,
    pub errors: Vec<JobErrorRecord>,
    pub history: Vec<StatusTransition>,
}

/// Outcome of a pipeline stage that respects cancellation.
enum Stage<T> {
    Done(T),
    Cancelled,
}

/// Job orchestrator over the pipeline ports.
pub struct JobOrchestrator {
    jobs: Arc<dyn UploadJobRepository>,
    documents: Arc<dyn DocumentStore>,
    courses: Arc<dyn CourseRepository>,
    engine: ExtractionEngine,
    scorer: Arc<ConfidenceScorer>,
    detector: DuplicateDetector,
    materializer: Materializer,
    locks: KeyedLocks,
    retry: RetryConfig,
    cancellations: DashMap<String, CancellationToken>,
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<dyn UploadJobRepository>,
        documents: Arc<dyn DocumentStore>,
        courses: Arc<dyn CourseRepository>,
        engine: ExtractionEngine,
        materializer: Materializer,
        retry: RetryConfig,
    ) -> Self {
        Self {
            jobs,
            documents,
            courses,
            engine,
            scorer: Arc::new(ConfidenceScorer::new()),
            detector: DuplicateDetector::new(),
            materializer,
            locks: KeyedLocks::new(),
            retry,
            cancellations: DashMap::new(),
        }
    }

    /// Create a job for an uploaded file, in `Pending` state.
    #[instrument(skip(self, file))]
    pub async fn ingest(
        &self,
        user_id: &str,
        file: FileReference,
        course_title_hint: Option<String>,
    ) -> Result<UploadJob> {
        let job = UploadJob::new(user_id, file, course_title_hint);
        self.jobs.create_job(&job).await?;
        info!(job_id = %job.id, user_id, "upload job created");
        Ok(job)
    }

    /// Run the pipeline for a pending job. Re-invoking on a job already
    /// past `Pending` is a no-op.
    #[instrument(skip(self), fields(job_id))]
    pub async fn run_job(&self, job_id: &str) -> Result<()> {
        let token = self
            .cancellations
            .entry(job_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone();

        let mut job = self.jobs.get_job(job_id).await?;

        if !self.advance(&mut job, JobStatus::ExtractingText).await? {
            debug!(job_id, status = job.status.as_str(), "pipeline trigger was a no-op");
            return Ok(());
        }

        let text = match self.fetch_and_extract(&job).await {
            Ok(text) => text,
            Err(err) => return self.fail_job(&mut job, err).await,
        };

        if token.is_cancelled() {
            return self.mark_cancelled(&mut job).await;
        }

        if !self.advance(&mut job, JobStatus::AiAnalyzing).await? {
            return Ok(());
        }

        self.analyze_score_and_finish(&mut job, text, &token).await
    }

    /// Approve a job awaiting review; merges corrections, honors the
    /// single-use duplicate bypass, and materializes.
    #[instrument(skip(self, corrections), fields(job_id))]
    pub async fn approve(
        &self,
        job_id: &str,
        corrections: Option<DraftCorrections>,
        bypass_duplicates: bool,
    ) -> Result<String> {
        let mut job = self.jobs.get_job(job_id).await?;

        if job.status != JobStatus::AwaitingReview {
            return Err(SemestraError::InvalidInput(format!(
                "job {} is not awaiting review (status: {})",
                job_id,
                job.status.as_str()
            )));
        }

        let mut draft = job
            .extracted_draft
            .clone()
            .ok_or_else(|| SemestraError::Internal("job awaiting review has no draft".into()))?;

        if let Some(ref corrections) = corrections {
            corrections.apply(&mut draft);
        }

        if draft.course.title.trim().is_empty() || draft.course.code.trim().is_empty() {
            return Err(SemestraError::Validation(
                "course title and code are required".into(),
            ));
        }
        if !draft.grading_weights_valid() {
            return Err(SemestraError::Validation(format!(
                "grading weights sum to {:.1}, expected 100",
                draft.grading_weights.values().sum::<f64>()
            )));
        }

        job.extracted_draft = Some(draft.clone());
        job.bypass_duplicates = bypass_duplicates;
        self.jobs.update_job(&job).await?;

        let signature =
            duplicate_signature(&job.user_id, &draft.course.term, &draft.course.code);
        let _guard = self.locks.acquire(&signature).await;

        if job.bypass_duplicates {
            // Honored exactly once per job
            job.bypass_duplicates = false;
            info!(job_id, "duplicate check bypassed by approval request");
        } else {
            let existing = self
                .courses
                .find_by_user_term(&job.user_id, &normalize_term(&draft.course.term))
                .await?;
            let candidates = self.detector.find_candidates(&draft.course, &existing);
            if !candidates.is_empty() {
                job.duplicate_candidates = candidates;
                self.jobs.update_job(&job).await?;
                return Err(SemestraError::DuplicateDetected(format!(
                    "{} similar course(s) exist; correct the draft or set bypass_duplicates",
                    job.duplicate_candidates.len()
                )));
            }
        }

        if !self.advance(&mut job, JobStatus::Materializing).await? {
            return Err(SemestraError::InvalidInput(
                "job left awaiting_review during approval".into(),
            ));
        }
        self.jobs.update_job(&job).await?;

        match self.materializer.materialize(&job, &draft).await {
            Ok(outcome) => {
                self.advance(&mut job, JobStatus::Completed).await?;
                self.jobs.update_job(&job).await?;
                info!(job_id, course_id = %outcome.course_id, "job approved and materialized");
                Ok(outcome.course_id)
            }
            Err(err) => {
                self.fail_job(&mut job, err.clone()).await?;
                Err(err)
            }
        }
    }

    /// Reject a job awaiting review.
    #[instrument(skip(self), fields(job_id))]
    pub async fn reject(&self, job_id: &str) -> Result<()> {
        let mut job = self.jobs.get_job(job_id).await?;
        if job.status != JobStatus::AwaitingReview {
            return Err(SemestraError::InvalidInput(format!(
                "job {} is not awaiting review",
                job_id
            )));
        }
        if self.advance(&mut job, JobStatus::Cancelled).await? {
            self.jobs.update_job(&job).await?;
        }
        Ok(())
    }

    /// Resubmit a job awaiting review with a new file; analysis starts
    /// over from the new document.
    #[instrument(skip(self, new_file), fields(job_id))]
    pub async fn resubmit(&self, job_id: &str, new_file: FileReference) -> Result<()> {
        let token = self
            .cancellations
            .entry(job_id.to_string())
            .or_insert_with(CancellationToken::new)
            .clone();

        let mut job = self.jobs.get_job(job_id).await?;
        if job.status != JobStatus::AwaitingReview {
            return Err(SemestraError::InvalidInput(format!(
                "job {} is not awaiting review",
                job_id
            )));
        }

        if !self.advance(&mut job, JobStatus::AiAnalyzing).await? {
            return Err(SemestraError::InvalidInput(
                "job left awaiting_review during resubmission".into(),
            ));
        }

        job.file = new_file;
        job.extracted_draft = None;
        job.duplicate_candidates.clear();
        job.retry_count = 0;
        self.jobs.update_job(&job).await?;

        let text = match self.fetch_and_extract(&job).await {
            Ok(text) => text,
            Err(err) => return self.fail_job(&mut job, err).await,
        };

        self.analyze_score_and_finish(&mut job, text, &token).await
    }

    /// Cancel a job in a non-terminal state. In-flight network calls
    /// are aborted best-effort.
    #[instrument(skip(self), fields(job_id))]
    pub async fn cancel(&self, job_id: &str) -> Result<()> {
        if let Some(token) = self.cancellations.get(job_id) {
            token.cancel();
        }

        let mut job = self.jobs.get_job(job_id).await?;
        for _ in 0..4 {
            if job.status.is_terminal() {
                return Ok(());
            }
            if self.jobs.transition(&job.id, job.status, JobStatus::Cancelled).await? {
                info!(job_id, "job cancelled");
                return Ok(());
            }
            job = self.jobs.get_job(job_id).await?;
        }

        Err(SemestraError::Internal(format!("unable to cancel job {}", job_id)))
    }

    /// Status projection for the external query interface.
    pub async fn status(&self, job_id: &str) -> Result<JobStatusView> {
        let job = self.jobs.get_job(job_id).await?;
        let history = self.jobs.transitions(job_id).await?;
        Ok(JobStatusView {
            job_id: job.id,
            status: job.status,
            progress_stage: job.status.as_str(),
            extracted_draft: job.extracted_draft,
            duplicate_candidates: job.duplicate_candidates,
            errors: job.errors,
            history,
        })
    }

    // ------------------------------------------------------------------
    // Pipeline stages
    // ------------------------------------------------------------------

    /// Shared continuation from `AiAnalyzing` onward; used by both the
    /// initial run and resubmission.
    async fn analyze_score_and_finish(
        &self,
        job: &mut UploadJob,
        text: String,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut draft = match self.analyze_with_retry(job, &text, token).await {
            Ok(Stage::Done(draft)) => draft,
            Ok(Stage::Cancelled) => return self.mark_cancelled(job).await,
            Err(err) => return self.fail_job(job, err).await,
        };

        if !self.advance(job, JobStatus::Scoring).await? {
            return Ok(());
        }

        // Scoring is CPU-bound; keep it off the async workers
        let scorer = Arc::clone(&self.scorer);
        let scored = tokio::task::spawn_blocking(move || {
            scorer.score(&text, &mut draft);
            draft
        })
        .await
        .map_err(|e| SemestraError::Internal(format!("scoring task failed: {}", e)))?;

        job.extracted_draft = Some(scored);
        self.jobs.update_job(job).await?;

        if token.is_cancelled() {
            return self.mark_cancelled(job).await;
        }

        if !self.advance(job, JobStatus::DuplicateCheck).await? {
            return Ok(());
        }

        self.duplicate_check_and_materialize(job).await
    }

    /// Fetch document bytes and extract normalized text on the
    /// blocking pool.
    async fn fetch_and_extract(&self, job: &UploadJob) -> Result<String> {
        let bytes = self.documents.fetch(&job.file).await?;
        let declared = job.file.declared_type;

        let extraction = tokio::task::spawn_blocking(move || extract_text(&bytes, declared))
            .await
            .map_err(|e| SemestraError::Internal(format!("extraction task failed: {}", e)))??;

        debug!(
            job_id = %job.id,
            detected = extraction.detected_type.as_str(),
            chars = extraction.text.len(),
            "text extracted"
        );

        Ok(extraction.text)
    }

    /// Drive the extraction engine with transient-failure backoff.
    async fn analyze_with_retry(
        &self,
        job: &mut UploadJob,
        text: &str,
        token: &CancellationToken,
    ) -> Result<Stage<ExtractedDraft>> {
        loop {
            let extraction = tokio::select! {
                _ = token.cancelled() => return Ok(Stage::Cancelled),
                result = self.engine.extract_draft(
                    &job.id,
                    text,
                    job.course_title_hint.as_deref(),
                ) => result,
            };

            match extraction {
                Ok(draft) => return Ok(Stage::Done(draft)),
                Err(err @ SemestraError::ServiceUnavailable { .. })
                    if job.retry_count < MAX_TRANSIENT_RETRIES =>
                {
                    job.retry_count += 1;
                    job.record_error(job.status, err.to_string());
                    self.jobs.update_job(job).await?;

                    let retry_after = match &err {
                        SemestraError::ServiceUnavailable { retry_after_secs, .. } => {
                            retry_after_secs.map(Duration::from_secs)
                        }
                        _ => None,
                    };
                    let delay = self.retry.delay_for(job.retry_count - 1, retry_after);
                    warn!(
                        job_id = %job.id,
                        retry_count = job.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        "transient extraction failure; backing off"
                    );

                    tokio::select! {
                        _ = token.cancelled() => return Ok(Stage::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Duplicate check and, when clear, materialization - both under
    /// the signature advisory lock.
    async fn duplicate_check_and_materialize(&self, job: &mut UploadJob) -> Result<()> {
        let draft = match job.extracted_draft.clone() {
            Some(draft) => draft,
            None => {
                return self
                    .fail_job(
                        job,
                        SemestraError::Internal("duplicate check reached without a draft".into()),
                    )
                    .await;
            }
        };

        let signature =
            duplicate_signature(&job.user_id, &draft.course.term, &draft.course.code);
        let _guard = self.locks.acquire(&signature).await;

        let existing = match self
            .courses
            .find_by_user_term(&job.user_id, &normalize_term(&draft.course.term))
            .await
        {
            Ok(existing) => existing,
            Err(err) => return self.fail_job(job, err).await,
        };

        let candidates = self.detector.find_candidates(&draft.course, &existing);
        let has_duplicates = !candidates.is_empty();
        job.duplicate_candidates = candidates;

        if has_duplicates || draft.requires_review() {
            if self.advance(job, JobStatus::AwaitingReview).await? {
                self.jobs.update_job(job).await?;
                info!(
                    job_id = %job.id,
                    duplicates = job.duplicate_candidates.len(),
                    low_confidence = draft.confidence.low_confidence.len(),
                    "job suspended for review"
                );
            }
            return Ok(());
        }

        if !self.advance(job, JobStatus::Materializing).await? {
            return Ok(());
        }
        self.jobs.update_job(job).await?;

        match self.materializer.materialize(job, &draft).await {
            Ok(outcome) => {
                self.advance(job, JobStatus::Completed).await?;
                self.jobs.update_job(job).await?;
                info!(job_id = %job.id, course_id = %outcome.course_id, "pipeline completed");
                Ok(())
            }
            Err(err) => self.fail_job(job, err).await,
        }
    }

    // ------------------------------------------------------------------
    // State helpers
    // ------------------------------------------------------------------

    /// Compare-and-set transition; updates the in-memory job on
    /// success and reports a no-op otherwise. An illegal transition
    /// (e.g. re-triggering a job already past the state) is a no-op,
    /// not an error.
    async fn advance(&self, job: &mut UploadJob, to: JobStatus) -> Result<bool> {
        if !job.status.can_transition_to(to) {
            debug!(
                job_id = %job.id,
                from = job.status.as_str(),
                to = to.as_str(),
                "illegal transition ignored"
            );
            return Ok(false);
        }
        let moved = self.jobs.transition(&job.id, job.status, to).await?;
        if moved {
            job.status = to;
        } else {
            debug!(
                job_id = %job.id,
                from = job.status.as_str(),
                to = to.as_str(),
                "transition no-op"
            );
        }
        Ok(moved)
    }

    /// Record the error on the job and mark it failed. The pipeline
    /// run itself completes normally; the error lives on the job.
    async fn fail_job(&self, job: &mut UploadJob, err: SemestraError) -> Result<()> {
        warn!(job_id = %job.id, stage = job.status.as_str(), error = %err, "job failed");
        job.record_error(job.status, err.to_string());
        if self.jobs.transition(&job.id, job.status, JobStatus::Failed).await? {
            job.status = JobStatus::Failed;
        }
        self.jobs.update_job(job).await?;
        Ok(())
    }

    async fn mark_cancelled(&self, job: &mut UploadJob) -> Result<()> {
        if self.jobs.transition(&job.id, job.status, JobStatus::Cancelled).await? {
            job.status = JobStatus::Cancelled;
            self.jobs.update_job(job).await?;
            info!(job_id = %job.id, "job cancelled mid-pipeline");
        }
        Ok(())
    }
}
