//! Upload job commands

use std::sync::Arc;
use std::time::Instant;

use semestra_core::JobStatusView;
use semestra_domain::{
    DocumentType, DraftCorrections, FileReference, Result, SemestraError,
};
use tracing::{info, instrument};

use crate::context::AppContext;
use crate::logging::log_command_execution;

/// Accept an uploaded syllabus and start the pipeline.
///
/// The declared type comes from the upload metadata when present and
/// the filename extension otherwise; a file of unknown type is
/// rejected before a job is created.
#[instrument(skip(context))]
pub async fn ingest_syllabus(
    context: &Arc<AppContext>,
    user_id: &str,
    location: &str,
    filename: &str,
    declared_type: Option<DocumentType>,
    course_title_hint: Option<String>,
) -> Result<String> {
    let started = Instant::now();

    let declared = match declared_type {
        Some(declared) => declared,
        None => {
            let extension = filename.rsplit('.').next().unwrap_or_default();
            DocumentType::from_extension(extension).ok_or_else(|| {
                SemestraError::Validation(format!(
                    "unsupported file type for '{}'",
                    filename
                ))
            })?
        }
    };

    let file = FileReference {
        location: location.to_string(),
        filename: filename.to_string(),
        declared_type: declared,
    };

    let result = context.orchestrator.ingest(user_id, file, course_title_hint).await;
    log_command_execution("jobs::ingest_syllabus", started.elapsed(), result.is_ok());
    let job = result?;

    // The pipeline runs as an independent asynchronous unit of work
    let orchestrator = context.orchestrator.clone();
    let job_id = job.id.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_job(&job_id).await {
            tracing::error!(job_id, error = %e, "pipeline run failed");
        }
    });

    info!(job_id = %job.id, user_id, "syllabus accepted for processing");
    Ok(job.id)
}

/// Status query: current state, draft, candidates, errors, history.
#[instrument(skip(context))]
pub async fn job_status(context: &Arc<AppContext>, job_id: &str) -> Result<JobStatusView> {
    let started = Instant::now();
    let result = context.orchestrator.status(job_id).await;
    log_command_execution("jobs::job_status", started.elapsed(), result.is_ok());
    result
}

/// Approve a reviewed job, optionally with corrections and the
/// single-use duplicate bypass. Returns the new course id.
#[instrument(skip(context, corrections))]
pub async fn approve_job(
    context: &Arc<AppContext>,
    job_id: &str,
    corrections: Option<DraftCorrections>,
    bypass_duplicates: bool,
) -> Result<String> {
    let started = Instant::now();
    let result = context.orchestrator.approve(job_id, corrections, bypass_duplicates).await;
    log_command_execution("jobs::approve_job", started.elapsed(), result.is_ok());
    result
}

/// Reject a reviewed job.
#[instrument(skip(context))]
pub async fn reject_job(context: &Arc<AppContext>, job_id: &str) -> Result<()> {
    let started = Instant::now();
    let result = context.orchestrator.reject(job_id).await;
    log_command_execution("jobs::reject_job", started.elapsed(), result.is_ok());
    result
}

/// Resubmit a reviewed job with a replacement file.
#[instrument(skip(context))]
pub async fn resubmit_job(
    context: &Arc<AppContext>,
    job_id: &str,
    location: &str,
    filename: &str,
    declared_type: DocumentType,
) -> Result<()> {
    let started = Instant::now();
    let file = FileReference {
        location: location.to_string(),
        filename: filename.to_string(),
        declared_type,
    };
    let result = context.orchestrator.resubmit(job_id, file).await;
    log_command_execution("jobs::resubmit_job", started.elapsed(), result.is_ok());
    result
}

/// Cancel a job in a non-terminal state.
#[instrument(skip(context))]
pub async fn cancel_job(context: &Arc<AppContext>, job_id: &str) -> Result<()> {
    let started = Instant::now();
    let result = context.orchestrator.cancel(job_id).await;
    log_command_execution("jobs::cancel_job", started.elapsed(), result.is_ok());
    result
}
