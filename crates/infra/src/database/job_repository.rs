//! SQLite-backed implementation of the UploadJobRepository port.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Row, ToSql};
use semestra_core::UploadJobRepository;
use semestra_domain::{
    DocumentType, FileReference, JobStatus, Result, SemestraError, StatusTransition, UploadJob,
};
use tracing::{debug, instrument};

use crate::errors::InfraError;

use super::manager::DatabaseManager;

/// SQLite implementation of UploadJobRepository.
///
/// Status changes go exclusively through `transition` (compare-and-set
/// plus an audit row); `update_job` persists every other mutable field.
pub struct SqliteJobRepository {
    db: DatabaseManager,
}

impl SqliteJobRepository {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UploadJobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn create_job(&self, job: &UploadJob) -> Result<()> {
        let conn = self.db.connection()?;

        conn.execute(
            "INSERT INTO upload_jobs (
                id, user_id, file_location, file_name, declared_type,
                course_title_hint, status, extracted_draft_json,
                duplicate_candidates_json, errors_json, retry_count,
                bypass_duplicates, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            [
                &job.id as &dyn ToSql,
                &job.user_id,
                &job.file.location,
                &job.file.filename,
                &job.file.declared_type.as_str(),
                &job.course_title_hint,
                &job.status.as_str(),
                &draft_json(job)?,
                &serde_json::to_string(&job.duplicate_candidates).map_err(InfraError::from)?,
                &serde_json::to_string(&job.errors).map_err(InfraError::from)?,
                &job.retry_count,
                &job.bypass_duplicates,
                &job.created_at,
                &job.updated_at,
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_job(&self, job_id: &str) -> Result<UploadJob> {
        let conn = self.db.connection()?;

        conn.query_row(
            "SELECT id, user_id, file_location, file_name, declared_type,
                    course_title_hint, status, extracted_draft_json,
                    duplicate_candidates_json, errors_json, retry_count,
                    bypass_duplicates, created_at, updated_at
             FROM upload_jobs WHERE id = ?1",
            [&job_id],
            job_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                SemestraError::NotFound(format!("job {} not found", job_id))
            }
            other => InfraError::from(other).into(),
        })?
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn update_job(&self, job: &UploadJob) -> Result<()> {
        let conn = self.db.connection()?;
        let now = Utc::now().timestamp();

        // Status is intentionally absent: it only moves via transition()
        conn.execute(
            "UPDATE upload_jobs SET
                file_location = ?1,
                file_name = ?2,
                declared_type = ?3,
                extracted_draft_json = ?4,
                duplicate_candidates_json = ?5,
                errors_json = ?6,
                retry_count = ?7,
                bypass_duplicates = ?8,
                updated_at = ?9
             WHERE id = ?10",
            [
                &job.file.location as &dyn ToSql,
                &job.file.filename,
                &job.file.declared_type.as_str(),
                &draft_json(job)?,
                &serde_json::to_string(&job.duplicate_candidates).map_err(InfraError::from)?,
                &serde_json::to_string(&job.errors).map_err(InfraError::from)?,
                &job.retry_count,
                &job.bypass_duplicates,
                &now,
                &job.id,
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn transition(&self, job_id: &str, from: JobStatus, to: JobStatus) -> Result<bool> {
        let mut conn = self.db.connection()?;
        let now = Utc::now().timestamp();

        let tx = conn.transaction().map_err(InfraError::from)?;

        let moved = tx
            .execute(
                "UPDATE upload_jobs SET status = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = ?4",
                [&to.as_str() as &dyn ToSql, &now, &job_id, &from.as_str()].as_ref(),
            )
            .map_err(InfraError::from)?;

        if moved == 0 {
            debug!(job_id, from = from.as_str(), to = to.as_str(), "transition no-op");
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO upload_job_transitions (job_id, from_status, to_status, occurred_at)
             VALUES (?1, ?2, ?3, ?4)",
            [&job_id as &dyn ToSql, &from.as_str(), &to.as_str(), &now].as_ref(),
        )
        .map_err(InfraError::from)?;

        tx.commit().map_err(InfraError::from)?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn transitions(&self, job_id: &str) -> Result<Vec<StatusTransition>> {
        let conn = self.db.connection()?;

        let mut stmt = conn
            .prepare(
                "SELECT job_id, from_status, to_status, occurred_at
                 FROM upload_job_transitions
                 WHERE job_id = ?1 ORDER BY id ASC",
            )
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map([&job_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(InfraError::from)?;

        let mut transitions = Vec::new();
        for row in rows {
            let (job_id, from_raw, to_raw, occurred_at) = row.map_err(InfraError::from)?;
            transitions.push(StatusTransition {
                job_id,
                from: parse_status(&from_raw)?,
                to: parse_status(&to_raw)?,
                occurred_at,
            });
        }

        Ok(transitions)
    }
}

fn draft_json(job: &UploadJob) -> Result<Option<String>> {
    match &job.extracted_draft {
        Some(draft) => Ok(Some(
            serde_json::to_string(draft).map_err(InfraError::from)?,
        )),
        None => Ok(None),
    }
}

fn parse_status(raw: &str) -> Result<JobStatus> {
    JobStatus::parse(raw)
        .ok_or_else(|| SemestraError::Database(format!("unknown job status '{}'", raw)))
}

fn parse_document_type(raw: &str) -> std::result::Result<DocumentType, rusqlite::Error> {
    match raw {
        "pdf" => Ok(DocumentType::Pdf),
        "docx" => Ok(DocumentType::Docx),
        "html" => Ok(DocumentType::Html),
        "rtf" => Ok(DocumentType::Rtf),
        "text" => Ok(DocumentType::Text),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown document type '{}'", other).into(),
        )),
    }
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Result<UploadJob>> {
    let declared_type = parse_document_type(&row.get::<_, String>(4)?)?;
    let status_raw: String = row.get(6)?;
    let draft_raw: Option<String> = row.get(7)?;
    let candidates_raw: String = row.get(8)?;
    let errors_raw: String = row.get(9)?;

    Ok(build_job(BuildJob {
        id: row.get(0)?,
        user_id: row.get(1)?,
        file_location: row.get(2)?,
        file_name: row.get(3)?,
        declared_type,
        course_title_hint: row.get(5)?,
        status_raw,
        draft_raw,
        candidates_raw,
        errors_raw,
        retry_count: row.get(10)?,
        bypass_duplicates: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    }))
}

struct BuildJob {
    id: String,
    user_id: String,
    file_location: String,
    file_name: String,
    declared_type: DocumentType,
    course_title_hint: Option<String>,
    status_raw: String,
    draft_raw: Option<String>,
    candidates_raw: String,
    errors_raw: String,
    retry_count: u32,
    bypass_duplicates: bool,
    created_at: i64,
    updated_at: i64,
}

fn build_job(parts: BuildJob) -> Result<UploadJob> {
    let extracted_draft = match parts.draft_raw {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(InfraError::from)?),
        None => None,
    };

    Ok(UploadJob {
        id: parts.id,
        user_id: parts.user_id,
        file: FileReference {
            location: parts.file_location,
            filename: parts.file_name,
            declared_type: parts.declared_type,
        },
        course_title_hint: parts.course_title_hint,
        status: parse_status(&parts.status_raw)?,
        extracted_draft,
        duplicate_candidates: serde_json::from_str(&parts.candidates_raw)
            .map_err(InfraError::from)?,
        errors: serde_json::from_str(&parts.errors_raw).map_err(InfraError::from)?,
        retry_count: parts.retry_count,
        bypass_duplicates: parts.bypass_duplicates,
        created_at: parts.created_at,
        updated_at: parts.updated_at,
    })
}
