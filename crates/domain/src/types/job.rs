//! Upload job model and pipeline state machine states

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::course::DuplicateCandidate;
use super::draft::ExtractedDraft;

/// Pipeline state of an upload job.
///
/// Legal transitions are encoded in [`JobStatus::can_transition_to`];
/// every state may additionally transition to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    ExtractingText,
    AiAnalyzing,
    Scoring,
    DuplicateCheck,
    AwaitingReview,
    Materializing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Stable string form used in the database and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::ExtractingText => "extracting_text",
            Self::AiAnalyzing => "ai_analyzing",
            Self::Scoring => "scoring",
            Self::DuplicateCheck => "duplicate_check",
            Self::AwaitingReview => "awaiting_review",
            Self::Materializing => "materializing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the stable string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "extracting_text" => Some(Self::ExtractingText),
            "ai_analyzing" => Some(Self::AiAnalyzing),
            "scoring" => Some(Self::Scoring),
            "duplicate_check" => Some(Self::DuplicateCheck),
            "awaiting_review" => Some(Self::AwaitingReview),
            "materializing" => Some(Self::Materializing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Any non-terminal state may move to `Failed` or `Cancelled`;
    /// forward progress follows the pipeline order, with
    /// `AwaitingReview` able to resume materialization (approval) or
    /// return to analysis (resubmission).
    pub fn can_transition_to(&self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, Self::Failed | Self::Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::ExtractingText)
                | (Self::ExtractingText, Self::AiAnalyzing)
                | (Self::AiAnalyzing, Self::Scoring)
                | (Self::Scoring, Self::DuplicateCheck)
                | (Self::DuplicateCheck, Self::Materializing)
                | (Self::DuplicateCheck, Self::AwaitingReview)
                | (Self::AwaitingReview, Self::Materializing)
                | (Self::AwaitingReview, Self::AiAnalyzing)
                | (Self::Materializing, Self::Completed)
        )
    }
}

/// Declared or detected document format for an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Pdf,
    Docx,
    Html,
    Rtf,
    Text,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Html => "html",
            Self::Rtf => "rtf",
            Self::Text => "text",
        }
    }

    /// Map a filename extension onto a declared type.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "html" | "htm" => Some(Self::Html),
            "rtf" => Some(Self::Rtf),
            "txt" | "md" | "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Reference to a stored uploaded file. Storage mechanics live behind
/// the document store port; this only carries enough to fetch bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReference {
    /// Opaque location understood by the document store
    pub location: String,
    /// Original filename as uploaded
    pub filename: String,
    /// Format declared by the uploader
    pub declared_type: DocumentType,
}

/// One recorded pipeline error, kept on the job for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobErrorRecord {
    /// Pipeline stage the error occurred in
    pub stage: JobStatus,
    pub message: String,
    pub occurred_at: i64,
}

/// A recorded status transition with its timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub job_id: String,
    pub from: JobStatus,
    pub to: JobStatus,
    pub occurred_at: i64,
}

/// An upload job owned by the orchestrator, created at ingestion and
/// retained indefinitely for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: String,
    pub user_id: String,
    pub file: FileReference,
    pub course_title_hint: Option<String>,
    pub status: JobStatus,
    pub extracted_draft: Option<ExtractedDraft>,
    pub duplicate_candidates: Vec<DuplicateCandidate>,
    pub errors: Vec<JobErrorRecord>,
    pub retry_count: u32,
    /// Single-use flag set by an approval request to skip the duplicate block
    pub bypass_duplicates: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UploadJob {
    /// Create a fresh job in `Pending` state.
    pub fn new(user_id: impl Into<String>, file: FileReference, hint: Option<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: user_id.into(),
            file,
            course_title_hint: hint,
            status: JobStatus::Pending,
            extracted_draft: None,
            duplicate_candidates: Vec::new(),
            errors: Vec::new(),
            retry_count: 0,
            bypass_duplicates: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a pipeline error record for the given stage.
    pub fn record_error(&mut self, stage: JobStatus, message: impl Into<String>) {
        self.errors.push(JobErrorRecord {
            stage,
            message: message.into(),
            occurred_at: Utc::now().timestamp(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_legal() {
        let path = [
            JobStatus::Pending,
            JobStatus::ExtractingText,
            JobStatus::AiAnalyzing,
            JobStatus::Scoring,
            JobStatus::DuplicateCheck,
            JobStatus::Materializing,
            JobStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn review_can_resume_resubmit_or_cancel() {
        assert!(JobStatus::AwaitingReview.can_transition_to(JobStatus::Materializing));
        assert!(JobStatus::AwaitingReview.can_transition_to(JobStatus::AiAnalyzing));
        assert!(JobStatus::AwaitingReview.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::AwaitingReview.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn terminal_states_do_not_transition() {
        for terminal in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(JobStatus::Pending));
            assert!(!terminal.can_transition_to(JobStatus::Failed));
        }
    }

    #[test]
    fn any_active_state_may_fail() {
        for state in [
            JobStatus::Pending,
            JobStatus::ExtractingText,
            JobStatus::AiAnalyzing,
            JobStatus::Scoring,
            JobStatus::DuplicateCheck,
            JobStatus::AwaitingReview,
            JobStatus::Materializing,
        ] {
            assert!(state.can_transition_to(JobStatus::Failed));
        }
    }

    #[test]
    fn status_string_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::ExtractingText,
            JobStatus::AiAnalyzing,
            JobStatus::Scoring,
            JobStatus::DuplicateCheck,
            JobStatus::AwaitingReview,
            JobStatus::Materializing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn new_job_starts_pending() {
        let file = FileReference {
            location: "uploads/syllabus.pdf".into(),
            filename: "syllabus.pdf".into(),
            declared_type: DocumentType::Pdf,
        };
        let job = UploadJob::new("user-1", file, Some("Intro to CS".into()));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 0);
        assert!(job.errors.is_empty());
        assert!(!job.bypass_duplicates);
    }
}
