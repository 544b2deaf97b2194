//! Port interfaces for the job pipeline

use async_trait::async_trait;
use semestra_domain::{
    Course, CourseEvent, FileReference, JobStatus, Result, StatusTransition, UploadJob,
};

/// Trait for upload job persistence.
///
/// `transition` is compare-and-set on the current status: it returns
/// `false` (not an error) when the job is no longer in `from`, which
/// makes duplicate external triggers no-ops.
#[async_trait]
pub trait UploadJobRepository: Send + Sync {
    /// Persist a newly created job
    async fn create_job(&self, job: &UploadJob) -> Result<()>;

    /// Load a job by id
    async fn get_job(&self, job_id: &str) -> Result<UploadJob>;

    /// Persist mutable job fields (draft, candidates, errors, retry
    /// count, bypass flag, file reference)
    async fn update_job(&self, job: &UploadJob) -> Result<()>;

    /// Atomically move the job from `from` to `to`, recording the
    /// transition with a timestamp. Returns `false` when the job was
    /// not in `from`.
    async fn transition(&self, job_id: &str, from: JobStatus, to: JobStatus) -> Result<bool>;

    /// Recorded transition history, oldest first
    async fn transitions(&self, job_id: &str) -> Result<Vec<StatusTransition>>;
}

/// Trait for fetching stored document bytes. Storage mechanics are a
/// collaborator concern; this port only reads.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self, file: &FileReference) -> Result<Vec<u8>>;
}

/// Trait for course and course-event persistence.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Create a course and all of its events in one atomic unit:
    /// either every record is durably created or none are.
    async fn create_course_with_events(
        &self,
        course: &Course,
        events: &[CourseEvent],
    ) -> Result<()>;

    /// Load a course by id
    async fn get_course(&self, course_id: &str) -> Result<Course>;

    /// Courses owned by a user in a given (normalized) term; the
    /// duplicate detector's scope
    async fn find_by_user_term(&self, user_id: &str, term: &str) -> Result<Vec<Course>>;

    /// Events belonging to one course
    async fn events_for_course(&self, course_id: &str) -> Result<Vec<CourseEvent>>;

    /// All events across a user's courses; the sync engine's push set
    async fn events_for_user(&self, user_id: &str) -> Result<Vec<CourseEvent>>;

    /// Load a single event
    async fn get_event(&self, event_id: &str) -> Result<CourseEvent>;

    /// Overwrite an event (remote-wins conflict resolution path)
    async fn update_event(&self, event: &CourseEvent) -> Result<()>;
}
