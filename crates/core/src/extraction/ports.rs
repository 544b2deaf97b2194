//! Port interfaces for the extraction engine

use async_trait::async_trait;
use semestra_domain::Result;

/// Request to the external understanding service.
///
/// The service must return a single structured object conforming to
/// `target_schema`; free text is never accepted.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub normalized_text: String,
    pub target_schema: serde_json::Value,
    /// Set on re-requests after a schema violation; implementations add
    /// a stricter conformance instruction.
    pub strict_retry: bool,
    pub course_title_hint: Option<String>,
}

/// Structured response from the understanding service.
#[derive(Debug, Clone)]
pub struct ExtractionResponse {
    /// The structured object, already parsed as JSON
    pub payload: serde_json::Value,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Trait for the external understanding service.
///
/// Implementations map transport-level failures (timeout, quota, 5xx)
/// to `SemestraError::ServiceUnavailable` and responses whose content
/// is not parseable JSON to `SemestraError::AiProcessing`. No retries
/// are owned by the service itself.
#[async_trait]
pub trait UnderstandingService: Send + Sync {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionResponse>;
}

/// Trait for recording understanding-service token usage per job.
#[async_trait]
pub trait TokenUsageRecorder: Send + Sync {
    async fn record_usage(
        &self,
        job_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Result<()>;
}
