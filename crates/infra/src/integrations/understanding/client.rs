//! HTTP client for the external understanding service
//!
//! Implements the `UnderstandingService` port: one schema-constrained
//! request, one structured response. Transport failures (timeout,
//! quota, 5xx) map to `ServiceUnavailable` for the orchestrator's
//! backoff; content that is not valid JSON maps to `AiProcessing` so
//! the engine can re-request with a stricter instruction. The client
//! itself owns no retries.

use async_trait::async_trait;
use reqwest::Method;
use semestra_core::{ExtractionRequest, ExtractionResponse, UnderstandingService};
use semestra_domain::{Result, SemestraError};
use tracing::{debug, info};

use crate::http::HttpClient;

use super::types::{
    ChatMessage, CompletionRequest, CompletionResponse, JsonSchema, ResponseFormat,
};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_TOKENS: u32 = 16_000;
const DEFAULT_TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str = "You are an academic document analyst. Extract structured course \
     data from the provided syllabus text. Return a single JSON object conforming to the \
     provided schema; never return prose.";

const STRICT_SUFFIX: &str = " Your previous response violated the schema. Respond with ONLY a \
     JSON object that validates against the schema exactly: no markdown fences, no commentary, \
     no additional fields.";

/// Understanding-service client over the retrying HTTP client.
pub struct UnderstandingClient {
    http_client: HttpClient,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl UnderstandingClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, http_client: HttpClient) -> Self {
        Self { http_client, api_url: api_url.into(), api_key, model: DEFAULT_MODEL.to_string() }
    }

    /// Override the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_payload(&self, request: &ExtractionRequest) -> CompletionRequest {
        let mut system = SYSTEM_PROMPT.to_string();
        if request.strict_retry {
            system.push_str(STRICT_SUFFIX);
        }

        let mut user = String::new();
        if let Some(ref hint) = request.course_title_hint {
            user.push_str(&format!("The course is believed to be titled \"{}\".\n\n", hint));
        }
        user.push_str("Syllabus text:\n");
        user.push_str(&request.normalized_text);

        CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: system },
                ChatMessage { role: "user".to_string(), content: user },
            ],
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: Some(JsonSchema {
                    name: "extracted_course_draft".to_string(),
                    schema: request.target_schema.clone(),
                    strict: Some(true),
                }),
            },
        }
    }

    async fn handle_error_status(
        &self,
        status: u16,
        response: reqwest::Response,
    ) -> SemestraError {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());

        match status {
            401 | 403 => SemestraError::Auth(format!("understanding service rejected credentials ({})", status)),
            429 => SemestraError::ServiceUnavailable {
                message: format!("understanding service quota exhausted: {}", body),
                retry_after_secs: retry_after.or(Some(60)),
            },
            500..=599 => SemestraError::ServiceUnavailable {
                message: format!("understanding service error {}: {}", status, body),
                retry_after_secs: None,
            },
            _ => SemestraError::AiProcessing(format!(
                "understanding service rejected the request ({}): {}",
                status, body
            )),
        }
    }
}

#[async_trait]
impl UnderstandingService for UnderstandingClient {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionResponse> {
        info!(
            strict_retry = request.strict_retry,
            chars = request.normalized_text.len(),
            "requesting structured extraction"
        );

        let payload = self.build_payload(&request);

        let mut builder = self
            .http_client
            .request(Method::POST, &self.api_url)
            .header("Content-Type", "application/json")
            .json(&payload);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = self.http_client.send(builder).await.map_err(|err| match err {
            // Transport failures are transient from the pipeline's view
            SemestraError::Network(msg) => SemestraError::ServiceUnavailable {
                message: msg,
                retry_after_secs: None,
            },
            other => other,
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), "received understanding-service response");

        if !status.is_success() {
            return Err(self.handle_error_status(status.as_u16(), response).await);
        }

        let completion: CompletionResponse = response.json().await.map_err(|e| {
            SemestraError::AiProcessing(format!("response envelope was malformed: {}", e))
        })?;

        let choice = completion.choices.first().ok_or_else(|| {
            SemestraError::AiProcessing("response contained no choices".to_string())
        })?;

        let payload: serde_json::Value =
            serde_json::from_str(&choice.message.content).map_err(|e| {
                SemestraError::AiProcessing(format!(
                    "response content was not valid JSON: {}",
                    e
                ))
            })?;

        Ok(ExtractionResponse {
            payload,
            prompt_tokens: completion.usage.prompt_tokens,
            completion_tokens: completion.usage.completion_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(api_url: String) -> UnderstandingClient {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(5))
            .max_attempts(1) // No retries in tests
            .build()
            .expect("http client");

        UnderstandingClient::new(api_url, Some("test-api-key".to_string()), http_client)
    }

    fn extraction_request(strict: bool) -> ExtractionRequest {
        ExtractionRequest {
            normalized_text: "CS 101 Fall 2025 syllabus text".to_string(),
            target_schema: json!({ "type": "object" }),
            strict_retry: strict,
            course_title_hint: None,
        }
    }

    #[tokio::test]
    async fn returns_structured_payload_and_usage() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-api-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": "{\"course\": {\"title\": \"Intro to CS\", \"code\": \"CS 101\", \"term\": \"Fall 2025\"}}"
                    }
                }],
                "usage": {
                    "prompt_tokens": 800,
                    "completion_tokens": 150,
                    "total_tokens": 950
                }
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(format!("{}/v1/chat/completions", mock_server.uri()));
        let response = client.extract(extraction_request(false)).await.expect("should extract");

        assert_eq!(response.payload["course"]["code"], "CS 101");
        assert_eq!(response.prompt_tokens, 800);
        assert_eq!(response.completion_tokens, 150);
    }

    #[tokio::test]
    async fn quota_exhaustion_is_service_unavailable_with_backoff() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "120")
                    .set_body_string("rate limited"),
            )
            .mount(&mock_server)
            .await;

        let client = test_client(mock_server.uri());
        let result = client.extract(extraction_request(false)).await;

        match result {
            Err(SemestraError::ServiceUnavailable { retry_after_secs, .. }) => {
                assert_eq!(retry_after_secs, Some(120));
            }
            other => panic!("expected service unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn server_error_is_service_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&mock_server)
            .await;

        let client = test_client(mock_server.uri());
        let result = client.extract(extraction_request(false)).await;

        assert!(matches!(result, Err(SemestraError::ServiceUnavailable { .. })));
    }

    #[tokio::test]
    async fn invalid_credentials_are_auth_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&mock_server)
            .await;

        let client = test_client(mock_server.uri());
        let result = client.extract(extraction_request(false)).await;

        assert!(matches!(result, Err(SemestraError::Auth(_))));
    }

    #[tokio::test]
    async fn non_json_content_is_ai_processing_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "not valid json" } }],
                "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
            })))
            .mount(&mock_server)
            .await;

        let client = test_client(mock_server.uri());
        let result = client.extract(extraction_request(false)).await;

        assert!(matches!(result, Err(SemestraError::AiProcessing(_))));
    }

    #[tokio::test]
    async fn strict_retry_adds_stricter_instruction() {
        let client = test_client("http://unused".to_string());

        let relaxed = client.build_payload(&extraction_request(false));
        let strict = client.build_payload(&extraction_request(true));

        assert!(!relaxed.messages[0].content.contains("ONLY a"));
        assert!(strict.messages[0].content.contains("violated the schema"));
    }
}
