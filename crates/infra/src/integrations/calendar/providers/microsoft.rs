//! Microsoft Graph calendar provider
//!
//! Implements the provider port against the Graph events API.
//! Incremental sync uses the calendarView delta endpoint; the fresh
//! delta token is extracted from the `@odata.deltaLink` returned on
//! the final page.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use semestra_core::{CalendarProvider, ExternalEventPayload, RemoteChanges, RemoteEventChange};
use semestra_core::{SyncError, SyncResult};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use crate::http::HttpClient;
use crate::integrations::calendar::recurrence::to_graph_recurrence;

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Microsoft Graph implementation of the provider port.
pub struct MicrosoftCalendarProvider {
    http_client: HttpClient,
    base_url: String,
}

impl MicrosoftCalendarProvider {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client, base_url: DEFAULT_BASE_URL.to_string() }
    }

    /// Override the API base URL (for testing).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn event_body(payload: &ExternalEventPayload) -> serde_json::Value {
        let mut body = json!({
            "subject": payload.title,
            "start": { "dateTime": graph_datetime(payload.starts_at), "timeZone": "UTC" },
            "end": { "dateTime": graph_datetime(payload.ends_at), "timeZone": "UTC" },
        });
        if let Some(ref description) = payload.description {
            body["body"] = json!({ "contentType": "text", "content": description });
        }
        if let Some(ref location) = payload.location {
            body["location"] = json!({ "displayName": location });
        }
        if let Some(ref recurrence) = payload.recurrence {
            body["recurrence"] = to_graph_recurrence(recurrence, payload.starts_at);
        }
        body
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        access_token: &str,
        body: Option<serde_json::Value>,
        query: &[(&str, String)],
    ) -> SyncResult<reqwest::Response> {
        let mut builder = self
            .http_client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", access_token))
            .query(query);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = self.http_client.send(builder).await.map_err(|err| match err {
            semestra_domain::SemestraError::Network(msg) => SyncError::Network(msg),
            other => SyncError::Server(other.to_string()),
        })?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        Err(match status {
            401 | 403 => SyncError::Auth(format!("Graph rejected credentials ({})", status)),
            404 => SyncError::NotFound(format!("Graph resource not found: {}", body)),
            410 => SyncError::TokenInvalid,
            429 => SyncError::RateLimit {
                message: format!("Graph quota exhausted: {}", body),
                retry_after_secs: retry_after.or(Some(60)),
            },
            400..=499 => {
                SyncError::Client(format!("Graph rejected the request ({}): {}", status, body))
            }
            _ => SyncError::Server(format!("Graph server error ({}): {}", status, body)),
        })
    }
}

#[async_trait]
impl CalendarProvider for MicrosoftCalendarProvider {
    #[instrument(skip(self, access_token, payload), fields(calendar_id))]
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        payload: &ExternalEventPayload,
    ) -> SyncResult<String> {
        let url = format!("{}/me/calendars/{}/events", self.base_url, calendar_id);
        let response = self
            .execute(Method::POST, &url, access_token, Some(Self::event_body(payload)), &[])
            .await?;

        let created: GraphEvent = response
            .json()
            .await
            .map_err(|e| SyncError::Server(format!("malformed create response: {}", e)))?;

        debug!(external_event_id = %created.id, "created Graph event");
        Ok(created.id)
    }

    #[instrument(skip(self, access_token, payload), fields(calendar_id, external_event_id))]
    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        external_event_id: &str,
        payload: &ExternalEventPayload,
    ) -> SyncResult<()> {
        let url = format!(
            "{}/me/calendars/{}/events/{}",
            self.base_url, calendar_id, external_event_id
        );
        self.execute(Method::PATCH, &url, access_token, Some(Self::event_body(payload)), &[])
            .await?;
        Ok(())
    }

    #[instrument(skip(self, access_token), fields(calendar_id, external_event_id))]
    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        external_event_id: &str,
    ) -> SyncResult<()> {
        let url = format!(
            "{}/me/calendars/{}/events/{}",
            self.base_url, calendar_id, external_event_id
        );
        self.execute(Method::DELETE, &url, access_token, None, &[]).await?;
        Ok(())
    }

    #[instrument(skip(self, access_token, sync_token), fields(calendar_id))]
    async fn list_changes_since(
        &self,
        access_token: &str,
        calendar_id: &str,
        sync_token: Option<&str>,
    ) -> SyncResult<RemoteChanges> {
        let url = format!("{}/me/calendars/{}/calendarView/delta", self.base_url, calendar_id);

        let params: Vec<(&str, String)> = match sync_token {
            Some(token) => vec![("$deltatoken", token.to_string())],
            None => {
                let now = Utc::now();
                vec![
                    ("startDateTime", (now - chrono::Duration::days(30)).to_rfc3339()),
                    ("endDateTime", (now + chrono::Duration::days(180)).to_rfc3339()),
                ]
            }
        };

        let response = self.execute(Method::GET, &url, access_token, None, &params).await?;
        let page: GraphDeltaPage = response
            .json()
            .await
            .map_err(|e| SyncError::Server(format!("malformed delta response: {}", e)))?;

        let changes = page.value.into_iter().map(convert_remote).collect();
        let next_sync_token = page
            .delta_link
            .as_deref()
            .and_then(extract_delta_token)
            .unwrap_or_default();

        Ok(RemoteChanges { changes, next_sync_token })
    }
}

fn graph_datetime(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_default()
}

fn parse_graph_datetime(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    let has_zone = trimmed.ends_with('Z') || trimmed.contains('+');
    let candidate = if has_zone { trimmed.to_string() } else { format!("{trimmed}Z") };
    DateTime::parse_from_rfc3339(&candidate).map(|dt| dt.with_timezone(&Utc).timestamp()).ok()
}

fn extract_delta_token(delta_link: &str) -> Option<String> {
    let url = Url::parse(delta_link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "$deltatoken")
        .map(|(_, value)| value.into_owned())
}

fn convert_remote(item: GraphEvent) -> RemoteEventChange {
    RemoteEventChange {
        external_event_id: item.id,
        removed: item.removed.is_some(),
        title: item.subject,
        starts_at: item.start.and_then(|t| parse_graph_datetime(&t.date_time)),
        ends_at: item.end.and_then(|t| parse_graph_datetime(&t.date_time)),
        location: item.location.and_then(|l| l.display_name),
        modified_at: item
            .last_modified
            .as_deref()
            .and_then(parse_graph_datetime)
            .unwrap_or(0),
    }
}

#[derive(Debug, Deserialize)]
struct GraphEvent {
    id: String,
    #[serde(rename = "@removed", default)]
    removed: Option<serde_json::Value>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    start: Option<GraphDateTime>,
    #[serde(default)]
    end: Option<GraphDateTime>,
    #[serde(default)]
    location: Option<GraphLocation>,
    #[serde(rename = "lastModifiedDateTime", default)]
    last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphDateTime {
    #[serde(rename = "dateTime")]
    date_time: String,
}

#[derive(Debug, Deserialize)]
struct GraphLocation {
    #[serde(rename = "displayName", default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphDeltaPage {
    #[serde(default)]
    value: Vec<GraphEvent>,
    #[serde(rename = "@odata.deltaLink", default)]
    delta_link: Option<String>,
}
