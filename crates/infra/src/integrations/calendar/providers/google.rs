//! Google Calendar provider
//!
//! Events API client implementing the provider port. Incremental sync
//! uses Google's `syncToken`; a 410 GONE response signals token
//! invalidation and maps to `TokenInvalid` so the engine clears it and
//! performs a full window fetch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use semestra_core::{CalendarProvider, ExternalEventPayload, RemoteChanges, RemoteEventChange};
use semestra_core::{SyncError, SyncResult};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::http::HttpClient;
use crate::integrations::calendar::recurrence::to_rrule;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Lookback/lookahead window for full fetches, in hours.
const FULL_FETCH_LOOKBACK_HOURS: i64 = 24 * 30;
const FULL_FETCH_LOOKAHEAD_HOURS: i64 = 24 * 180;

/// Google Calendar implementation of the provider port.
pub struct GoogleCalendarProvider {
    http_client: HttpClient,
    base_url: String,
}

impl GoogleCalendarProvider {
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
            "summary": payload.title,
            "start": { "dateTime": rfc3339(payload.starts_at) },
            "end": { "dateTime": rfc3339(payload.ends_at) },
        });
        if let Some(ref description) = payload.description {
            body["description"] = json!(description);
        }
        if let Some(ref location) = payload.location {
            body["location"] = json!(location);
        }
        if let Some(ref recurrence) = payload.recurrence {
            body["recurrence"] = json!([to_rrule(recurrence)]);
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
            401 | 403 => SyncError::Auth(format!("Google rejected credentials ({})", status)),
            404 => SyncError::NotFound(format!("Google resource not found: {}", body)),
            410 => SyncError::TokenInvalid,
            429 => SyncError::RateLimit {
                message: format!("Google quota exhausted: {}", body),
                retry_after_secs: retry_after.or(Some(60)),
            },
            400..=499 => SyncError::Client(format!("Google rejected the request ({}): {}", status, body)),
            _ => SyncError::Server(format!("Google server error ({}): {}", status, body)),
        })
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    #[instrument(skip(self, access_token, payload), fields(calendar_id))]
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        payload: &ExternalEventPayload,
    ) -> SyncResult<String> {
        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);
        let response = self
            .execute(Method::POST, &url, access_token, Some(Self::event_body(payload)), &[])
            .await?;

        let created: GoogleEvent = response
            .json()
            .await
            .map_err(|e| SyncError::Server(format!("malformed create response: {}", e)))?;

        debug!(external_event_id = %created.id, "created Google event");
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
        let url =
            format!("{}/calendars/{}/events/{}", self.base_url, calendar_id, external_event_id);
        self.execute(Method::PUT, &url, access_token, Some(Self::event_body(payload)), &[])
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
        let url =
            format!("{}/calendars/{}/events/{}", self.base_url, calendar_id, external_event_id);
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
        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);

        let base_params: Vec<(&str, String)> = match sync_token {
            Some(token) => vec![("syncToken", token.to_string())],
            None => {
                let now = Utc::now();
                vec![
                    (
                        "timeMin",
                        (now - chrono::Duration::hours(FULL_FETCH_LOOKBACK_HOURS)).to_rfc3339(),
                    ),
                    (
                        "timeMax",
                        (now + chrono::Duration::hours(FULL_FETCH_LOOKAHEAD_HOURS)).to_rfc3339(),
                    ),
                ]
            }
        };

        let mut changes = Vec::new();
        let mut next_sync_token = None;
        let mut page_token: Option<String> = None;

        loop {
            let mut params = base_params.clone();
            if let Some(ref token) = page_token {
                params.push(("pageToken", token.clone()));
            }

            let response = self.execute(Method::GET, &url, access_token, None, &params).await?;
            let page: GoogleEventsPage = response
                .json()
                .await
                .map_err(|e| SyncError::Server(format!("malformed list response: {}", e)))?;

            for item in page.items {
                if item.updated.is_none() {
                    warn!(event_id = %item.id, "Google event missing updated timestamp");
                }
                changes.push(convert_remote(item));
            }

            next_sync_token = page.next_sync_token.or(next_sync_token);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(RemoteChanges {
            changes,
            next_sync_token: next_sync_token.unwrap_or_default(),
        })
    }
}

fn rfc3339(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

fn parse_rfc3339(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc).timestamp()).ok()
}

fn convert_remote(item: GoogleEvent) -> RemoteEventChange {
    let removed = item.status.as_deref() == Some("cancelled");
    let modified_at = item.updated.as_deref().and_then(parse_rfc3339).unwrap_or(0);

    RemoteEventChange {
        external_event_id: item.id,
        removed,
        title: item.summary,
        starts_at: item.start.and_then(|t| t.date_time.as_deref().and_then(parse_rfc3339)),
        ends_at: item.end.and_then(|t| t.date_time.as_deref().and_then(parse_rfc3339)),
        location: item.location,
        modified_at,
    }
}

#[derive(Debug, Deserialize)]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start: Option<GoogleEventTime>,
    #[serde(default)]
    end: Option<GoogleEventTime>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventTime {
    #[serde(rename = "dateTime", default)]
    date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventsPage {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    #[serde(rename = "nextPageToken", default)]
    next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken", default)]
    next_sync_token: Option<String>,
}
