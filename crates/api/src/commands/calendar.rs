//! Calendar integration commands

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use semestra_core::{IntegrationRepository, SyncError, SyncPassSummary};
use semestra_domain::{
    CalendarIntegration, CalendarProviderKind, Result, SemestraError, SyncDirection,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::context::AppContext;
use crate::logging::log_command_execution;

/// Link a user to an external calendar. The access credential comes
/// from the authentication collaborator alongside the request.
#[instrument(skip(context, access_token))]
pub async fn connect_calendar(
    context: &Arc<AppContext>,
    user_id: &str,
    provider: &str,
    calendar_id: &str,
    sync_direction: &str,
    access_token: &str,
) -> Result<String> {
    let started = Instant::now();

    let provider = CalendarProviderKind::parse(provider).ok_or_else(|| {
        SemestraError::Validation(format!("unknown calendar provider '{}'", provider))
    })?;
    let sync_direction = SyncDirection::parse(sync_direction).ok_or_else(|| {
        SemestraError::Validation(format!("unknown sync direction '{}'", sync_direction))
    })?;

    let now = Utc::now().timestamp();
    let integration = CalendarIntegration {
        id: Uuid::now_v7().to_string(),
        user_id: user_id.to_string(),
        provider,
        calendar_id: calendar_id.to_string(),
        sync_direction,
        last_sync_token: None,
        sync_enabled: true,
        created_at: now,
        updated_at: now,
    };

    let result = context.integrations.create_integration(&integration);
    log_command_execution("calendar::connect_calendar", started.elapsed(), result.is_ok());
    result?;

    context.credentials.set_token(&integration.id, access_token);

    info!(
        integration_id = %integration.id,
        user_id,
        provider = provider.as_str(),
        "calendar integration connected"
    );
    Ok(integration.id)
}

/// Run one sync pass for an integration immediately.
#[instrument(skip(context))]
pub async fn run_calendar_sync(
    context: &Arc<AppContext>,
    integration_id: &str,
) -> Result<SyncPassSummary> {
    let started = Instant::now();
    let result = context.sync_engine.sync_pass(integration_id).await;
    log_command_execution("calendar::run_calendar_sync", started.elapsed(), result.is_ok());
    result.map_err(sync_to_domain)
}

/// Toggle scheduled sync for an integration. Re-enabling after an
/// authentication failure requires a fresh credential first.
#[instrument(skip(context))]
pub async fn set_calendar_sync_enabled(
    context: &Arc<AppContext>,
    integration_id: &str,
    enabled: bool,
) -> Result<()> {
    let started = Instant::now();
    let result = context.integrations.set_sync_enabled(integration_id, enabled).await;
    log_command_execution("calendar::set_sync_enabled", started.elapsed(), result.is_ok());
    result
}

fn sync_to_domain(err: SyncError) -> SemestraError {
    match err {
        SyncError::Auth(message) => SemestraError::Auth(message),
        SyncError::RateLimit { message, retry_after_secs } => {
            SemestraError::ServiceUnavailable { message, retry_after_secs }
        }
        SyncError::Database(message) => SemestraError::Database(message),
        SyncError::NotFound(message) => SemestraError::NotFound(message),
        SyncError::Config(message) => SemestraError::Config(message),
        other => SemestraError::Network(other.to_string()),
    }
}
