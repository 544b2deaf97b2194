//! Calendar integration and sync mapping model

use serde::{Deserialize, Serialize};

/// Supported external calendar providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarProviderKind {
    Google,
    Microsoft,
}

impl CalendarProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "microsoft" => Some(Self::Microsoft),
            _ => None,
        }
    }
}

/// Which way synchronization flows for an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ToExternal,
    FromExternal,
    Bidirectional,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToExternal => "to_external",
            Self::FromExternal => "from_external",
            Self::Bidirectional => "bidirectional",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "to_external" => Some(Self::ToExternal),
            "from_external" => Some(Self::FromExternal),
            "bidirectional" => Some(Self::Bidirectional),
            _ => None,
        }
    }

    /// Local edits are pushed outward.
    pub fn pushes(&self) -> bool {
        matches!(self, Self::ToExternal | Self::Bidirectional)
    }

    /// Remote edits are pulled inward.
    pub fn pulls(&self) -> bool {
        matches!(self, Self::FromExternal | Self::Bidirectional)
    }
}

/// A user's link to one external calendar. One user may hold several
/// integrations, one per calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarIntegration {
    pub id: String,
    pub user_id: String,
    pub provider: CalendarProviderKind,
    /// Provider-side calendar identifier
    pub calendar_id: String,
    pub sync_direction: SyncDirection,
    pub last_sync_token: Option<String>,
    pub sync_enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Sync state of one mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSyncStatus {
    Synced,
    Pending,
    Conflict,
    Error,
}

impl MappingSyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "synced" => Some(Self::Synced),
            "pending" => Some(Self::Pending),
            "conflict" => Some(Self::Conflict),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Which side of a conflict prevailed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictWinner {
    Local,
    Remote,
}

/// A resolved conflict, retained for visibility. The losing side's
/// payload is never silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub local_modified_at: i64,
    pub remote_modified_at: i64,
    pub winner: ConflictWinner,
    /// Serialized form of the discarded edit
    pub discarded_payload_json: String,
    pub recorded_at: i64,
}

/// One-to-one link between a course event and its external
/// representation. At most one mapping per (course_event, integration)
/// pair; enforced by a uniqueness constraint in the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEventMapping {
    pub id: String,
    pub course_event_id: String,
    pub integration_id: String,
    pub external_event_id: String,
    pub sync_status: MappingSyncStatus,
    pub last_synced_at: Option<i64>,
    pub last_error: Option<String>,
    #[serde(default)]
    pub conflict_log: Vec<ConflictRecord>,
}
