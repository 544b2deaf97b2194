//! Credential adapter for the authentication collaborator
//!
//! Token issuance and refresh live outside this system; this adapter
//! hands the sync engine whatever credential the collaborator supplied
//! per integration, and signals re-authorization with an auth error
//! when none is available.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use semestra_core::{CredentialProvider, SyncError, SyncResult};
use semestra_domain::CalendarIntegration;

/// In-process credential store fed by the external auth collaborator.
#[derive(Default)]
pub struct StaticCredentialProvider {
    tokens: RwLock<HashMap<String, String>>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the access credential for an integration.
    pub fn set_token(&self, integration_id: &str, token: impl Into<String>) {
        self.tokens.write().insert(integration_id.to_string(), token.into());
    }

    /// Drop an integration's credential, e.g. after revocation.
    pub fn clear_token(&self, integration_id: &str) {
        self.tokens.write().remove(integration_id);
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn access_token(&self, integration: &CalendarIntegration) -> SyncResult<String> {
        self.tokens.read().get(&integration.id).cloned().ok_or_else(|| {
            SyncError::Auth(format!(
                "no credential for integration {}; re-authorization required",
                integration.id
            ))
        })
    }
}
