use invoice_review::error::AppError;
use invoice_review::workflows::intake::IntakePipeline;
use invoice_review::workflows::review::{
    MemoryCredentialStore, Membership, MembershipRole, OrganizationId, UserId, UserRef,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) intake: Arc<IntakePipeline>,
}

/// Organization memberships and export connections loaded at startup.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SeedData {
    #[serde(default)]
    pub(crate) memberships: Vec<SeedMembership>,
    #[serde(default)]
    pub(crate) export_connections: Vec<SeedConnection>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SeedMembership {
    pub(crate) organization_id: String,
    pub(crate) user_id: String,
    pub(crate) email: String,
    pub(crate) role: MembershipRole,
    #[serde(default = "default_active")]
    pub(crate) active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SeedConnection {
    pub(crate) user_id: String,
    pub(crate) account: String,
}

fn default_active() -> bool {
    true
}

impl SeedMembership {
    pub(crate) fn to_membership(&self) -> Membership {
        Membership {
            organization: OrganizationId(self.organization_id.clone()),
            user: UserRef::new(self.user_id.clone(), self.email.clone()),
            role: self.role,
            active: self.active,
        }
    }
}

impl SeedData {
    pub(crate) fn memberships(&self) -> impl Iterator<Item = Membership> + '_ {
        self.memberships.iter().map(SeedMembership::to_membership)
    }

    pub(crate) fn credentials(&self) -> Arc<MemoryCredentialStore> {
        let credentials = MemoryCredentialStore::default();
        for connection in &self.export_connections {
            credentials.connect(UserId(connection.user_id.clone()), connection.account.clone());
        }
        Arc::new(credentials)
    }
}

pub(crate) fn load_seed(path: Option<&Path>) -> Result<SeedData, AppError> {
    let Some(path) = path else {
        return Ok(SeedData::default());
    };
    let raw = fs::read_to_string(path)?;
    let seed: SeedData = serde_json::from_str(&raw)?;
    info!(
        path = %path.display(),
        memberships = seed.memberships.len(),
        export_connections = seed.export_connections.len(),
        "seed data loaded"
    );
    Ok(seed)
}
