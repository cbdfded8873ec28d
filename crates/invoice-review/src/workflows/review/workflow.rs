use std::sync::Arc;

use super::domain::{InvoiceSubmission, Membership, SubmissionId, UserId};
use super::export::{ExportCredentialStore, ExportService, ExportSink};
use super::files::InvoiceFileStore;
use super::repository::{MembershipDirectory, StoreError, SubmissionStore};
use super::service::ReviewService;
use super::submission::SubmissionService;

/// The three review services wired against one store and directory.
pub struct ReviewWorkflow<S, D> {
    pub reviews: ReviewService<S, D>,
    pub submissions: SubmissionService<S, D>,
    pub exports: ExportService<S, D>,
    store: Arc<S>,
    directory: Arc<D>,
}

/// External collaborators of the workflow besides the store.
pub struct WorkflowAdapters {
    pub files: Arc<dyn InvoiceFileStore>,
    pub credentials: Arc<dyn ExportCredentialStore>,
    pub sink: Arc<dyn ExportSink>,
    pub export_fields: Option<Vec<String>>,
}

impl<S, D> ReviewWorkflow<S, D>
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, adapters: WorkflowAdapters) -> Self {
        Self {
            reviews: ReviewService::new(store.clone(), directory.clone()),
            submissions: SubmissionService::new(store.clone(), directory.clone(), adapters.files),
            exports: ExportService::new(
                store.clone(),
                directory.clone(),
                adapters.credentials,
                adapters.sink,
                adapters.export_fields,
            ),
            store,
            directory,
        }
    }

    /// Resolve a submission together with the actor's active membership in its
    /// organization. Outsiders get `NotFound` so existence is not revealed.
    pub fn access(
        &self,
        id: SubmissionId,
        actor: &UserId,
    ) -> Result<(InvoiceSubmission, Membership), AccessError> {
        let record = self.store.fetch(id)?.ok_or(AccessError::NotFound)?;
        let membership = self
            .directory
            .membership(&record.submission.organization, actor)?
            .filter(|membership| membership.active)
            .ok_or(AccessError::NotFound)?;
        Ok((record.submission, membership))
    }

    /// Like [`access`](Self::access) but the actor must be an organization admin.
    pub fn admin_access(
        &self,
        id: SubmissionId,
        actor: &UserId,
    ) -> Result<InvoiceSubmission, AccessError> {
        let (submission, membership) = self.access(id, actor)?;
        if !membership.is_active_admin() {
            return Err(AccessError::AdminRequired);
        }
        Ok(submission)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("submission not found")]
    NotFound,
    #[error("admin access required")]
    AdminRequired,
    #[error(transparent)]
    Store(#[from] StoreError),
}
