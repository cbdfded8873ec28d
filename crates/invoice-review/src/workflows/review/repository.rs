use super::domain::{
    InvoiceSubmission, Membership, OrganizationId, SubmissionId, UserId, UserRef,
};
use super::record::{NewSubmission, SubmissionRecord};

/// Persistence for submissions and the assignment and comment rows they own.
pub trait SubmissionStore: Send + Sync {
    fn insert(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError>;

    fn fetch(&self, id: SubmissionId) -> Result<Option<SubmissionRecord>, StoreError>;

    /// Run `apply` against the record while holding the submission's lock.
    ///
    /// Concurrent updates of one submission are linearised. The record is written
    /// back only when `apply` returns `Ok`; an `Err` leaves the stored state as it was.
    fn update<T, E, F>(&self, id: SubmissionId, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubmissionRecord) -> Result<T, E>,
        E: From<StoreError>;

    /// Remove the submission with its assignments and comments when `allow`
    /// accepts the current record. The check and the removal happen under the
    /// submission's lock; the removed record is returned.
    fn delete_if<E, F>(&self, id: SubmissionId, allow: F) -> Result<SubmissionRecord, E>
    where
        F: FnOnce(&SubmissionRecord) -> Result<(), E>,
        E: From<StoreError>;

    fn list_for_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<InvoiceSubmission>, StoreError>;
}

/// Read access to organization memberships.
pub trait MembershipDirectory: Send + Sync {
    fn membership(
        &self,
        organization: &OrganizationId,
        user: &UserId,
    ) -> Result<Option<Membership>, StoreError>;

    /// Those of `users` who are active admins of the organization.
    fn active_admins(
        &self,
        organization: &OrganizationId,
        users: &[UserId],
    ) -> Result<Vec<UserRef>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("submission not found")]
    NotFound,
    #[error("submission is locked by another operation; retry")]
    Contention,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention)
    }
}
