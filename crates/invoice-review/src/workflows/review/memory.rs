use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use super::domain::{InvoiceSubmission, Membership, OrganizationId, SubmissionId, UserId, UserRef};
use super::record::{NewSubmission, SubmissionRecord};
use super::repository::{MembershipDirectory, StoreError, SubmissionStore};

type SharedRecord = Arc<Mutex<SubmissionRecord>>;

/// Process-local store. Each submission sits behind its own mutex so workflow
/// updates on one submission serialise while different submissions proceed in
/// parallel.
#[derive(Default)]
pub struct MemoryStore {
    submissions: Mutex<HashMap<SubmissionId, SharedRecord>>,
    memberships: Mutex<Vec<Membership>>,
    sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a user's membership in an organization.
    pub fn add_membership(&self, membership: Membership) -> Result<(), StoreError> {
        let mut memberships = lock(&self.memberships)?;
        memberships.retain(|existing| {
            existing.organization != membership.organization
                || existing.user.id != membership.user.id
        });
        memberships.push(membership);
        Ok(())
    }

    fn shared(&self, id: SubmissionId) -> Result<Option<SharedRecord>, StoreError> {
        Ok(lock(&self.submissions)?.get(&id).cloned())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
}

impl SubmissionStore for MemoryStore {
    fn insert(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let id = SubmissionId(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        let record = submission.into_record(id, Utc::now());
        lock(&self.submissions)?.insert(id, Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    fn fetch(&self, id: SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        match self.shared(id)? {
            Some(shared) => Ok(Some(lock(&shared)?.clone())),
            None => Ok(None),
        }
    }

    fn update<T, E, F>(&self, id: SubmissionId, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut SubmissionRecord) -> Result<T, E>,
        E: From<StoreError>,
    {
        let shared = self.shared(id)?.ok_or(StoreError::NotFound)?;
        let mut guard = lock(&shared)?;
        let mut working = guard.clone();
        let value = apply(&mut working)?;
        *guard = working;
        Ok(value)
    }

    fn delete_if<E, F>(&self, id: SubmissionId, allow: F) -> Result<SubmissionRecord, E>
    where
        F: FnOnce(&SubmissionRecord) -> Result<(), E>,
        E: From<StoreError>,
    {
        // Map before record, the only place both are held.
        let mut submissions = lock(&self.submissions)?;
        let shared = submissions.get(&id).cloned().ok_or(StoreError::NotFound)?;
        let record = lock(&shared)?;
        allow(&record)?;
        submissions.remove(&id);
        Ok(record.clone())
    }

    fn list_for_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<InvoiceSubmission>, StoreError> {
        let shared: Vec<SharedRecord> = lock(&self.submissions)?.values().cloned().collect();
        let mut submissions = Vec::new();
        for record in shared {
            let record = lock(&record)?;
            if &record.submission.organization == organization {
                submissions.push(record.submission.clone());
            }
        }
        submissions.sort_by_key(|submission| submission.id);
        Ok(submissions)
    }
}

impl MembershipDirectory for MemoryStore {
    fn membership(
        &self,
        organization: &OrganizationId,
        user: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(lock(&self.memberships)?
            .iter()
            .find(|membership| {
                &membership.organization == organization && &membership.user.id == user
            })
            .cloned())
    }

    fn active_admins(
        &self,
        organization: &OrganizationId,
        users: &[UserId],
    ) -> Result<Vec<UserRef>, StoreError> {
        Ok(lock(&self.memberships)?
            .iter()
            .filter(|membership| {
                &membership.organization == organization
                    && membership.is_active_admin()
                    && users.contains(&membership.user.id)
            })
            .map(|membership| membership.user.clone())
            .collect())
    }
}
