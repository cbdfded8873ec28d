use std::slice;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::domain::{
    AssignmentStatus, InvoiceSubmission, ReviewAction, ReviewAssignment, SubmissionId,
    SubmissionStatus, UserId,
};
use super::payload::ReviewPayload;
use super::record::SubmissionRecord;
use super::repository::{MembershipDirectory, StoreError, SubmissionStore};

/// Submission state after a review operation, with the payload for the acting user.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub submission: InvoiceSubmission,
    pub review: ReviewPayload,
}

impl ReviewOutcome {
    pub fn snapshot(record: &SubmissionRecord, viewer: &UserId) -> Self {
        Self {
            submission: record.submission.clone(),
            review: ReviewPayload::build(record, viewer),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewerAdded {
    #[serde(flatten)]
    pub outcome: ReviewOutcome,
    pub created: bool,
}

/// Reviewer decisions and reviewer management. Every mutation runs inside
/// [`SubmissionStore::update`], so the "all assignments approved" check and the
/// status transition it drives happen under one lock.
pub struct ReviewService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
}

impl<S, D> ReviewService<S, D>
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>) -> Self {
        Self { store, directory }
    }

    /// Record the reviewer's approval and promote the submission once every
    /// assignment is approved. Without assignments the submission is approved
    /// directly.
    pub fn approve(
        &self,
        id: SubmissionId,
        reviewer: &UserId,
    ) -> Result<ReviewOutcome, ReviewError> {
        let (outcome, promoted) = self.store.update::<_, ReviewError, _>(id, |record| {
            let now = Utc::now();
            if record.has_assignments() {
                let assignment = pending_or_same(record, reviewer, ReviewAction::Approve)?;
                if assignment.status != AssignmentStatus::Approved {
                    assignment.status = AssignmentStatus::Approved;
                    assignment.updated_at = now;
                }
                let promoted =
                    record.all_approved() && record.submission.status != SubmissionStatus::Approved;
                if promoted {
                    record.transition(SubmissionStatus::Approved, Some(reviewer.clone()), now);
                }
                Ok((ReviewOutcome::snapshot(record, reviewer), promoted))
            } else {
                record.transition(SubmissionStatus::Approved, Some(reviewer.clone()), now);
                Ok((ReviewOutcome::snapshot(record, reviewer), true))
            }
        })?;

        info!(
            submission_id = %id,
            reviewer = %reviewer,
            status = outcome.submission.status.label(),
            promoted,
            "submission approved"
        );
        Ok(outcome)
    }

    pub fn reject(&self, id: SubmissionId, reviewer: &UserId) -> Result<ReviewOutcome, ReviewError> {
        let outcome = self.close(id, reviewer, ReviewAction::Reject, None)?;
        info!(submission_id = %id, reviewer = %reviewer, "submission rejected");
        Ok(outcome)
    }

    /// Send the submission back to its submitter. The comment is mandatory and is
    /// stored as an admin-authored note.
    pub fn request_changes(
        &self,
        id: SubmissionId,
        reviewer: &UserId,
        comment: &str,
    ) -> Result<ReviewOutcome, ReviewError> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(ReviewError::MissingComment);
        }
        let outcome = self.close(id, reviewer, ReviewAction::RequestChanges, Some(comment))?;
        info!(submission_id = %id, reviewer = %reviewer, "changes requested");
        Ok(outcome)
    }

    /// Assign another admin of the submission's organization. Adding a new
    /// reviewer to an approved submission reopens it; re-adding an existing
    /// reviewer changes nothing.
    pub fn add_reviewer(
        &self,
        id: SubmissionId,
        reviewer_id: &UserId,
        assigned_by: &UserId,
    ) -> Result<ReviewerAdded, ReviewError> {
        if reviewer_id == assigned_by {
            return Err(ReviewError::SelfAssignment);
        }

        let organization = self
            .store
            .fetch(id)?
            .ok_or(StoreError::NotFound)?
            .submission
            .organization;
        let reviewer = self
            .directory
            .active_admins(&organization, slice::from_ref(reviewer_id))?
            .into_iter()
            .next()
            .ok_or(ReviewError::InvalidReviewer)?;

        let added = self.store.update(id, |record| {
            let now = Utc::now();
            let created = record.add_assignment(reviewer, Some(assigned_by.clone()), now);
            if created && record.submission.status == SubmissionStatus::Approved {
                record.transition(SubmissionStatus::Pending, None, now);
                record.submission.clear_export();
                info!(
                    submission_id = %id,
                    reviewer = %reviewer_id,
                    "submission reopened after adding reviewer"
                );
            }
            Ok::<_, ReviewError>(ReviewerAdded {
                outcome: ReviewOutcome::snapshot(record, assigned_by),
                created,
            })
        })?;

        info!(
            submission_id = %id,
            reviewer = %reviewer_id,
            created = added.created,
            "reviewer added"
        );
        Ok(added)
    }

    /// Current state as seen by `viewer`, without touching the store.
    pub fn review_payload(
        &self,
        id: SubmissionId,
        viewer: &UserId,
    ) -> Result<ReviewOutcome, ReviewError> {
        let record = self.store.fetch(id)?.ok_or(StoreError::NotFound)?;
        Ok(ReviewOutcome::snapshot(&record, viewer))
    }

    /// Shared path of reject and request-changes. A reviewer repeating their own
    /// decision gets the current state back unchanged.
    fn close(
        &self,
        id: SubmissionId,
        reviewer: &UserId,
        action: ReviewAction,
        comment: Option<&str>,
    ) -> Result<ReviewOutcome, ReviewError> {
        self.store.update::<_, ReviewError, _>(id, |record| {
            let now = Utc::now();
            if record.has_assignments() {
                let assignment = pending_or_same(record, reviewer, action)?;
                if assignment.status == action.assignment_status() {
                    return Ok(ReviewOutcome::snapshot(record, reviewer));
                }
                assignment.status = action.assignment_status();
                assignment.updated_at = now;
            }

            record.transition(action.submission_status(), Some(reviewer.clone()), now);
            record.submission.clear_export();
            if let Some(message) = comment {
                record.push_comment(Some(reviewer.clone()), message, true, now);
            }
            Ok(ReviewOutcome::snapshot(record, reviewer))
        })
    }
}

fn pending_or_same<'a>(
    record: &'a mut SubmissionRecord,
    reviewer: &UserId,
    action: ReviewAction,
) -> Result<&'a mut ReviewAssignment, ReviewError> {
    let assignment = record
        .assignment_mut(reviewer)
        .ok_or(ReviewError::NotAssigned)?;
    if action.conflicts_with(assignment.status) {
        return Err(ReviewError::InvalidAction {
            action,
            current: assignment.status,
        });
    }
    Ok(assignment)
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("reviewer access required")]
    NotAssigned,
    #[error("cannot {} a review that is already {}", .action.label(), .current.label())]
    InvalidAction {
        action: ReviewAction,
        current: AssignmentStatus,
    },
    #[error("you cannot assign yourself as a reviewer")]
    SelfAssignment,
    #[error("reviewer must be an active admin in this organization")]
    InvalidReviewer,
    #[error("a comment is required when requesting changes")]
    MissingComment,
    #[error(transparent)]
    Store(#[from] StoreError),
}
