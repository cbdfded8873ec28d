use serde::Serialize;

use super::domain::{AssignmentStatus, SubmissionStatus, UserId};
use super::record::SubmissionRecord;

/// Workflow state as seen by one viewer. Every response that surfaces review state
/// carries this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewPayload {
    pub reviewers: Vec<ReviewerEntry>,
    pub review_summary: ReviewSummary,
    pub reviewer_status: Option<AssignmentStatus>,
    pub can_export: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewerEntry {
    pub id: UserId,
    pub email: String,
    pub status: AssignmentStatus,
    pub is_current_user: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub total: usize,
    pub approved: usize,
    pub pending: usize,
    pub declined: usize,
    pub changes_requested: usize,
}

impl ReviewPayload {
    pub fn build(record: &SubmissionRecord, viewer: &UserId) -> Self {
        let mut assignments: Vec<_> = record.assignments.iter().collect();
        assignments.sort_by_key(|assignment| assignment.created_at);

        let mut summary = ReviewSummary {
            total: assignments.len(),
            ..ReviewSummary::default()
        };
        let reviewers = assignments
            .iter()
            .map(|assignment| {
                match assignment.status {
                    AssignmentStatus::Pending => summary.pending += 1,
                    AssignmentStatus::Approved => summary.approved += 1,
                    AssignmentStatus::Declined => summary.declined += 1,
                    AssignmentStatus::ChangesRequested => summary.changes_requested += 1,
                }
                ReviewerEntry {
                    id: assignment.reviewer.id.clone(),
                    email: assignment.reviewer.email.clone(),
                    status: assignment.status,
                    is_current_user: &assignment.reviewer.id == viewer,
                }
            })
            .collect();

        let reviewer_status = record.assignment(viewer).map(|assignment| assignment.status);

        Self {
            reviewers,
            review_summary: summary,
            reviewer_status,
            can_export: can_export(record, reviewer_status),
        }
    }
}

/// Export gate. With assignments the viewer must hold an approved one; without
/// assignments any viewer passes and permission is enforced at export time.
pub fn can_export(record: &SubmissionRecord, reviewer_status: Option<AssignmentStatus>) -> bool {
    let submission = &record.submission;
    let open = !submission.is_exported() && submission.status == SubmissionStatus::Approved;
    if record.has_assignments() {
        open && reviewer_status == Some(AssignmentStatus::Approved)
    } else {
        open
    }
}
