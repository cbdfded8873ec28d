use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AssignmentStatus, FileRef, InvoiceData, InvoiceSubmission, OrganizationId, ReviewAssignment,
    SubmissionComment, SubmissionId, SubmissionStatus, UserId, UserRef,
};

/// A submission together with the rows it owns. This is the unit the store locks,
/// hands to a workflow closure and writes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub submission: InvoiceSubmission,
    pub assignments: Vec<ReviewAssignment>,
    pub comments: Vec<SubmissionComment>,
}

impl SubmissionRecord {
    pub fn assignment(&self, reviewer: &UserId) -> Option<&ReviewAssignment> {
        self.assignments
            .iter()
            .find(|assignment| &assignment.reviewer.id == reviewer)
    }

    pub fn assignment_mut(&mut self, reviewer: &UserId) -> Option<&mut ReviewAssignment> {
        self.assignments
            .iter_mut()
            .find(|assignment| &assignment.reviewer.id == reviewer)
    }

    pub fn has_assignments(&self) -> bool {
        !self.assignments.is_empty()
    }

    /// True only when at least one assignment exists and every one is approved.
    pub fn all_approved(&self) -> bool {
        self.has_assignments()
            && self
                .assignments
                .iter()
                .all(|assignment| assignment.status == AssignmentStatus::Approved)
    }

    /// Get-or-create the reviewer's assignment. Returns whether a row was created.
    pub fn add_assignment(
        &mut self,
        reviewer: UserRef,
        assigned_by: Option<UserId>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.assignment(&reviewer.id).is_some() {
            return false;
        }
        self.assignments.push(ReviewAssignment {
            reviewer,
            assigned_by,
            status: AssignmentStatus::Pending,
            created_at: now,
            updated_at: now,
        });
        true
    }

    /// Put every assignment back to pending regardless of its current decision.
    pub fn reset_assignments(&mut self, now: DateTime<Utc>) {
        for assignment in &mut self.assignments {
            assignment.status = AssignmentStatus::Pending;
            assignment.updated_at = now;
        }
    }

    /// Move the submission to `status`, recording the reviewer and timestamp.
    pub fn transition(
        &mut self,
        status: SubmissionStatus,
        reviewed_by: Option<UserId>,
        now: DateTime<Utc>,
    ) {
        self.submission.status = status;
        self.submission.reviewed_by = reviewed_by;
        self.submission.updated_at = now;
    }

    pub fn push_comment(
        &mut self,
        author: Option<UserId>,
        message: impl Into<String>,
        author_is_admin: bool,
        now: DateTime<Utc>,
    ) {
        self.comments.push(SubmissionComment {
            author,
            message: message.into(),
            author_is_admin,
            created_at: now,
        });
    }
}

/// Everything the store needs to create a submission and its initial assignments.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub organization: OrganizationId,
    pub submitted_by: UserRef,
    pub invoice_data: InvoiceData,
    pub invoice_file: Option<FileRef>,
    pub reviewers: Vec<UserRef>,
}

impl NewSubmission {
    /// Materialise the record a store persists for this submission.
    pub fn into_record(self, id: SubmissionId, now: DateTime<Utc>) -> SubmissionRecord {
        let assigned_by = Some(self.submitted_by.id.clone());
        let mut record = SubmissionRecord {
            submission: InvoiceSubmission {
                id,
                organization: self.organization,
                submitted_by: self.submitted_by,
                status: SubmissionStatus::Pending,
                invoice_data: self.invoice_data,
                invoice_file: self.invoice_file,
                reviewed_by: None,
                exported_at: None,
                exported_by: None,
                created_at: now,
                updated_at: now,
            },
            assignments: Vec::new(),
            comments: Vec::new(),
        };
        for reviewer in self.reviewers {
            record.add_assignment(reviewer, assigned_by.clone(), now);
        }
        record
    }
}
