use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Persisted field map of a submission, including the computed `scenario` key.
pub type InvoiceData = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub email: String,
}

impl UserRef {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    Admin,
    Member,
}

impl MembershipRole {
    pub fn label(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }
}

/// A user's standing within one organization. Managed outside this crate; the
/// review workflow only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub organization: OrganizationId,
    pub user: UserRef,
    pub role: MembershipRole,
    pub active: bool,
}

impl Membership {
    pub fn is_active_admin(&self) -> bool {
        self.active && self.role == MembershipRole::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    ChangesRequested,
}

impl SubmissionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::ChangesRequested => "changes_requested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "changes_requested" => Some(Self::ChangesRequested),
            _ => None,
        }
    }

    /// Statuses in which the submitter may still withdraw the invoice.
    pub fn is_deletable(self) -> bool {
        matches!(self, Self::Pending | Self::ChangesRequested)
    }

    /// Statuses in which the submitter may send corrected data.
    pub fn accepts_resubmission(self) -> bool {
        matches!(self, Self::Pending | Self::ChangesRequested)
    }

    /// Reviewers can be added while review is open or after full approval.
    pub fn accepts_new_reviewers(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    /// Whether an HTTP caller may invoke `action` while the submission is in this
    /// status. Approve is also accepted on an approved submission so that a late
    /// reviewer can still record their own approval.
    pub fn accepts(self, action: ReviewAction) -> bool {
        match action {
            ReviewAction::Approve => matches!(self, Self::Pending | Self::Approved),
            ReviewAction::Reject | ReviewAction::RequestChanges => self == Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Approved,
    Declined,
    ChangesRequested,
}

impl AssignmentStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
            Self::ChangesRequested => "changes_requested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "declined" => Some(Self::Declined),
            "changes_requested" => Some(Self::ChangesRequested),
            _ => None,
        }
    }
}

/// The three reviewer decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    RequestChanges,
}

impl ReviewAction {
    pub fn label(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::RequestChanges => "request_changes",
        }
    }

    /// Assignment status this decision moves a pending reviewer to.
    pub fn assignment_status(self) -> AssignmentStatus {
        match self {
            Self::Approve => AssignmentStatus::Approved,
            Self::Reject => AssignmentStatus::Declined,
            Self::RequestChanges => AssignmentStatus::ChangesRequested,
        }
    }

    pub fn submission_status(self) -> SubmissionStatus {
        match self {
            Self::Approve => SubmissionStatus::Approved,
            Self::Reject => SubmissionStatus::Rejected,
            Self::RequestChanges => SubmissionStatus::ChangesRequested,
        }
    }

    /// A reviewer who already left `pending` for a different decision cannot
    /// switch; repeating the same decision is allowed.
    pub fn conflicts_with(self, current: AssignmentStatus) -> bool {
        current != AssignmentStatus::Pending && current != self.assignment_status()
    }
}

/// Opaque reference to a stored invoice file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub String);

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSubmission {
    pub id: SubmissionId,
    pub organization: OrganizationId,
    pub submitted_by: UserRef,
    pub status: SubmissionStatus,
    pub invoice_data: InvoiceData,
    pub invoice_file: Option<FileRef>,
    pub reviewed_by: Option<UserId>,
    pub exported_at: Option<DateTime<Utc>>,
    pub exported_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceSubmission {
    pub fn is_exported(&self) -> bool {
        self.exported_at.is_some()
    }

    pub fn clear_export(&mut self) {
        self.exported_at = None;
        self.exported_by = None;
    }

    /// The computed VAT scenario tag stored alongside the extracted fields.
    pub fn scenario(&self) -> Option<&str> {
        self.invoice_data.get("scenario").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewAssignment {
    pub reviewer: UserRef,
    pub assigned_by: Option<UserId>,
    pub status: AssignmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionComment {
    pub author: Option<UserId>,
    pub message: String,
    pub author_is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_decisions_are_detected() {
        assert!(!ReviewAction::Approve.conflicts_with(AssignmentStatus::Pending));
        assert!(!ReviewAction::Approve.conflicts_with(AssignmentStatus::Approved));
        assert!(ReviewAction::Approve.conflicts_with(AssignmentStatus::Declined));
        assert!(ReviewAction::Reject.conflicts_with(AssignmentStatus::ChangesRequested));
        assert!(ReviewAction::RequestChanges.conflicts_with(AssignmentStatus::Approved));
        assert!(!ReviewAction::RequestChanges.conflicts_with(AssignmentStatus::ChangesRequested));
    }

    #[test]
    fn only_pending_accepts_every_action() {
        assert!(SubmissionStatus::Pending.accepts(ReviewAction::Reject));
        assert!(SubmissionStatus::Approved.accepts(ReviewAction::Approve));
        assert!(!SubmissionStatus::Approved.accepts(ReviewAction::RequestChanges));
        assert!(!SubmissionStatus::Rejected.accepts(ReviewAction::Approve));
        assert!(SubmissionStatus::ChangesRequested.is_deletable());
        assert!(!SubmissionStatus::Approved.is_deletable());
    }
}
