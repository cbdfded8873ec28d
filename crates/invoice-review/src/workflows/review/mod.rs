//! Multi-reviewer approval of invoice submissions and export of approved ones.
//!
//! A submission moves through `pending → approved | rejected | changes_requested`,
//! driven by one assignment per reviewer. The submission is approved only when every
//! assignment is, and export is gated on that state.

pub mod domain;
pub mod export;
pub mod files;
pub mod memory;
pub mod payload;
pub mod record;
pub mod repository;
pub mod router;
pub mod service;
pub mod sqlite;
pub mod submission;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use domain::{
    AssignmentStatus, FileRef, InvoiceData, InvoiceSubmission, Membership, MembershipRole,
    OrganizationId, ReviewAction, ReviewAssignment, SubmissionComment, SubmissionId,
    SubmissionStatus, UserId, UserRef,
};
pub use export::{
    CsvLedgerSink, ExportConnection, ExportCredentialStore, ExportError, ExportReceipt,
    ExportService, ExportSink, ExportSinkError, LedgerId, MemoryCredentialStore,
};
pub use files::{FileStoreError, InvoiceFileStore, LocalFileStore, MemoryFileStore, UploadedFile};
pub use memory::MemoryStore;
pub use payload::{can_export, ReviewPayload, ReviewSummary, ReviewerEntry};
pub use record::{NewSubmission, SubmissionRecord};
pub use repository::{MembershipDirectory, StoreError, SubmissionStore};
pub use router::{review_router, ACTOR_HEADER};
pub use service::{ReviewError, ReviewOutcome, ReviewService, ReviewerAdded};
pub use sqlite::SqliteStore;
pub use submission::{
    CreateSubmission, Resubmission, SubmissionDetail, SubmissionError, SubmissionService,
};
pub use workflow::{AccessError, ReviewWorkflow, WorkflowAdapters};
