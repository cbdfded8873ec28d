use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::{json, Value};

use crate::workflows::review::{
    ExportConnection, ExportSink, ExportSinkError, FileRef, FileStoreError, InvoiceData,
    InvoiceFileStore, LedgerId, MemoryCredentialStore, MemoryFileStore, MemoryStore, Membership,
    MembershipRole, OrganizationId, ReviewWorkflow, SubmissionId, UploadedFile, UserId, UserRef,
    WorkflowAdapters,
};
use crate::workflows::review::{CreateSubmission, SubmissionRecord};

pub(super) const ORG: &str = "org-tallinn";
pub(super) const SUBMITTER: &str = "u-submitter";
pub(super) const ADMIN: &str = "u-admin";
pub(super) const REVIEWER_A: &str = "u-rev-a";
pub(super) const REVIEWER_B: &str = "u-rev-b";
pub(super) const REVIEWER_C: &str = "u-rev-c";
pub(super) const INACTIVE_ADMIN: &str = "u-inactive";
pub(super) const MEMBER: &str = "u-member";
pub(super) const OUTSIDER: &str = "u-outsider";

pub(super) fn org() -> OrganizationId {
    OrganizationId(ORG.to_string())
}

pub(super) fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

pub(super) fn membership(id: &str, role: MembershipRole, active: bool) -> Membership {
    Membership {
        organization: org(),
        user: UserRef::new(id, format!("{id}@example.ee")),
        role,
        active,
    }
}

pub(super) fn memberships() -> Vec<Membership> {
    vec![
        membership(SUBMITTER, MembershipRole::Member, true),
        membership(MEMBER, MembershipRole::Member, true),
        membership(ADMIN, MembershipRole::Admin, true),
        membership(REVIEWER_A, MembershipRole::Admin, true),
        membership(REVIEWER_B, MembershipRole::Admin, true),
        membership(REVIEWER_C, MembershipRole::Admin, true),
        membership(INACTIVE_ADMIN, MembershipRole::Admin, false),
    ]
}

pub(super) fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for membership in memberships() {
        store.add_membership(membership).expect("membership stored");
    }
    store
}

pub(super) fn invoice_data() -> InvoiceData {
    match json!({
        "invoice_number": {"value": "ARVE-2024-117", "confidence": "strong"},
        "total_amount": {"value": 1240.5, "confidence": "medium"},
        "currency": {"value": "EUR"},
        "vat_rates": {"value": ["24"], "confidence": "strong"},
        "scenario": "EE_DOM_24_STD",
    }) {
        Value::Object(map) => map,
        _ => unreachable!("literal object"),
    }
}

pub(super) fn upload() -> UploadedFile {
    UploadedFile::new("arve-117.pdf", b"%PDF-1.7 invoice".to_vec())
}

pub(super) fn create_request(reviewers: &[&str]) -> CreateSubmission {
    CreateSubmission {
        organization: org(),
        invoice_data: invoice_data(),
        file: upload(),
        reviewer_ids: reviewers.iter().map(|id| user(id)).collect(),
    }
}

/// Workflow over the in-memory store with handles on every adapter.
pub(super) struct Harness {
    pub(super) workflow: Arc<ReviewWorkflow<MemoryStore, MemoryStore>>,
    pub(super) store: Arc<MemoryStore>,
    pub(super) files: Arc<MemoryFileStore>,
    pub(super) credentials: Arc<MemoryCredentialStore>,
    pub(super) ledgers: Arc<MemoryLedgerSink>,
}

pub(super) fn harness() -> Harness {
    harness_with_fields(None)
}

pub(super) fn harness_with_fields(export_fields: Option<Vec<String>>) -> Harness {
    let store = seeded_store();
    let files = Arc::new(MemoryFileStore::default());
    let credentials = Arc::new(MemoryCredentialStore::default());
    let ledgers = Arc::new(MemoryLedgerSink::default());
    let workflow = Arc::new(ReviewWorkflow::new(
        store.clone(),
        store.clone(),
        WorkflowAdapters {
            files: files.clone(),
            credentials: credentials.clone(),
            sink: ledgers.clone(),
            export_fields,
        },
    ));
    Harness {
        workflow,
        store,
        files,
        credentials,
        ledgers,
    }
}

impl Harness {
    pub(super) fn submit(&self, reviewers: &[&str]) -> SubmissionId {
        self.workflow
            .submissions
            .create(&user(SUBMITTER), create_request(reviewers))
            .expect("submission created")
            .submission
            .id
    }

    pub(super) fn record(&self, id: SubmissionId) -> SubmissionRecord {
        use crate::workflows::review::SubmissionStore;
        self.store
            .fetch(id)
            .expect("store readable")
            .expect("submission exists")
    }

    pub(super) fn approve_all(&self, id: SubmissionId, reviewers: &[&str]) {
        for reviewer in reviewers {
            self.workflow
                .reviews
                .approve(id, &user(reviewer))
                .expect("approval recorded");
        }
    }
}

/// Ledger sink keeping rows in memory.
#[derive(Default)]
pub(super) struct MemoryLedgerSink {
    ledgers: Mutex<HashMap<LedgerId, Vec<Vec<String>>>>,
    created: AtomicUsize,
}

impl MemoryLedgerSink {
    pub(super) fn rows(&self, ledger: &LedgerId) -> Vec<Vec<String>> {
        self.ledgers
            .lock()
            .expect("ledger mutex poisoned")
            .get(ledger)
            .cloned()
            .unwrap_or_default()
    }

    pub(super) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(super) fn seed(&self, ledger: LedgerId, rows: Vec<Vec<String>>) {
        self.ledgers
            .lock()
            .expect("ledger mutex poisoned")
            .insert(ledger, rows);
    }
}

impl ExportSink for MemoryLedgerSink {
    fn create_ledger(&self, _connection: &ExportConnection) -> Result<LedgerId, ExportSinkError> {
        let index = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let ledger = LedgerId(format!("ledger-{index}"));
        self.seed(ledger.clone(), Vec::new());
        Ok(ledger)
    }

    fn header(&self, ledger: &LedgerId) -> Result<Option<Vec<String>>, ExportSinkError> {
        let ledgers = self.ledgers.lock().expect("ledger mutex poisoned");
        let rows = ledgers
            .get(ledger)
            .ok_or_else(|| ExportSinkError::LedgerNotFound(ledger.clone()))?;
        Ok(rows.first().cloned())
    }

    fn append_row(&self, ledger: &LedgerId, row: &[String]) -> Result<(), ExportSinkError> {
        let mut ledgers = self.ledgers.lock().expect("ledger mutex poisoned");
        let rows = ledgers
            .get_mut(ledger)
            .ok_or_else(|| ExportSinkError::LedgerNotFound(ledger.clone()))?;
        rows.push(row.to_vec());
        Ok(())
    }
}

/// Sink whose destination is always down.
pub(super) struct UnavailableSink;

impl ExportSink for UnavailableSink {
    fn create_ledger(&self, _connection: &ExportConnection) -> Result<LedgerId, ExportSinkError> {
        Ok(LedgerId("ledger-down".to_string()))
    }

    fn header(&self, _ledger: &LedgerId) -> Result<Option<Vec<String>>, ExportSinkError> {
        Ok(None)
    }

    fn append_row(&self, _ledger: &LedgerId, _row: &[String]) -> Result<(), ExportSinkError> {
        Err(ExportSinkError::Unavailable("spreadsheet api timed out".to_string()))
    }
}

/// File store that cannot write.
pub(super) struct ReadOnlyFileStore;

impl InvoiceFileStore for ReadOnlyFileStore {
    fn store(&self, _file: &UploadedFile) -> Result<FileRef, FileStoreError> {
        Err(FileStoreError::Io {
            path: PathBuf::from("/invoice-files"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only file system"),
        })
    }

    fn remove(&self, _file: &FileRef) -> Result<(), FileStoreError> {
        Ok(())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
