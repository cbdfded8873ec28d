//! Export of approved invoices to the submitting organization's ledger.
//!
//! The row is appended outside the store transaction, then a short update
//! re-checks the submission and stamps it. A failed append leaves it unstamped so
//! the export can be retried; a store failure after a successful append can
//! produce a duplicate row on retry. Within one process a submission has at most
//! one export in flight; a second request is refused with
//! [`ExportError::InProgress`] rather than waiting.

mod row;
mod sink;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

pub use row::{append_invoice, build_row, export_columns, normalize_cell};
pub use sink::{
    CsvLedgerSink, ExportConnection, ExportCredentialStore, ExportSink, ExportSinkError, LedgerId,
    MemoryCredentialStore,
};

use super::domain::{AssignmentStatus, InvoiceData, SubmissionId, SubmissionStatus, UserId};
use super::repository::{MembershipDirectory, StoreError, SubmissionStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReceipt {
    pub ledger_id: LedgerId,
    pub exported_at: DateTime<Utc>,
}

pub struct ExportService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    credentials: Arc<dyn ExportCredentialStore>,
    sink: Arc<dyn ExportSink>,
    fields: Option<Vec<String>>,
    in_flight: Mutex<HashSet<SubmissionId>>,
}

/// Marks a submission as being exported until dropped.
struct ExportClaim<'a> {
    in_flight: &'a Mutex<HashSet<SubmissionId>>,
    id: SubmissionId,
}

impl Drop for ExportClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl<S, D> ExportService<S, D>
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        credentials: Arc<dyn ExportCredentialStore>,
        sink: Arc<dyn ExportSink>,
        fields: Option<Vec<String>>,
    ) -> Self {
        Self {
            store,
            directory,
            credentials,
            sink,
            fields,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    fn claim(&self, id: SubmissionId) -> Result<ExportClaim<'_>, ExportError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(id) {
            return Err(ExportError::InProgress);
        }
        Ok(ExportClaim {
            in_flight: &self.in_flight,
            id,
        })
    }

    pub fn export(&self, id: SubmissionId, actor: &UserId) -> Result<ExportReceipt, ExportError> {
        let _claim = self.claim(id)?;
        let record = self.store.fetch(id)?.ok_or(StoreError::NotFound)?;
        let submission = &record.submission;

        if submission.status != SubmissionStatus::Approved {
            return Err(ExportError::NotApproved);
        }
        if submission.is_exported() {
            return Err(ExportError::AlreadyExported);
        }
        if record.has_assignments() {
            let is_admin = self
                .directory
                .membership(&submission.organization, actor)?
                .is_some_and(|membership| membership.is_active_admin());
            let approved_reviewer = record
                .assignment(actor)
                .is_some_and(|assignment| assignment.status == AssignmentStatus::Approved);
            if !is_admin && !approved_reviewer {
                return Err(ExportError::PermissionDenied);
            }
        }
        if submission.invoice_data.is_empty() {
            return Err(ExportError::MissingInvoiceData);
        }

        let connection = self
            .credentials
            .connection(actor)?
            .ok_or(ExportError::MissingCredentials)?;

        let ledger = self
            .append(&connection, actor, &submission.invoice_data)
            .map_err(|err| {
                error!(submission_id = %id, user = %actor, error = %err, "invoice export failed");
                err
            })?;

        let exported_at = self.store.update::<_, ExportError, _>(id, |record| {
            let submission = &mut record.submission;
            if submission.is_exported() {
                return Err(ExportError::AlreadyExported);
            }
            if submission.status != SubmissionStatus::Approved {
                return Err(ExportError::NotApproved);
            }
            let now = Utc::now();
            submission.exported_at = Some(now);
            submission.exported_by = Some(actor.clone());
            submission.updated_at = now;
            Ok(now)
        });
        let exported_at = match exported_at {
            Ok(exported_at) => exported_at,
            Err(err) => {
                warn!(
                    submission_id = %id,
                    ledger = %ledger,
                    error = %err,
                    "row appended but submission was not stamped"
                );
                return Err(err);
            }
        };

        info!(submission_id = %id, user = %actor, ledger = %ledger, "invoice exported");
        Ok(ExportReceipt {
            ledger_id: ledger,
            exported_at,
        })
    }

    fn append(
        &self,
        connection: &ExportConnection,
        actor: &UserId,
        invoice: &InvoiceData,
    ) -> Result<LedgerId, ExportError> {
        let ledger = match &connection.ledger {
            Some(ledger) => ledger.clone(),
            None => {
                let ledger = self.sink.create_ledger(connection)?;
                self.credentials.remember_ledger(actor, &ledger)?;
                ledger
            }
        };
        let columns = export_columns(invoice, self.fields.as_deref());
        append_invoice(self.sink.as_ref(), &ledger, invoice, columns)?;
        Ok(ledger)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("submission is not approved")]
    NotApproved,
    #[error("submission already exported")]
    AlreadyExported,
    #[error("submission is already being exported; retry")]
    InProgress,
    #[error("reviewer approval required")]
    PermissionDenied,
    #[error("missing invoice data")]
    MissingInvoiceData,
    #[error("export account not connected")]
    MissingCredentials,
    #[error(transparent)]
    Sink(#[from] ExportSinkError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
