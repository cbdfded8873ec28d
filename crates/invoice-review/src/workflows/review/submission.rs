use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::{
    FileRef, InvoiceData, InvoiceSubmission, OrganizationId, SubmissionComment, SubmissionId,
    SubmissionStatus, UserId,
};
use super::files::{InvoiceFileStore, UploadedFile};
use super::payload::ReviewPayload;
use super::record::{NewSubmission, SubmissionRecord};
use super::repository::{MembershipDirectory, StoreError, SubmissionStore};

/// A new invoice submission as requested by its submitter.
#[derive(Debug, Clone)]
pub struct CreateSubmission {
    pub organization: OrganizationId,
    pub invoice_data: InvoiceData,
    pub file: UploadedFile,
    pub reviewer_ids: Vec<UserId>,
}

/// Corrected data sent back after changes were requested.
#[derive(Debug, Clone, Default)]
pub struct Resubmission {
    pub invoice_data: InvoiceData,
    pub file: Option<UploadedFile>,
    pub comment: Option<String>,
}

/// Everything a viewer sees on a submission's page.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionDetail {
    pub submission: InvoiceSubmission,
    pub comments: Vec<SubmissionComment>,
    #[serde(flatten)]
    pub review: ReviewPayload,
}

/// Creation, resubmission, deletion and lookup of submissions.
pub struct SubmissionService<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    files: Arc<dyn InvoiceFileStore>,
}

impl<S, D> SubmissionService<S, D>
where
    S: SubmissionStore + 'static,
    D: MembershipDirectory + 'static,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, files: Arc<dyn InvoiceFileStore>) -> Self {
        Self {
            store,
            directory,
            files,
        }
    }

    /// Store the file and create the submission with one pending assignment per
    /// reviewer. Every reviewer id must name an active admin of the organization,
    /// otherwise nothing is created.
    pub fn create(
        &self,
        actor: &UserId,
        request: CreateSubmission,
    ) -> Result<SubmissionRecord, SubmissionError> {
        let membership = self
            .directory
            .membership(&request.organization, actor)?
            .filter(|membership| membership.active)
            .ok_or(SubmissionError::NotMember)?;

        if request.reviewer_ids.contains(actor) {
            return Err(SubmissionError::SelfAssignment);
        }
        let reviewers = self
            .directory
            .active_admins(&request.organization, &request.reviewer_ids)?;
        if reviewers.len() != request.reviewer_ids.len() {
            return Err(SubmissionError::InvalidReviewer);
        }

        info!(
            user = %actor,
            organization = %request.organization,
            reviewers = reviewers.len(),
            file = %request.file.name,
            size = request.file.bytes.len(),
            "creating invoice submission"
        );

        let file = self.files.store(&request.file).map_err(|err| {
            error!(
                user = %actor,
                organization = %request.organization,
                error = %err,
                "failed to store invoice file"
            );
            SubmissionError::FileUpload
        })?;

        let inserted = self.store.insert(NewSubmission {
            organization: request.organization,
            submitted_by: membership.user,
            invoice_data: request.invoice_data,
            invoice_file: Some(file.clone()),
            reviewers,
        });

        match inserted {
            Ok(record) => {
                info!(
                    submission_id = %record.submission.id,
                    reviewers = record.assignments.len(),
                    "invoice submission created"
                );
                Ok(record)
            }
            Err(err) => {
                error!(user = %actor, error = %err, "failed to persist invoice submission");
                self.discard(&file);
                Err(err.into())
            }
        }
    }

    /// Replace the invoice data (and optionally the file) and restart review:
    /// status back to pending, every assignment back to pending, export cleared.
    pub fn resubmit(
        &self,
        id: SubmissionId,
        actor: &UserId,
        resubmission: Resubmission,
    ) -> Result<SubmissionRecord, SubmissionError> {
        let Resubmission {
            invoice_data,
            file,
            comment,
        } = resubmission;
        let comment = comment
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty());

        info!(
            submission_id = %id,
            has_file = file.is_some(),
            has_comment = comment.is_some(),
            "resubmitting invoice"
        );

        let new_file = match &file {
            Some(upload) => Some(self.files.store(upload).map_err(|err| {
                error!(submission_id = %id, error = %err, "failed to store replacement invoice file");
                SubmissionError::FileUpload
            })?),
            None => None,
        };

        let updated = self.store.update::<_, SubmissionError, _>(id, |record| {
            if &record.submission.submitted_by.id != actor {
                return Err(SubmissionError::NotFound);
            }
            let now = Utc::now();
            let replaced = match &new_file {
                Some(file) => record.submission.invoice_file.replace(file.clone()),
                None => None,
            };
            record.submission.invoice_data = invoice_data;
            record.transition(SubmissionStatus::Pending, None, now);
            record.submission.clear_export();
            record.reset_assignments(now);
            if let Some(message) = &comment {
                record.push_comment(Some(actor.clone()), message.as_str(), false, now);
            }
            Ok((record.clone(), replaced))
        });

        match updated {
            Ok((record, replaced)) => {
                if let Some(old) = replaced {
                    self.discard(&old);
                }
                info!(submission_id = %id, "invoice resubmitted");
                Ok(record)
            }
            Err(err) => {
                if let Some(file) = &new_file {
                    self.discard(file);
                }
                Err(err)
            }
        }
    }

    /// Admins may delete any submission of their organization; the submitter only
    /// while it is pending or has changes requested. Anyone else is told the
    /// submission does not exist.
    pub fn delete(&self, id: SubmissionId, actor: &UserId) -> Result<(), SubmissionError> {
        let organization = self
            .store
            .fetch(id)?
            .ok_or(SubmissionError::NotFound)?
            .submission
            .organization;
        let is_admin = self
            .directory
            .membership(&organization, actor)?
            .filter(|membership| membership.active)
            .ok_or(SubmissionError::NotFound)?
            .is_active_admin();

        let removed = self
            .store
            .delete_if::<SubmissionError, _>(id, |record| {
                let submission = &record.submission;
                let own_withdrawable =
                    &submission.submitted_by.id == actor && submission.status.is_deletable();
                if is_admin || own_withdrawable {
                    Ok(())
                } else {
                    Err(SubmissionError::NotFound)
                }
            })
            .map_err(|err| match err {
                SubmissionError::Store(StoreError::NotFound) => SubmissionError::NotFound,
                other => other,
            })?;

        if let Some(file) = &removed.submission.invoice_file {
            self.discard(file);
        }
        info!(submission_id = %id, user = %actor, "invoice submission deleted");
        Ok(())
    }

    /// Detail view for admins of the organization and for the submitter.
    pub fn get(&self, id: SubmissionId, actor: &UserId) -> Result<SubmissionDetail, SubmissionError> {
        let record = self.store.fetch(id)?.ok_or(SubmissionError::NotFound)?;
        let membership = self
            .directory
            .membership(&record.submission.organization, actor)?
            .filter(|membership| membership.active)
            .ok_or(SubmissionError::NotFound)?;
        if !membership.is_active_admin() && &record.submission.submitted_by.id != actor {
            return Err(SubmissionError::AccessDenied);
        }

        let review = ReviewPayload::build(&record, actor);
        Ok(SubmissionDetail {
            submission: record.submission,
            comments: record.comments,
            review,
        })
    }

    /// The append-only comment thread, oldest first.
    pub fn comments(&self, id: SubmissionId) -> Result<Vec<SubmissionComment>, SubmissionError> {
        let record = self.store.fetch(id)?.ok_or(SubmissionError::NotFound)?;
        let mut comments = record.comments;
        comments.sort_by_key(|comment| comment.created_at);
        Ok(comments)
    }

    /// Admins see every submission of the organization, members only their own.
    pub fn list(
        &self,
        organization: &OrganizationId,
        actor: &UserId,
    ) -> Result<Vec<InvoiceSubmission>, SubmissionError> {
        let membership = self
            .directory
            .membership(organization, actor)?
            .filter(|membership| membership.active)
            .ok_or(SubmissionError::NotMember)?;
        let mut submissions = self.store.list_for_organization(organization)?;
        if !membership.is_active_admin() {
            submissions.retain(|submission| &submission.submitted_by.id == actor);
        }
        Ok(submissions)
    }

    fn discard(&self, file: &FileRef) {
        if let Err(err) = self.files.remove(file) {
            warn!(file = %file, error = %err, "failed to remove invoice file");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("no active membership in this organization")]
    NotMember,
    #[error("submission not found")]
    NotFound,
    #[error("access denied")]
    AccessDenied,
    #[error("you cannot assign yourself as a reviewer")]
    SelfAssignment,
    #[error("invalid reviewer selection")]
    InvalidReviewer,
    #[error("failed to upload invoice file, please try again")]
    FileUpload,
    #[error(transparent)]
    Store(#[from] StoreError),
}
