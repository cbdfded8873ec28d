use std::sync::Arc;

use super::common::*;
use crate::workflows::review::{
    ExportError, ExportSinkError, InvoiceData, LedgerId, MemoryCredentialStore, MemoryFileStore,
    Resubmission, ReviewWorkflow, SubmissionId, SubmissionStore, WorkflowAdapters,
};

fn approved_submission(harness: &Harness, reviewers: &[&str]) -> SubmissionId {
    let id = harness.submit(reviewers);
    if reviewers.is_empty() {
        harness
            .workflow
            .reviews
            .approve(id, &user(ADMIN))
            .expect("approved");
    } else {
        harness.approve_all(id, reviewers);
    }
    id
}

#[test]
fn export_appends_header_and_row_then_stamps() {
    let harness = harness_with_fields(Some(vec![
        "invoice_number".to_string(),
        "total_amount".to_string(),
        "due_date".to_string(),
    ]));
    let id = approved_submission(&harness, &[REVIEWER_A]);
    harness.credentials.connect(user(REVIEWER_A), "finance@example.ee");

    let receipt = harness
        .workflow
        .exports
        .export(id, &user(REVIEWER_A))
        .expect("exported");

    assert_eq!(harness.ledgers.created(), 1);
    assert_eq!(
        harness.ledgers.rows(&receipt.ledger_id),
        vec![
            vec![
                "invoice_number".to_string(),
                "total_amount".to_string(),
                "due_date".to_string(),
            ],
            vec![
                "ARVE-2024-117".to_string(),
                "1240.5".to_string(),
                "None".to_string(),
            ],
        ]
    );

    let submission = harness.record(id).submission;
    assert_eq!(submission.exported_at, Some(receipt.exported_at));
    assert_eq!(submission.exported_by, Some(user(REVIEWER_A)));
    let outcome = harness
        .workflow
        .reviews
        .review_payload(id, &user(REVIEWER_A))
        .expect("payload");
    assert!(!outcome.review.can_export);
}

#[test]
fn second_export_is_refused() {
    let harness = harness();
    let id = approved_submission(&harness, &[REVIEWER_A]);
    harness.credentials.connect(user(REVIEWER_A), "finance@example.ee");

    let receipt = harness
        .workflow
        .exports
        .export(id, &user(REVIEWER_A))
        .expect("first export");
    let second = harness.workflow.exports.export(id, &user(REVIEWER_A));

    assert!(matches!(second, Err(ExportError::AlreadyExported)));
    assert_eq!(harness.ledgers.rows(&receipt.ledger_id).len(), 2);
}

#[test]
fn the_remembered_ledger_is_reused_and_its_header_wins() {
    let harness = harness();
    let first = approved_submission(&harness, &[]);
    let second = approved_submission(&harness, &[]);
    harness.credentials.connect(user(ADMIN), "finance@example.ee");

    let receipt = harness
        .workflow
        .exports
        .export(first, &user(ADMIN))
        .expect("first export");
    let existing_header = vec!["scenario".to_string(), "currency".to_string()];
    harness
        .ledgers
        .seed(receipt.ledger_id.clone(), vec![existing_header.clone()]);

    let again = harness
        .workflow
        .exports
        .export(second, &user(ADMIN))
        .expect("second export");

    assert_eq!(again.ledger_id, receipt.ledger_id);
    assert_eq!(harness.ledgers.created(), 1);
    assert_eq!(
        harness.ledgers.rows(&receipt.ledger_id),
        vec![
            existing_header,
            vec!["EE_DOM_24_STD".to_string(), "EUR".to_string()],
        ]
    );
}

#[test]
fn preconditions_are_checked_in_order() {
    let harness = harness();
    let pending = harness.submit(&[REVIEWER_A, REVIEWER_B]);
    assert!(matches!(
        harness.workflow.exports.export(pending, &user(ADMIN)),
        Err(ExportError::NotApproved)
    ));

    harness.approve_all(pending, &[REVIEWER_A, REVIEWER_B]);
    assert!(matches!(
        harness.workflow.exports.export(pending, &user(MEMBER)),
        Err(ExportError::PermissionDenied)
    ));

    harness
        .store
        .update::<_, ExportError, _>(pending, |record| {
            record.submission.invoice_data.clear();
            Ok(())
        })
        .expect("data cleared");
    assert!(matches!(
        harness.workflow.exports.export(pending, &user(REVIEWER_A)),
        Err(ExportError::MissingInvoiceData)
    ));
}

#[test]
fn empty_invoice_data_is_accepted_until_export() {
    let harness = harness();
    harness.credentials.connect(user(ADMIN), "finance@example.ee");
    let mut request = create_request(&[]);
    request.invoice_data.clear();
    let id = harness
        .workflow
        .submissions
        .create(&user(SUBMITTER), request)
        .expect("created without invoice data")
        .submission
        .id;
    harness
        .workflow
        .submissions
        .resubmit(
            id,
            &user(SUBMITTER),
            Resubmission {
                invoice_data: InvoiceData::new(),
                file: None,
                comment: None,
            },
        )
        .expect("resubmitted without invoice data");
    harness.workflow.reviews.approve(id, &user(ADMIN)).expect("approved");

    assert!(matches!(
        harness.workflow.exports.export(id, &user(ADMIN)),
        Err(ExportError::MissingInvoiceData)
    ));
    assert_eq!(harness.ledgers.created(), 0);
    assert!(!harness.record(id).submission.is_exported());
}

#[test]
fn unconnected_user_cannot_export() {
    let harness = harness();
    let id = approved_submission(&harness, &[REVIEWER_A]);

    let result = harness.workflow.exports.export(id, &user(ADMIN));

    assert!(matches!(result, Err(ExportError::MissingCredentials)));
    assert!(!harness.record(id).submission.is_exported());
    assert_eq!(harness.ledgers.created(), 0);
}

#[test]
fn sink_failure_leaves_the_submission_exportable() {
    let store = seeded_store();
    let credentials = Arc::new(MemoryCredentialStore::default());
    credentials.connect(user(ADMIN), "finance@example.ee");
    let workflow = ReviewWorkflow::new(
        store.clone(),
        store.clone(),
        WorkflowAdapters {
            files: Arc::new(MemoryFileStore::default()),
            credentials,
            sink: Arc::new(UnavailableSink),
            export_fields: None,
        },
    );
    let id = workflow
        .submissions
        .create(&user(SUBMITTER), create_request(&[]))
        .expect("created")
        .submission
        .id;
    workflow.reviews.approve(id, &user(ADMIN)).expect("approved");

    let result = workflow.exports.export(id, &user(ADMIN));

    assert!(matches!(
        result,
        Err(ExportError::Sink(ExportSinkError::Unavailable(_)))
    ));
    let outcome = workflow
        .reviews
        .review_payload(id, &user(ADMIN))
        .expect("payload");
    assert!(!outcome.submission.is_exported());
    assert!(outcome.review.can_export);
}

#[test]
fn approved_reviewer_or_admin_may_export_assigned_submissions() {
    let harness = harness();
    let id = approved_submission(&harness, &[REVIEWER_A]);
    harness.credentials.connect(user(ADMIN), "admin@example.ee");

    let receipt = harness
        .workflow
        .exports
        .export(id, &user(ADMIN))
        .expect("admin exports without an assignment");

    assert_eq!(receipt.ledger_id, LedgerId("ledger-1".to_string()));
    assert_eq!(harness.record(id).submission.exported_by, Some(user(ADMIN)));
}
