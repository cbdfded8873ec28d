use clap::Args;
use invoice_review::error::AppError;
use invoice_review::workflows::intake::process_extraction;
use invoice_review::workflows::review::{
    CreateSubmission, CsvLedgerSink, MemoryCredentialStore, MemoryFileStore, MemoryStore,
    Membership, MembershipRole, OrganizationId, Resubmission, ReviewOutcome, ReviewWorkflow,
    UploadedFile, UserId, UserRef, WorkflowAdapters,
};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ClassifyArgs {
    /// JSON file holding the extracted field map
    pub(crate) path: PathBuf,
    /// Pretty-print the annotated invoice data
    #[arg(long)]
    pub(crate) pretty: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Directory receiving the demo CSV ledger
    #[arg(long, default_value = "demo-exports")]
    pub(crate) ledger_dir: PathBuf,
    /// Comma-separated export columns (defaults to every invoice key)
    #[arg(long)]
    pub(crate) fields: Option<String>,
}

pub(crate) fn run_classify(args: ClassifyArgs) -> Result<(), AppError> {
    let raw: Value = serde_json::from_str(&fs::read_to_string(&args.path)?)?;
    let annotated = Value::Object(process_extraction(&raw)?);
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&annotated)?
    } else {
        serde_json::to_string(&annotated)?
    };
    println!("{rendered}");
    Ok(())
}

const ORGANIZATION: &str = "org-demo";
const SUBMITTER: &str = "u-accountant";
const REVIEWERS: [&str; 2] = ["u-controller", "u-cfo"];

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { ledger_dir, fields } = args;

    println!("Invoice review demo");
    let invoice_data = process_extraction(&demo_extraction())?;
    println!(
        "- Extracted {} fields, scenario {}",
        invoice_data.len() - 1,
        invoice_data
            .get("scenario")
            .and_then(Value::as_str)
            .unwrap_or("undetermined")
    );

    let store = Arc::new(MemoryStore::new());
    store.add_membership(demo_membership(SUBMITTER, MembershipRole::Member))?;
    for reviewer in REVIEWERS {
        store.add_membership(demo_membership(reviewer, MembershipRole::Admin))?;
    }
    let credentials = Arc::new(MemoryCredentialStore::default());
    credentials.connect(user(REVIEWERS[0]), "finance@demo.example");
    let workflow = ReviewWorkflow::new(
        store.clone(),
        store,
        WorkflowAdapters {
            files: Arc::new(MemoryFileStore::default()),
            credentials,
            sink: Arc::new(CsvLedgerSink::new(ledger_dir.clone())),
            export_fields: fields.map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|field| !field.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
        },
    );

    let submitter = user(SUBMITTER);
    let record = match workflow.submissions.create(
        &submitter,
        CreateSubmission {
            organization: OrganizationId(ORGANIZATION.to_string()),
            invoice_data: invoice_data.clone(),
            file: UploadedFile::new("arve-2024-117.pdf", b"%PDF-1.7 demo invoice".to_vec()),
            reviewer_ids: REVIEWERS.iter().map(|id| user(id)).collect(),
        },
    ) {
        Ok(record) => record,
        Err(err) => {
            println!("  Submission refused: {err}");
            return Ok(());
        }
    };
    let id = record.submission.id;
    println!(
        "- Submission {id} created with {} reviewers",
        record.assignments.len()
    );

    let controller = user(REVIEWERS[0]);
    let cfo = user(REVIEWERS[1]);
    match workflow
        .reviews
        .request_changes(id, &cfo, "Please attach the delivery note")
    {
        Ok(outcome) => print_outcome("CFO requested changes", &outcome),
        Err(err) => println!("  Request for changes failed: {err}"),
    }

    match workflow.submissions.resubmit(
        id,
        &submitter,
        Resubmission {
            invoice_data,
            file: None,
            comment: Some("Delivery note attached".to_string()),
        },
    ) {
        Ok(record) => println!(
            "- Resubmitted, status {} with {} comments",
            record.submission.status.label(),
            record.comments.len()
        ),
        Err(err) => println!("  Resubmission failed: {err}"),
    }

    for (label, reviewer) in [("Controller", &controller), ("CFO", &cfo)] {
        match workflow.reviews.approve(id, reviewer) {
            Ok(outcome) => print_outcome(&format!("{label} approved"), &outcome),
            Err(err) => println!("  {label} approval failed: {err}"),
        }
    }

    match workflow.exports.export(id, &controller) {
        Ok(receipt) => println!(
            "- Exported to ledger {} under {} at {}",
            receipt.ledger_id,
            ledger_dir.display(),
            receipt.exported_at.to_rfc3339()
        ),
        Err(err) => println!("  Export failed: {err}"),
    }
    match workflow.exports.export(id, &controller) {
        Ok(_) => println!("  Unexpected second export"),
        Err(err) => println!("- Second export refused: {err}"),
    }

    Ok(())
}

fn print_outcome(action: &str, outcome: &ReviewOutcome) {
    let summary = &outcome.review.review_summary;
    println!(
        "- {action}: submission {} | {} approved / {} pending / {} changes requested | can export: {}",
        outcome.submission.status.label(),
        summary.approved,
        summary.pending,
        summary.changes_requested,
        outcome.review.can_export
    );
}

fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

fn demo_membership(id: &str, role: MembershipRole) -> Membership {
    Membership {
        organization: OrganizationId(ORGANIZATION.to_string()),
        user: UserRef::new(id, format!("{id}@demo.example")),
        role,
        active: true,
    }
}

fn demo_extraction() -> Value {
    json!({
        "invoice_number": {"value": "ARVE-2024-117", "confidence": "strong confidence"},
        "invoice_date": {"value": "2024-05-02", "confidence": "strong confidence"},
        "supplier_name": {"value": "Nordic Cloud AB", "confidence": "strong confidence"},
        "supplier_vat_id": {"value": "SE556677889901", "confidence": "medium confidence"},
        "buyer_country_group": {"value": "EE", "confidence": "strong confidence"},
        "supplier_country_group": {"value": "EU_OTHER", "confidence": "strong confidence"},
        "supply_type": {"value": "SERVICES", "confidence": "medium confidence"},
        "service_category": {"value": "SERV_24", "confidence": "low confidence"},
        "vat_rates": {"value": ["0"], "confidence": "medium confidence"},
        "total_amount": {"value": 1240.5, "confidence": "strong confidence"},
        "currency": "EUR",
        "supplier_info_reasoning": "Seller block lists a Swedish address and VAT id",
    })
}
