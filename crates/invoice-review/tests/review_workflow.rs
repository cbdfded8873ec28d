//! End-to-end review scenarios over the disk-backed adapters: SQLite store, local
//! invoice files and CSV ledgers, driven through the HTTP router.

mod common {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::response::Response;
    use axum::Router;
    use serde_json::Value;

    use invoice_review::workflows::review::{
        review_router, CsvLedgerSink, LocalFileStore, MemoryCredentialStore, Membership,
        MembershipRole, OrganizationId, ReviewWorkflow, SqliteStore, UserId, UserRef,
        WorkflowAdapters, ACTOR_HEADER,
    };

    pub(super) const ORG: &str = "org-parnu";
    pub(super) const SUBMITTER: &str = "u-bookkeeper";
    pub(super) const CONTROLLER: &str = "u-controller";
    pub(super) const CFO: &str = "u-cfo";
    pub(super) const AUDITOR: &str = "u-auditor";

    pub(super) struct Deployment {
        pub(super) router: Router,
        pub(super) files: LocalFileStore,
        pub(super) ledgers: CsvLedgerSink,
    }

    fn membership(id: &str, role: MembershipRole) -> Membership {
        Membership {
            organization: OrganizationId(ORG.to_string()),
            user: UserRef::new(id, format!("{id}@parnu.example")),
            role,
            active: true,
        }
    }

    pub(super) fn deploy(root: &Path) -> Deployment {
        let store = Arc::new(
            SqliteStore::open(root.join("review.db"), Duration::from_secs(2))
                .expect("database opens"),
        );
        for membership in [
            membership(SUBMITTER, MembershipRole::Member),
            membership(CONTROLLER, MembershipRole::Admin),
            membership(CFO, MembershipRole::Admin),
            membership(AUDITOR, MembershipRole::Admin),
        ] {
            store.add_membership(&membership).expect("membership stored");
        }

        let credentials = Arc::new(MemoryCredentialStore::default());
        credentials.connect(UserId(CONTROLLER.to_string()), "ledger@parnu.example");
        let files = LocalFileStore::new(root.join("files"));
        let ledgers = CsvLedgerSink::new(root.join("ledgers"));
        let workflow = ReviewWorkflow::new(
            store.clone(),
            store,
            WorkflowAdapters {
                files: Arc::new(files.clone()),
                credentials,
                sink: Arc::new(ledgers.clone()),
                export_fields: Some(vec![
                    "invoice_number".to_string(),
                    "total_amount".to_string(),
                    "scenario".to_string(),
                ]),
            },
        );

        Deployment {
            router: review_router(Arc::new(workflow)),
            files,
            ledgers,
        }
    }

    pub(super) fn post(uri: &str, actor: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(ACTOR_HEADER, actor)
            .body(Body::from(serde_json::to_vec(&body).expect("json body")))
            .expect("request builds")
    }

    pub(super) fn get(uri: &str, actor: &str) -> Request<Body> {
        Request::get(uri)
            .header(ACTOR_HEADER, actor)
            .body(Body::empty())
            .expect("request builds")
    }

    pub(super) async fn read_json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }
}

mod submission_lifecycle {
    use super::common::*;
    use axum::http::StatusCode;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use invoice_review::workflows::intake::process_extraction;
    use invoice_review::workflows::review::{FileRef, LedgerId};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn invoice_data() -> Value {
        Value::Object(
            process_extraction(&json!({
                "invoice_number": {"value": "PRN-0042", "confidence": "strong confidence"},
                "total_amount": {"value": 310.0, "confidence": "strong confidence"},
                "buyer_country_group": "EE",
                "supplier_country_group": "EE",
                "supply_type": "SERVICES",
                "service_category": "SERV_13",
            }))
            .expect("extraction classified"),
        )
    }

    async fn create(deployment: &Deployment) -> u64 {
        let response = deployment
            .router
            .clone()
            .oneshot(post(
                "/api/v1/submissions",
                SUBMITTER,
                json!({
                    "organization_id": ORG,
                    "invoice_data": invoice_data(),
                    "file_name": "hotel invoice.pdf",
                    "file_base64": STANDARD.encode(b"%PDF-1.4 hotel stay"),
                    "reviewer_ids": [CONTROLLER, CFO],
                }),
            ))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::CREATED);
        let payload = read_json_body(response).await;
        payload["submission"]["id"].as_u64().expect("numeric id")
    }

    async fn act(deployment: &Deployment, id: u64, action: &str, actor: &str, body: Value) -> (StatusCode, Value) {
        let response = deployment
            .router
            .clone()
            .oneshot(post(&format!("/api/v1/submissions/{id}/{action}"), actor, body))
            .await
            .expect("route executes");
        let status = response.status();
        (status, read_json_body(response).await)
    }

    #[tokio::test]
    async fn changes_requested_then_approved_and_exported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let deployment = deploy(dir.path());
        let id = create(&deployment).await;

        let (status, payload) = act(
            &deployment,
            id,
            "request-changes",
            CFO,
            json!({"comment": "Add the guest names"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["submission"]["status"], json!("changes_requested"));

        let (status, _) = act(&deployment, id, "approve", CONTROLLER, json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT, "closed submissions take no approvals");

        let (status, payload) = act(
            &deployment,
            id,
            "resubmit",
            SUBMITTER,
            json!({
                "invoice_data": invoice_data(),
                "file_name": "hotel invoice v2.pdf",
                "file_base64": STANDARD.encode(b"%PDF-1.4 hotel stay, guests listed"),
                "comment": "Guest names added",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["review"]["review_summary"]["pending"], json!(2));
        let file = FileRef(
            payload["submission"]["invoice_file"]
                .as_str()
                .expect("file reference")
                .to_string(),
        );
        assert!(deployment.files.path_of(&file).is_file());

        for reviewer in [CONTROLLER, CFO] {
            let (status, _) = act(&deployment, id, "approve", reviewer, json!({})).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, receipt) = act(&deployment, id, "export", CONTROLLER, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let ledger = LedgerId(receipt["ledger_id"].as_str().expect("ledger id").to_string());
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(deployment.ledgers.path_of(&ledger))
            .expect("ledger readable");
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|record| {
                record
                    .expect("csv record")
                    .iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                vec!["invoice_number", "total_amount", "scenario"],
                vec!["PRN-0042", "310.0", "EE_DOM_13_ACC"],
            ]
        );

        let (status, _) = act(&deployment, id, "export", CONTROLLER, json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let response = deployment
            .router
            .clone()
            .oneshot(get(&format!("/api/v1/submissions/{id}"), SUBMITTER))
            .await
            .expect("route executes");
        let detail = read_json_body(response).await;
        let comments = detail["comments"].as_array().expect("comment list");
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0]["author_is_admin"], json!(true));
        assert_eq!(comments[1]["message"], json!("Guest names added"));
        assert!(detail["submission"]["exported_at"].is_string());
    }

    #[tokio::test]
    async fn late_reviewer_reopens_an_approved_submission() {
        let dir = tempfile::tempdir().expect("temp dir");
        let deployment = deploy(dir.path());
        let id = create(&deployment).await;
        for reviewer in [CONTROLLER, CFO] {
            act(&deployment, id, "approve", reviewer, json!({})).await;
        }

        let (status, payload) = act(
            &deployment,
            id,
            "reviewers",
            CONTROLLER,
            json!({"reviewer_id": AUDITOR}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["created"], json!(true));
        assert_eq!(payload["submission"]["status"], json!("pending"));
        assert_eq!(payload["submission"]["reviewed_by"], Value::Null);

        let (status, payload) = act(
            &deployment,
            id,
            "reviewers",
            CONTROLLER,
            json!({"reviewer_id": AUDITOR}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["created"], json!(false));
        assert_eq!(payload["review"]["review_summary"]["total"], json!(3));

        let (status, _) = act(&deployment, id, "export", CONTROLLER, json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, payload) = act(&deployment, id, "approve", AUDITOR, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["submission"]["status"], json!("approved"));
        assert_eq!(payload["submission"]["reviewed_by"], json!(AUDITOR));
    }

    #[tokio::test]
    async fn submitter_withdraws_a_pending_submission() {
        let dir = tempfile::tempdir().expect("temp dir");
        let deployment = deploy(dir.path());
        let id = create(&deployment).await;
        let response = deployment
            .router
            .clone()
            .oneshot(get(&format!("/api/v1/submissions/{id}"), SUBMITTER))
            .await
            .expect("route executes");
        let detail = read_json_body(response).await;
        let file = FileRef(
            detail["submission"]["invoice_file"]
                .as_str()
                .expect("file reference")
                .to_string(),
        );
        assert!(deployment.files.path_of(&file).is_file());

        let (status, _) = act(&deployment, id, "delete", SUBMITTER, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!deployment.files.path_of(&file).exists());

        let response = deployment
            .router
            .clone()
            .oneshot(get(&format!("/api/v1/submissions/{id}"), CONTROLLER))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
