use crate::cli::ServeArgs;
use crate::infra::{load_seed, AppState};
use crate::routes::with_service_routes;
use axum::{Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use invoice_review::config::{AppConfig, StoreKind};
use invoice_review::error::AppError;
use invoice_review::tasks::task_runner;
use invoice_review::telemetry;
use invoice_review::workflows::intake::IntakePipeline;
use invoice_review::workflows::review::{
    review_router, CsvLedgerSink, LocalFileStore, MembershipDirectory, MemoryStore,
    ReviewWorkflow, SqliteStore, SubmissionStore, WorkflowAdapters,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let runner = task_runner(config.tasks);
    info!(runner = runner.name(), "task runner selected");
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        intake: Arc::new(IntakePipeline::new(runner)),
    };

    let seed = load_seed(config.store.seed_file.as_deref())?;
    let adapters = WorkflowAdapters {
        files: Arc::new(LocalFileStore::new(config.files.storage_dir.clone())),
        credentials: seed.credentials(),
        sink: Arc::new(CsvLedgerSink::new(config.export.ledger_dir.clone())),
        export_fields: config.export.fields.clone(),
    };

    let review = match config.store.kind {
        StoreKind::Memory => {
            let store = Arc::new(MemoryStore::new());
            for membership in seed.memberships() {
                store.add_membership(membership)?;
            }
            workflow_routes(store, adapters)
        }
        StoreKind::Sqlite => {
            let store = Arc::new(SqliteStore::open(
                &config.store.database_path,
                config.store.lock_timeout,
            )?);
            for membership in seed.memberships() {
                store.add_membership(&membership)?;
            }
            workflow_routes(store, adapters)
        }
    };

    let app = with_service_routes(review)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        store = ?config.store.kind,
        "invoice review service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn workflow_routes<S>(store: Arc<S>, adapters: WorkflowAdapters) -> Router
where
    S: SubmissionStore + MembershipDirectory + 'static,
{
    review_router(Arc::new(ReviewWorkflow::new(store.clone(), store, adapters)))
}

