use crate::cli::ServeArgs;
use crate::dialogue::OpenAiDialogueClient;
use crate::infra::{AppState, JsonFileRepository};
use crate::routes::with_triage_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use triage_engine::config::AppConfig;
use triage_engine::error::AppError;
use triage_engine::telemetry;
use triage_engine::workflows::triage::{TriageService, TriageStore};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(data_file) = args.data_file.take() {
        config.storage.data_file = data_file;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(JsonFileRepository::new(config.storage.data_file.clone()));
    let store = Arc::new(TriageStore::open(repository));
    let dialogue = Arc::new(OpenAiDialogueClient::new(config.dialogue.clone()));
    let assisted_intake = dialogue.is_enabled();
    let triage_service = Arc::new(TriageService::new(store, dialogue));

    let app = with_triage_routes(triage_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        data_file = %config.storage.data_file.display(),
        assisted_intake,
        "patient triage service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
