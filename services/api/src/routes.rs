use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use triage_engine::workflows::triage::{
    triage_router, DialogueGenerator, TriageRepository, TriageService,
};

pub(crate) fn with_triage_routes<R, D>(service: Arc<TriageService<R, D>>) -> axum::Router
where
    R: TriageRepository + 'static,
    D: DialogueGenerator + 'static,
{
    triage_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::OpenAiDialogueClient;
    use crate::infra::InMemoryTriageRepository;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;
    use triage_engine::config::DialogueConfig;
    use triage_engine::workflows::triage::TriageStore;

    fn app(ready: bool) -> axum::Router {
        let store = Arc::new(TriageStore::open(Arc::new(
            InMemoryTriageRepository::default(),
        )));
        let dialogue = Arc::new(OpenAiDialogueClient::new(DialogueConfig::default()));
        let service = Arc::new(TriageService::new(store, dialogue));

        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_triage_routes(service).layer(Extension(state))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .expect("read body");
        serde_json::from_slice(&body).expect("json body")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn readiness_tracks_the_startup_flag() {
        let response = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app(true)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ready" }));
    }

    #[tokio::test]
    async fn triage_routes_are_mounted_alongside_probes() {
        let response = app(true)
            .oneshot(
                Request::get("/api/v1/triage/queue")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!([]));
    }

    #[tokio::test]
    async fn assisted_messages_without_a_key_ask_the_patient_to_retry() {
        let router = app(true);
        let request = |message: &str| {
            Request::post("/api/v1/triage/patients/p-1/assisted-messages")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "message": message }).to_string()))
                .expect("request")
        };

        let welcome = router
            .clone()
            .oneshot(request("hello"))
            .await
            .expect("response");
        assert_eq!(welcome.status(), StatusCode::OK);

        let retry = router
            .oneshot(request("I have a fever"))
            .await
            .expect("response");
        assert_eq!(retry.status(), StatusCode::OK);
        let body = body_json(retry).await;
        assert!(body["reply"]
            .as_str()
            .expect("reply text")
            .starts_with("I apologize"));
        assert_eq!(body["conversation_completed"], json!(false));
    }
}
