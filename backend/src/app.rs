//! Minimal HTTP surface (§6): health checks plus manual job-trigger
//! endpoints. The CRUD/REST API over the entities of §3 is the
//! out-of-scope external collaborator (§1) — this only exposes the
//! in-process operations §4.8 already names.
//!
//! Grounded on the teacher's `api/health.rs` (`healthz`/`readyz`
//! handlers, `Router<AppState>` builder) generalized from a DB-ping
//! readiness check to a Scheduler-trigger surface.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::context::AppContext;
use crate::scheduler::Scheduler;
use crate::store::JobOutcome;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
    pub scheduler: Arc<Scheduler>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    store: bool,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", version: env!("CARGO_PKG_VERSION") })
}

async fn readyz(State(state): State<AppState>) -> Json<ReadyResponse> {
    let store_ok = state.ctx.series.list_active().await.is_ok();
    Json(ReadyResponse { ready: store_ok, store: store_ok })
}

#[derive(Serialize)]
struct TriggerResponse {
    job: String,
    outcome: &'static str,
}

async fn trigger_job(State(state): State<AppState>, Path(job_name): Path<String>) -> Result<Json<TriggerResponse>, StatusCode> {
    match state.scheduler.trigger(&job_name).await {
        Ok(outcome) => Ok(Json(TriggerResponse { job: job_name, outcome: outcome_label(outcome) })),
        Err(err) if matches!(err, crate::error::TcmError::NotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

async fn cancel_job(State(state): State<AppState>, Path(job_name): Path<String>) -> StatusCode {
    state.scheduler.cancel(&job_name);
    StatusCode::ACCEPTED
}

fn outcome_label(outcome: JobOutcome) -> &'static str {
    match outcome {
        JobOutcome::Ok => "ok",
        JobOutcome::Error => "error",
        JobOutcome::Cancelled => "cancelled",
        JobOutcome::Overlap => "overlap",
        JobOutcome::Disabled => "disabled",
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/jobs/{job_name}/trigger", post(trigger_job))
        .route("/jobs/{job_name}/cancel", post(cancel_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::assets::compression::JpegCompressor;
    use crate::cardtype::CardTypeLoader;
    use crate::connectors::ConnectorRegistry;
    use crate::security::CredentialCipher;
    use crate::store::sqlite::Store;

    struct NoopCompressor;
    impl JpegCompressor for NoopCompressor {
        fn recompress(&self, bytes: &[u8], _quality: u8) -> Result<Vec<u8>, crate::error::TcmError> {
            Ok(bytes.to_vec())
        }
    }

    async fn state() -> AppState {
        let cipher = CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap();
        let store = Store::connect("sqlite::memory:", cipher).await.unwrap();
        let connectors = Arc::new(ConnectorRegistry::new());
        let card_types = Arc::new(CardTypeLoader::new(reqwest::Client::new(), "https://example.invalid".to_string(), std::env::temp_dir()));
        let ctx = Arc::new(AppContext::new(crate::config::Config::default(), &store, connectors, card_types, Arc::new(NoopCompressor)));
        AppState { scheduler: Arc::new(Scheduler::new(ctx.job_runs.clone())), ctx }
    }

    #[tokio::test]
    async fn healthz_reports_healthy() {
        let app = router().with_state(state().await);
        let response = app.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_reports_ready_when_the_store_answers() {
        let app = router().with_state(state().await);
        let response = app.oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn triggering_an_unknown_job_is_not_found() {
        let app = router().with_state(state().await);
        let response = app.oneshot(Request::builder().method("POST").uri("/jobs/does-not-exist/trigger").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
