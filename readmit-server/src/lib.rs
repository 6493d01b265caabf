//! HTTP surface for the readmission risk service.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use readmit_core::{
    EncounterRecord, HealthReport, ModelInfoReport, PredictionResponse, ReadmitError,
};
use readmit_model::{predict, RiskEstimator};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub mod error;

use error::{ApiError, ApiResult};

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    estimator: Arc<RiskEstimator>,
}

impl AppState {
    pub fn new(estimator: RiskEstimator) -> Self {
        Self {
            estimator: Arc::new(estimator),
        }
    }

    pub fn model_available(&self) -> bool {
        self.estimator.model_available()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/predict", post(predict_readmission))
        .route("/health", get(health))
        .route("/model-info", get(model_info))
        .layer(middleware::from_fn(log_requests))
        .layer(cors)
        .with_state(state)
}

async fn predict_readmission(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<PredictionResponse>> {
    let raw = std::str::from_utf8(&body)
        .map_err(|err| ReadmitError::Parse(format!("body is not valid UTF-8: {err}")))?;
    let record = EncounterRecord::from_json_str(raw)?;

    let outcome = predict(&state.estimator, &record).map_err(|err| {
        warn!(error = %err, "prediction failed");
        ApiError::from(err)
    })?;

    info!(
        prediction = %outcome.prediction,
        confidence = %outcome.confidence,
        model_available = state.model_available(),
        "prediction served"
    );
    Ok(Json(PredictionResponse::new(outcome, state.model_available())))
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport::healthy(state.model_available()))
}

async fn model_info(State(state): State<AppState>) -> Json<ModelInfoReport> {
    Json(ModelInfoReport::new(state.estimator.model_info()))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status >= 400 {
        warn!(
            method = %method,
            path = %path,
            status,
            duration_ms,
            "Request completed with error"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status,
            duration_ms,
            "Request completed"
        );
    }
    response
}
