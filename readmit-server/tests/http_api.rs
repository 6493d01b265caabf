use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::DateTime;
use readmit_core::FEATURE_NAMES;
use readmit_model::{parse_artifact, RiskEstimator};
use readmit_server::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn fallback_app() -> Router {
    router(AppState::new(RiskEstimator::heuristic(Some(11))))
}

fn model_app() -> Router {
    let names: Vec<&str> = FEATURE_NAMES.to_vec();
    let artifact = parse_artifact(
        &json!({
            "kind": "logistic_regression",
            "feature_names": names,
            "coefficients": [0.05, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            "intercept": -4.0
        })
        .to_string(),
    )
    .expect("artifact");
    router(AppState::new(RiskEstimator::with_classifier(Arc::new(
        artifact,
    ))))
}

fn arity_mismatch_app() -> Router {
    let artifact = parse_artifact(
        &json!({
            "kind": "logistic_regression",
            "coefficients": [0.05, 0.1, 0.2],
            "intercept": -4.0
        })
        .to_string(),
    )
    .expect("artifact");
    router(AppState::new(RiskEstimator::with_classifier(Arc::new(
        artifact,
    ))))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).expect("JSON body");
    (status, value)
}

fn post_predict(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn empty_object_is_rejected() {
    let (status, body) = send(fallback_app(), post_predict("{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No data provided"}));
}

#[tokio::test]
async fn missing_body_is_rejected() {
    let (status, body) = send(fallback_app(), post_predict("")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No data provided"}));
}

#[tokio::test]
async fn falsy_payloads_are_rejected_as_missing_data() {
    for payload in ["[]", "\"\"", "0", "false"] {
        let (status, body) = send(fallback_app(), post_predict(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(body, json!({"error": "No data provided"}), "{payload}");
    }
}

#[tokio::test]
async fn malformed_json_is_a_client_error() {
    let (status, body) = send(fallback_app(), post_predict("{\"age\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().expect("error message");
    assert!(message.starts_with("Invalid JSON body:"), "{message}");
}

#[tokio::test]
async fn non_numeric_feature_is_a_server_error() {
    let (status, body) = send(fallback_app(), post_predict(r#"{"age": "old"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": "Prediction failed: could not convert feature 'age' to a number: \"old\""})
    );
}

#[tokio::test]
async fn fallback_prediction_has_full_shape() {
    let (status, body) = send(
        fallback_app(),
        post_predict(
            r#"{"age": 70, "length_of_stay": 10, "num_lab_procedures": 4,
                "num_other_procedures": 1, "previous_inpatient_stays": 2,
                "emergency_visits": 1, "diabetes_medication": "YES"}"#,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], json!("Yes"));
    assert_eq!(body["confidence"], json!("mock"));
    assert_eq!(body["model_available"], json!(false));
    assert_eq!(
        body["risk_factors"],
        json!({
            "age": 70,
            "length_of_stay": 10,
            "previous_hospitalizations": 2,
            "emergency_visits": 1,
            "diabetes_medication": true,
            "total_procedures": 5
        })
    );
    let timestamp = body["timestamp"].as_str().expect("timestamp");
    assert!(DateTime::parse_from_rfc3339(timestamp).is_ok(), "{timestamp}");
}

#[tokio::test]
async fn classifier_prediction_reports_probability() {
    let (status, body) = send(model_app(), post_predict(r#"{"age": 30}"#)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], json!("No"));
    assert_eq!(body["model_available"], json!(true));
    let confidence = body["confidence"].as_str().expect("confidence");
    assert!(confidence.ends_with('%'), "{confidence}");
}

#[tokio::test]
async fn classifier_arity_mismatch_is_a_server_error() {
    let (status, body) = send(arity_mismatch_app(), post_predict(r#"{"age": 30}"#)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"error": "Prediction failed: X has 15 features, but LogisticRegression is expecting 3 features as input"})
    );
}

#[tokio::test]
async fn health_without_model_lists_features() {
    let (status, body) = send(fallback_app(), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["model_available"], json!(false));
    assert_eq!(body["expected_features"], json!(FEATURE_NAMES));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn model_info_without_model() {
    let (status, body) = send(fallback_app(), get("/model-info")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_available"], json!(false));
    assert_eq!(
        body["message"],
        json!("Model not available - using rule-based fallback")
    );
}

#[tokio::test]
async fn model_info_with_model() {
    let (status, body) = send(model_app(), get("/model-info")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_available"], json!(true));
    assert_eq!(body["model_type"], json!("LogisticRegression"));
    assert_eq!(body["n_features"], json!(15));
    assert_eq!(body["n_classes"], json!(2));
    assert_eq!(body["feature_names"], json!(FEATURE_NAMES));
    assert!(body.get("message").is_none());
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://localhost:8080")
        .body(Body::empty())
        .expect("request");
    let response = fallback_app().oneshot(request).await.expect("response");

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok()),
        Some("*")
    );
}
