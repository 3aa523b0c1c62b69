pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::Uri,
    routing::{get, post},
    Router,
};

use crate::auth::handlers as auth;
use crate::errors::AppError;
use crate::flows::catalog::{
    DiagnoseFromScan, DiagnoseWithReasoning, PredictCropRisk, TreatmentRecommendations,
    YieldForecast,
};
use crate::flows::handlers as flows;
use crate::state::AppState;

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {uri}"))
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Flow API
        .route("/api/v1/flows", get(flows::handle_list_flows))
        .route(
            "/api/v1/flows/diagnose-from-scan",
            post(flows::handle_run_flow::<DiagnoseFromScan>),
        )
        .route(
            "/api/v1/flows/diagnose-from-scan/upload",
            post(flows::handle_diagnose_upload),
        )
        .route(
            "/api/v1/flows/diagnose-with-reasoning",
            post(flows::handle_run_flow::<DiagnoseWithReasoning>),
        )
        .route(
            "/api/v1/flows/treatment-recommendations",
            post(flows::handle_run_flow::<TreatmentRecommendations>),
        )
        .route(
            "/api/v1/flows/yield-forecast",
            post(flows::handle_run_flow::<YieldForecast>),
        )
        .route(
            "/api/v1/flows/predict-crop-risk",
            post(flows::handle_run_flow::<PredictCropRisk>),
        )
        // Auth API
        .route("/api/v1/auth/login", post(auth::handle_login))
        .fallback(not_found)
        // Applies to multipart uploads and inline data URIs alike.
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::llm_client::stub::StubGenerationService;
    use crate::state::test_state;

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state(StubGenerationService::replying_nothing()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "agrisense-api");
    }

    #[tokio::test]
    async fn test_unknown_flow_is_404_with_error_body() {
        let app = build_router(test_state(StubGenerationService::replying_nothing()));
        let request = Request::post("/api/v1/flows/irrigation-plan")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let stub = StubGenerationService::replying_nothing();
        let app = build_router(test_state(stub.clone()));
        let huge = format!(
            "{{\"cropType\":\"Rice\",\"region\":\"Davao\",\"weatherData\":\"{}\"}}",
            "x".repeat(2 * 1024 * 1024)
        );
        let request = Request::post("/api/v1/flows/predict-crop-risk")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(huge))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(stub.calls(), 0);
    }
}
