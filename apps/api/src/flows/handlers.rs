//! Axum route handlers for the Flow API.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::errors::AppError;
use crate::extract::AppJson;
use crate::flows::catalog::{DiagnoseFromScan, DiagnoseFromScanOutput, Flow};
use crate::flows::engine::{ExecuteOptions, FlowError};
use crate::flows::media::MediaRef;
use crate::flows::record::FlowInputRecord;
use crate::flows::schema::Schema;
use crate::state::AppState;

const SCAN_PART: &str = "scan";

// ────────────────────────────────────────────────────────────────────────────
// Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct FlowSummary {
    pub name: &'static str,
    pub description: &'static str,
    pub input: Schema,
    pub output: Schema,
}

#[derive(Debug, Serialize)]
pub struct FlowListResponse {
    pub flows: Vec<FlowSummary>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/flows
pub async fn handle_list_flows(State(state): State<AppState>) -> Json<FlowListResponse> {
    let flows = state
        .engine
        .catalog()
        .iter()
        .map(|definition| FlowSummary {
            name: definition.name(),
            description: definition.description(),
            input: definition.input_schema().clone(),
            output: definition.output_schema().clone(),
        })
        .collect();

    Json(FlowListResponse { flows })
}

/// POST /api/v1/flows/{flow}
///
/// The body is an untyped JSON object so that missing or malformed fields are
/// reported by the flow's own input validation.
pub async fn handle_run_flow<F: Flow>(
    State(state): State<AppState>,
    AppJson(body): AppJson<Value>,
) -> Result<Json<F::Output>, AppError> {
    let record = FlowInputRecord::from_json(body)
        .map_err(|e| FlowError::from_json_field(F::KIND.name(), e))?;

    let output = state
        .engine
        .run_record::<F>(&record, execute_options(&state))
        .await?;

    Ok(Json(output))
}

/// POST /api/v1/flows/diagnose-from-scan/upload
///
/// Multipart variant of the scan diagnosis: text parts `cropType` and
/// `historicalData`, and the image itself as the `scan` file part.
pub async fn handle_diagnose_upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DiagnoseFromScanOutput>, AppError> {
    let mut multipart = multipart.map_err(|e| AppError::rejected(e.status(), e.body_text()))?;
    let mut record = FlowInputRecord::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::rejected(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == SCAN_PART {
            let content_type = field.content_type().map(str::to_string).ok_or_else(|| {
                AppError::Validation("scan: file part has no content type".to_string())
            })?;
            let data = field.bytes().await.map_err(|e| {
                AppError::rejected(e.status(), format!("scan: {}", e.body_text()))
            })?;
            info!(
                "Received scan upload: {} ({} bytes)",
                content_type,
                data.len()
            );
            let media = MediaRef::from_bytes(&content_type, data)
                .map_err(|e| AppError::Validation(format!("scan: {e}")))?;
            record.insert("cropScanDataUri", media);
        } else {
            let text = field.text().await.map_err(|e| {
                AppError::rejected(e.status(), format!("{name}: {}", e.body_text()))
            })?;
            record.insert(name, text);
        }
    }

    let output = state
        .engine
        .run_record::<DiagnoseFromScan>(&record, execute_options(&state))
        .await?;

    Ok(Json(output))
}

fn execute_options(state: &AppState) -> ExecuteOptions {
    ExecuteOptions::default().with_timeout(state.config.generation_timeout)
}
