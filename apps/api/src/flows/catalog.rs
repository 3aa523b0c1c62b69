//! The five AgriSense flows: declarations, typed records and caller-facing functions.
//!
//! Each flow is data: a [`FlowDefinition`] built in [`FlowCatalog::load`].
//! The typed wrappers all go through [`FlowEngine::run`].

#![allow(dead_code)]

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::flows::engine::{DefinitionError, ExecuteOptions, FlowDefinition, FlowEngine, FlowError};
use crate::flows::prompts::*;
use crate::flows::schema::{FieldSpec, Schema};
use crate::llm_client::prompts::system_instruction;

const SEVERITY_LEVELS: &[&str] = &["Low", "Medium", "High"];
const RISK_LEVELS: &[&str] = &["Low", "Medium", "High", "Critical"];

const SCAN_DESCRIPTION: &str = "A crop scan, as a data URI that must include a MIME type and use \
    Base64 encoding. Expected format: 'data:<mimetype>;base64,<encoded_data>'.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowKind {
    DiagnoseFromScan,
    DiagnoseWithReasoning,
    TreatmentRecommendations,
    YieldForecast,
    PredictCropRisk,
}

impl FlowKind {
    pub const ALL: [FlowKind; 5] = [
        FlowKind::DiagnoseFromScan,
        FlowKind::DiagnoseWithReasoning,
        FlowKind::TreatmentRecommendations,
        FlowKind::YieldForecast,
        FlowKind::PredictCropRisk,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FlowKind::DiagnoseFromScan => "diagnose-from-scan",
            FlowKind::DiagnoseWithReasoning => "diagnose-with-reasoning",
            FlowKind::TreatmentRecommendations => "treatment-recommendations",
            FlowKind::YieldForecast => "yield-forecast",
            FlowKind::PredictCropRisk => "predict-crop-risk",
        }
    }
}

/// Ties a typed input/output pair to a catalog entry.
pub trait Flow {
    const KIND: FlowKind;
    type Input: Serialize + Send + Sync;
    type Output: DeserializeOwned + Serialize + Send;
}

// ────────────────────────────────────────────────────────────────────────────
// Typed records
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseFromScanInput {
    pub crop_type: String,
    pub crop_scan_data_uri: String,
    pub historical_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseFromScanOutput {
    pub diagnosis: String,
    pub severity_level: Severity,
    pub reasoning: String,
    pub treatment_recommendations: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseWithReasoningInput {
    pub scan_data_uri: String,
    pub historical_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnoseWithReasoningOutput {
    pub diagnosis: String,
    pub confidence_level: f64,
    pub suggested_treatment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentRecommendationsInput {
    pub diagnosis: String,
    pub crop_type: String,
    pub environmental_conditions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentRecommendationsOutput {
    pub recommendations: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldForecastInput {
    pub crop_type: String,
    pub current_data: String,
    pub historical_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YieldForecastOutput {
    pub predicted_yield: String,
    pub confidence_interval: String,
    pub expected_losses: String,
    pub factors_influencing_yield: String,
    pub recommendations: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictCropRiskInput {
    pub crop_type: String,
    pub region: String,
    pub weather_data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictCropRiskOutput {
    pub risk_level: RiskLevel,
    pub risk_description: String,
    pub recommendations: String,
}

pub struct DiagnoseFromScan;
pub struct DiagnoseWithReasoning;
pub struct TreatmentRecommendations;
pub struct YieldForecast;
pub struct PredictCropRisk;

impl Flow for DiagnoseFromScan {
    const KIND: FlowKind = FlowKind::DiagnoseFromScan;
    type Input = DiagnoseFromScanInput;
    type Output = DiagnoseFromScanOutput;
}

impl Flow for DiagnoseWithReasoning {
    const KIND: FlowKind = FlowKind::DiagnoseWithReasoning;
    type Input = DiagnoseWithReasoningInput;
    type Output = DiagnoseWithReasoningOutput;
}

impl Flow for TreatmentRecommendations {
    const KIND: FlowKind = FlowKind::TreatmentRecommendations;
    type Input = TreatmentRecommendationsInput;
    type Output = TreatmentRecommendationsOutput;
}

impl Flow for YieldForecast {
    const KIND: FlowKind = FlowKind::YieldForecast;
    type Input = YieldForecastInput;
    type Output = YieldForecastOutput;
}

impl Flow for PredictCropRisk {
    const KIND: FlowKind = FlowKind::PredictCropRisk;
    type Input = PredictCropRiskInput;
    type Output = PredictCropRiskOutput;
}

// ────────────────────────────────────────────────────────────────────────────
// Catalog
// ────────────────────────────────────────────────────────────────────────────

/// All flow definitions, validated once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct FlowCatalog {
    diagnose_from_scan: FlowDefinition,
    diagnose_with_reasoning: FlowDefinition,
    treatment_recommendations: FlowDefinition,
    yield_forecast: FlowDefinition,
    predict_crop_risk: FlowDefinition,
}

impl FlowCatalog {
    pub fn load() -> Result<Self, DefinitionError> {
        Ok(Self {
            diagnose_from_scan: FlowDefinition::new(
                FlowKind::DiagnoseFromScan.name(),
                "Diagnoses crop diseases and issues from an uploaded scan, with severity, reasoning and treatment.",
                system_instruction(DIAGNOSE_FROM_SCAN_ROLE),
                DIAGNOSE_FROM_SCAN_PROMPT,
                Schema::new(vec![
                    FieldSpec::text("cropType", "The type of crop in the scan."),
                    FieldSpec::image("cropScanDataUri", SCAN_DESCRIPTION),
                    FieldSpec::free_text(
                        "historicalData",
                        "Historical data about the crop and field.",
                    ),
                ]),
                Schema::new(vec![
                    FieldSpec::text("diagnosis", "The diagnosis of potential diseases or issues."),
                    FieldSpec::category(
                        "severityLevel",
                        SEVERITY_LEVELS,
                        "The severity of the diagnosed issue.",
                    ),
                    FieldSpec::text(
                        "reasoning",
                        "The reasoning steps used to arrive at the diagnosis.",
                    ),
                    FieldSpec::text(
                        "treatmentRecommendations",
                        "Treatment recommendations for the diagnosed issues.",
                    ),
                ]),
            )?,
            diagnose_with_reasoning: FlowDefinition::new(
                FlowKind::DiagnoseWithReasoning.name(),
                "Diagnoses a crop issue from a scan with a confidence level and suggested treatment.",
                system_instruction(DIAGNOSE_WITH_REASONING_ROLE),
                DIAGNOSE_WITH_REASONING_PROMPT,
                Schema::new(vec![
                    FieldSpec::image("scanDataUri", SCAN_DESCRIPTION),
                    FieldSpec::free_text("historicalData", "The historical data of the crop."),
                ]),
                Schema::new(vec![
                    FieldSpec::text(
                        "diagnosis",
                        "The diagnosis of the crop issue, including reasoning steps.",
                    ),
                    FieldSpec::number("confidenceLevel", "The confidence level of the diagnosis."),
                    FieldSpec::text(
                        "suggestedTreatment",
                        "The suggested treatment for the diagnosed issue.",
                    ),
                ]),
            )?,
            treatment_recommendations: FlowDefinition::new(
                FlowKind::TreatmentRecommendations.name(),
                "Recommends treatments for a diagnosed crop issue.",
                system_instruction(TREATMENT_RECOMMENDATIONS_ROLE),
                TREATMENT_RECOMMENDATIONS_PROMPT,
                Schema::new(vec![
                    FieldSpec::text("diagnosis", "The AI diagnosis of the crop issue."),
                    FieldSpec::text("cropType", "The type of crop affected."),
                    FieldSpec::text(
                        "environmentalConditions",
                        "The current environmental conditions (e.g. temperature, humidity).",
                    ),
                ]),
                Schema::new(vec![
                    FieldSpec::text_list(
                        "recommendations",
                        "Treatment recommendations for the diagnosed crop issue, most urgent first.",
                    ),
                    FieldSpec::text(
                        "reasoning",
                        "Explanation of why those treatments were recommended.",
                    ),
                ]),
            )?,
            yield_forecast: FlowDefinition::new(
                FlowKind::YieldForecast.name(),
                "Forecasts crop yield from current and historical data.",
                system_instruction(YIELD_FORECAST_ROLE),
                YIELD_FORECAST_PROMPT,
                Schema::new(vec![
                    FieldSpec::text("cropType", "The type of crop to forecast yield for."),
                    FieldSpec::text(
                        "currentData",
                        "Current data for the crop: planting date, soil conditions, weather data and anything else relevant.",
                    ),
                    FieldSpec::free_text(
                        "historicalData",
                        "Historical yield data for the crop: past yields and growing conditions.",
                    ),
                ]),
                Schema::new(vec![
                    FieldSpec::text("predictedYield", "The predicted yield for the crop."),
                    FieldSpec::text(
                        "confidenceInterval",
                        "A confidence interval for the predicted yield.",
                    ),
                    FieldSpec::text(
                        "expectedLosses",
                        "Expected losses based on current conditions, weather, soil and disease data.",
                    ),
                    FieldSpec::text(
                        "factorsInfluencingYield",
                        "Factors influencing the yield, such as weather, soil conditions and pest pressure.",
                    ),
                    FieldSpec::text("recommendations", "Recommendations for improving the yield."),
                ]),
            )?,
            predict_crop_risk: FlowDefinition::new(
                FlowKind::PredictCropRisk.name(),
                "Predicts crop risk for a region from weather data.",
                system_instruction(PREDICT_CROP_RISK_ROLE),
                PREDICT_CROP_RISK_PROMPT,
                Schema::new(vec![
                    FieldSpec::text("cropType", "The type of crop being analyzed."),
                    FieldSpec::text("region", "The geographical region of the crop."),
                    FieldSpec::text(
                        "weatherData",
                        "Current and forecast weather data (e.g. temperature, humidity, rainfall).",
                    ),
                ]),
                Schema::new(vec![
                    FieldSpec::category("riskLevel", RISK_LEVELS, "The predicted risk level."),
                    FieldSpec::text(
                        "riskDescription",
                        "A description of the predicted risk, including the type of threat (e.g. fungal, pest, climate).",
                    ),
                    FieldSpec::text(
                        "recommendations",
                        "Actionable recommendations to mitigate the predicted risk.",
                    ),
                ]),
            )?,
        })
    }

    pub fn get(&self, kind: FlowKind) -> &FlowDefinition {
        match kind {
            FlowKind::DiagnoseFromScan => &self.diagnose_from_scan,
            FlowKind::DiagnoseWithReasoning => &self.diagnose_with_reasoning,
            FlowKind::TreatmentRecommendations => &self.treatment_recommendations,
            FlowKind::YieldForecast => &self.yield_forecast,
            FlowKind::PredictCropRisk => &self.predict_crop_risk,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowDefinition> {
        FlowKind::ALL.into_iter().map(|kind| self.get(kind))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Caller-facing functions
// ────────────────────────────────────────────────────────────────────────────

pub async fn diagnose_from_scan(
    engine: &FlowEngine,
    input: &DiagnoseFromScanInput,
) -> Result<DiagnoseFromScanOutput, FlowError> {
    engine
        .run::<DiagnoseFromScan>(input, ExecuteOptions::default())
        .await
}

pub async fn diagnose_with_reasoning(
    engine: &FlowEngine,
    input: &DiagnoseWithReasoningInput,
) -> Result<DiagnoseWithReasoningOutput, FlowError> {
    engine
        .run::<DiagnoseWithReasoning>(input, ExecuteOptions::default())
        .await
}

pub async fn treatment_recommendations(
    engine: &FlowEngine,
    input: &TreatmentRecommendationsInput,
) -> Result<TreatmentRecommendationsOutput, FlowError> {
    engine
        .run::<TreatmentRecommendations>(input, ExecuteOptions::default())
        .await
}

pub async fn yield_forecast(
    engine: &FlowEngine,
    input: &YieldForecastInput,
) -> Result<YieldForecastOutput, FlowError> {
    engine
        .run::<YieldForecast>(input, ExecuteOptions::default())
        .await
}

pub async fn predict_crop_risk(
    engine: &FlowEngine,
    input: &PredictCropRiskInput,
) -> Result<PredictCropRiskOutput, FlowError> {
    engine
        .run::<PredictCropRisk>(input, ExecuteOptions::default())
        .await
}
