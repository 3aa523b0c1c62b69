// Prompt templates for the AgriSense flows.
// Slots: {{{field}}} for text, {{media url=field}} for images.
// Every slot must name an input field of its flow; FlowDefinition::new checks this at startup.

pub const DIAGNOSE_FROM_SCAN_ROLE: &str =
    "You are an AI assistant specialised in diagnosing crop diseases and field issues \
    from crop scans and historical field data.";

pub const DIAGNOSE_FROM_SCAN_PROMPT: &str = r#"Analyze the crop scan and the historical data below to identify diseases or other issues affecting the crop.

Crop Type: {{{cropType}}}

Crop Scan:
{{media url=cropScanDataUri}}

Historical Data: {{{historicalData}}}

Return:
- diagnosis: the disease or issue you identified
- severityLevel: exactly one of "Low", "Medium" or "High"
- reasoning: the reasoning steps that led to the diagnosis
- treatmentRecommendations: treatment recommendations for the diagnosed issue"#;

pub const DIAGNOSE_WITH_REASONING_ROLE: &str =
    "You are an AI assistant that diagnoses crop diseases and issues from crop scans \
    and historical data, and explains its reasoning so farmers can trust and learn from the result.";

pub const DIAGNOSE_WITH_REASONING_PROMPT: &str = r#"Diagnose the issue visible in this crop scan. Include the reasoning steps you used to reach your conclusion, give a confidence level for the diagnosis between 0 and 1, and suggest a treatment.

Crop Scan: {{media url=scanDataUri}}
Historical Data: {{{historicalData}}}"#;

pub const TREATMENT_RECOMMENDATIONS_ROLE: &str = "You are an expert agricultural advisor.";

pub const TREATMENT_RECOMMENDATIONS_PROMPT: &str = r#"Based on the AI diagnosis, crop type and environmental conditions below, recommend specific treatments that resolve the crop issue.

AI Diagnosis: {{{diagnosis}}}
Crop Type: {{{cropType}}}
Environmental Conditions: {{{environmentalConditions}}}

Return the recommendations as an ordered list, most urgent first, and explain why each treatment is recommended."#;

pub const YIELD_FORECAST_ROLE: &str =
    "You are an expert agricultural consultant specialising in crop yield forecasting.";

pub const YIELD_FORECAST_PROMPT: &str = r#"Use the current and historical data below to forecast the yield of this crop.

Crop Type: {{{cropType}}}
Current Data: {{{currentData}}}
Historical Data: {{{historicalData}}}

Provide the predicted yield, a confidence interval for it, expected losses given current weather, soil and disease conditions, the factors influencing the yield, and recommendations for improving it."#;

pub const PREDICT_CROP_RISK_ROLE: &str = "You are an agricultural risk assessment AI.";

pub const PREDICT_CROP_RISK_PROMPT: &str = r#"Analyze the weather data for this crop and region and predict threats to the crop.

Crop: {{{cropType}}}
Region: {{{region}}}
Weather Data: {{{weatherData}}}

Give a risk level (exactly one of "Low", "Medium", "High" or "Critical"), a description of the threat including its type (e.g. fungal disease, pest infestation, heat stress), and clear, actionable recommendations for the farmer or administrator to mitigate it."#;
