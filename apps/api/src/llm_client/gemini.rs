//! Gemini `generateContent` implementation of [`GenerationService`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{GenerationError, GenerationRequest, GenerationResponse, GenerationService, Usage};
use crate::flows::schema::{FieldKind, FieldSpec, Schema};
use crate::flows::template::PromptPart;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate, if it has any.
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Client for the Gemini REST API. Cheap to clone.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }

    fn classify(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else {
            GenerationError::Http(err)
        }
    }
}

#[async_trait]
impl GenerationService for GeminiClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let body = build_request(request);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();

        if status.as_u16() == 429 {
            warn!("Gemini rate limited flow {}", request.flow);
            return Err(GenerationError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        let parsed = parse_envelope(&body)?;
        let usage = parsed.usage_metadata.as_ref().map_or_else(Usage::default, |u| Usage {
            input_tokens: u.prompt_token_count,
            output_tokens: u.candidates_token_count,
        });

        debug!(
            "Gemini call succeeded: flow={}, finish_reason={:?}, input_tokens={}, output_tokens={}",
            request.flow,
            parsed.candidates.first().and_then(|c| c.finish_reason.as_deref()),
            usage.input_tokens,
            usage.output_tokens
        );

        Ok(GenerationResponse {
            text: parsed.text(),
            usage,
        })
    }
}

fn parse_envelope(body: &str) -> Result<GeminiResponse, GenerationError> {
    serde_json::from_str(body).map_err(|e| GenerationError::MalformedResponse(e.to_string()))
}

fn build_request(request: &GenerationRequest) -> GeminiRequest<'_> {
    let parts = request
        .parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => GeminiPart::Text { text },
            PromptPart::Media(media) => GeminiPart::InlineData {
                inline_data: InlineData {
                    mime_type: media.mime_type(),
                    data: media.base64_data(),
                },
            },
        })
        .collect();

    GeminiRequest {
        system_instruction: GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text {
                text: &request.system,
            }],
        },
        contents: vec![GeminiContent {
            role: Some("user"),
            parts,
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: response_schema(&request.output_schema),
        },
    }
}

/// Translates a flow schema into Gemini's OpenAPI-subset response schema.
fn response_schema(schema: &Schema) -> Value {
    let names: Vec<&str> = schema.fields().iter().map(|f| f.name).collect();
    let properties: Map<String, Value> = schema
        .fields()
        .iter()
        .map(|f| (f.name.to_string(), field_schema(f)))
        .collect();

    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": names,
        "propertyOrdering": names,
    })
}

fn field_schema(spec: &FieldSpec) -> Value {
    match &spec.kind {
        FieldKind::Text { .. } | FieldKind::Media { .. } => {
            json!({ "type": "STRING", "description": spec.description })
        }
        FieldKind::Number => json!({ "type": "NUMBER", "description": spec.description }),
        FieldKind::Category { values } => json!({
            "type": "STRING",
            "format": "enum",
            "enum": values,
            "description": spec.description,
        }),
        FieldKind::TextList => json!({
            "type": "ARRAY",
            "items": { "type": "STRING" },
            "description": spec.description,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::media::MediaRef;

    fn request() -> GenerationRequest {
        GenerationRequest {
            flow: "diagnose-from-scan".to_string(),
            system: "You are an agronomist.".to_string(),
            parts: vec![
                PromptPart::Text("Crop Scan:\n".to_string()),
                PromptPart::Media(MediaRef::parse("data:image/png;base64,AAAA").unwrap()),
                PromptPart::Text("\nHistorical Data: none".to_string()),
            ],
            output_schema: Schema::new(vec![
                FieldSpec::text("diagnosis", "The diagnosis."),
                FieldSpec::category("severityLevel", &["Low", "Medium", "High"], "Severity."),
                FieldSpec::number("confidenceLevel", "Confidence."),
                FieldSpec::text_list("recommendations", "Steps."),
            ]),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let req = request();
        let body = serde_json::to_value(build_request(&req)).unwrap();

        assert_eq!(
            body["systemInstruction"],
            json!({"parts": [{"text": "You are an agronomist."}]})
        );
        assert_eq!(body["contents"][0]["role"], "user");
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], json!({"text": "Crop Scan:\n"}));
        assert_eq!(
            parts[1],
            json!({"inlineData": {"mimeType": "image/png", "data": "AAAA"}})
        );
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn test_response_schema_from_flow_schema() {
        let schema = response_schema(&request().output_schema);
        assert_eq!(schema["type"], "OBJECT");
        assert_eq!(
            schema["required"],
            json!(["diagnosis", "severityLevel", "confidenceLevel", "recommendations"])
        );
        assert_eq!(
            schema["properties"]["severityLevel"]["enum"],
            json!(["Low", "Medium", "High"])
        );
        assert_eq!(schema["properties"]["confidenceLevel"]["type"], "NUMBER");
        assert_eq!(
            schema["properties"]["recommendations"]["items"]["type"],
            "STRING"
        );
    }

    #[test]
    fn test_response_text_from_first_candidate() {
        let parsed: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "{\"diagnosis\":"}, {"text": "\"Leaf spot\"}"}]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 40}
        }))
        .unwrap();
        assert_eq!(parsed.text().as_deref(), Some("{\"diagnosis\":\"Leaf spot\"}"));
        assert_eq!(parsed.usage_metadata.unwrap().prompt_token_count, 120);
    }

    #[test]
    fn test_unreadable_envelope_is_malformed_response() {
        let err = parse_envelope("<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));

        let err = parse_envelope(r#"{"candidates": "none"}"#).unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));
    }

    #[test]
    fn test_blocked_response_has_no_text() {
        let parsed: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(parsed.text().is_none());

        let parsed: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))
        .unwrap();
        assert!(parsed.text().is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = GeminiClient::new(
            "key".to_string(),
            "https://generativelanguage.googleapis.com/v1beta/".to_string(),
            "gemini-2.5-flash".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
