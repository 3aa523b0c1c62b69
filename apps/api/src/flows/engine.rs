//! Prompt flow engine: executes any [`FlowDefinition`] against an input record.
//!
//! Every invocation runs the same stages:
//! Validating -> Rendering -> Dispatching -> ParsingResponse -> Succeeded | Failed.
//! Only Dispatching suspends. Nothing is retried here; failures are returned
//! to the caller with the stage and field that caused them.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::flows::catalog::{Flow, FlowCatalog};
use crate::flows::record::{FlowInputRecord, FlowOutputRecord, JsonFieldError};
use crate::flows::schema::{FieldKind, Schema, SchemaViolation};
use crate::flows::template::{PromptTemplate, SlotKind, TemplateError};
use crate::llm_client::{
    strip_json_fences, GenerationError, GenerationRequest, GenerationResponse, GenerationService,
};

const INPUT_FIELD: &str = "<input>";
const RESPONSE_FIELD: &str = "<response>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Validating,
    Rendering,
    Dispatching,
    ParsingResponse,
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowStage::Validating => "validating",
            FlowStage::Rendering => "rendering",
            FlowStage::Dispatching => "dispatching",
            FlowStage::ParsingResponse => "parsing_response",
        })
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("invalid input for {flow}: {violation}")]
    InvalidInput {
        flow: &'static str,
        violation: SchemaViolation,
    },

    #[error("prompt rendering failed for {flow}: {source}")]
    TemplateRender {
        flow: &'static str,
        source: TemplateError,
    },

    #[error("invalid output from {flow}: {violation}")]
    OutputValidation {
        flow: &'static str,
        violation: SchemaViolation,
    },

    #[error("generation service failed for {flow}: {source}")]
    Upstream {
        flow: &'static str,
        source: GenerationError,
    },

    #[error("{flow} was cancelled")]
    Cancelled { flow: &'static str },
}

impl FlowError {
    pub fn flow(&self) -> &'static str {
        match self {
            FlowError::InvalidInput { flow, .. }
            | FlowError::TemplateRender { flow, .. }
            | FlowError::OutputValidation { flow, .. }
            | FlowError::Upstream { flow, .. }
            | FlowError::Cancelled { flow } => flow,
        }
    }

    /// The stage the invocation failed in.
    pub fn stage(&self) -> FlowStage {
        match self {
            FlowError::InvalidInput { .. } => FlowStage::Validating,
            FlowError::TemplateRender { .. } => FlowStage::Rendering,
            FlowError::Upstream { .. } | FlowError::Cancelled { .. } => FlowStage::Dispatching,
            FlowError::OutputValidation { .. } => FlowStage::ParsingResponse,
        }
    }

    /// Input that could not be turned into a record at all.
    pub fn from_json_field(flow: &'static str, err: JsonFieldError) -> Self {
        FlowError::InvalidInput {
            flow,
            violation: SchemaViolation {
                field: err.field.unwrap_or_else(|| INPUT_FIELD.to_string()),
                reason: err.reason,
            },
        }
    }

    /// Whether re-running the same invocation could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlowError::OutputValidation { .. } | FlowError::Upstream { .. }
        )
    }
}

/// A flow declaration that failed its load-time checks.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("flow {flow}: {source}")]
    Template {
        flow: &'static str,
        source: TemplateError,
    },

    #[error("flow {flow}: slot '{slot}' is not an input field")]
    UnknownSlot { flow: &'static str, slot: String },

    #[error("flow {flow}: slot '{slot}' uses the wrong slot form for its field type")]
    SlotKindMismatch { flow: &'static str, slot: String },

    #[error("flow {flow}: input field '{field}' is never used by the template")]
    UnusedField {
        flow: &'static str,
        field: &'static str,
    },
}

/// One prompt template bound to its input and output schemas.
/// Immutable once built; share it freely.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    name: &'static str,
    description: &'static str,
    system: String,
    template: PromptTemplate,
    input: Schema,
    output: Schema,
}

impl FlowDefinition {
    /// Parses the template and checks it against the input schema: every slot
    /// must name an input field of the matching kind, and every input field
    /// must be used.
    pub fn new(
        name: &'static str,
        description: &'static str,
        system: String,
        template: &str,
        input: Schema,
        output: Schema,
    ) -> Result<Self, DefinitionError> {
        let template = PromptTemplate::parse(template)
            .map_err(|source| DefinitionError::Template { flow: name, source })?;

        for (slot, kind) in template.slots() {
            let field = input.field(slot).ok_or_else(|| DefinitionError::UnknownSlot {
                flow: name,
                slot: slot.to_string(),
            })?;
            let is_media = matches!(field.kind, FieldKind::Media { .. });
            if is_media != (kind == SlotKind::Media) {
                return Err(DefinitionError::SlotKindMismatch {
                    flow: name,
                    slot: slot.to_string(),
                });
            }
        }

        if let Some(unused) = input
            .fields()
            .iter()
            .find(|f| !template.slots().any(|(slot, _)| slot == f.name))
        {
            return Err(DefinitionError::UnusedField {
                flow: name,
                field: unused.name,
            });
        }

        Ok(Self {
            name,
            description,
            system,
            template,
            input,
            output,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn input_schema(&self) -> &Schema {
        &self.input
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output
    }
}

/// Per-call bounds on the dispatch stage.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Stateless executor. Clones share the same service and catalog.
#[derive(Clone)]
pub struct FlowEngine {
    service: Arc<dyn GenerationService>,
    catalog: Arc<FlowCatalog>,
}

impl FlowEngine {
    pub fn new(service: Arc<dyn GenerationService>, catalog: Arc<FlowCatalog>) -> Self {
        Self { service, catalog }
    }

    pub fn catalog(&self) -> &FlowCatalog {
        &self.catalog
    }

    pub async fn execute(
        &self,
        definition: &FlowDefinition,
        input: &FlowInputRecord,
    ) -> Result<FlowOutputRecord, FlowError> {
        self.execute_with(definition, input, ExecuteOptions::default())
            .await
    }

    pub async fn execute_with(
        &self,
        definition: &FlowDefinition,
        input: &FlowInputRecord,
        options: ExecuteOptions,
    ) -> Result<FlowOutputRecord, FlowError> {
        let span = info_span!("flow", flow = definition.name(), run_id = %Uuid::new_v4());

        async move {
            let started = Instant::now();
            let result = self.run_stages(definition, input, &options).await;
            match &result {
                Ok(_) => info!(
                    "Flow {} succeeded in {}ms",
                    definition.name(),
                    started.elapsed().as_millis()
                ),
                Err(e) => warn!("Flow failed while {}: {e}", e.stage()),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Typed entry point: serialises `input`, executes the flow's catalog
    /// definition and deserialises the validated output.
    pub async fn run<F: Flow>(
        &self,
        input: &F::Input,
        options: ExecuteOptions,
    ) -> Result<F::Output, FlowError> {
        let flow = F::KIND.name();
        let record = serde_json::to_value(input)
            .map_err(|e| JsonFieldError {
                field: None,
                reason: e.to_string(),
            })
            .and_then(FlowInputRecord::from_json)
            .map_err(|e| FlowError::from_json_field(flow, e))?;

        self.run_record::<F>(&record, options).await
    }

    /// Executes `F` on an untyped record and deserialises the validated output.
    pub async fn run_record<F: Flow>(
        &self,
        record: &FlowInputRecord,
        options: ExecuteOptions,
    ) -> Result<F::Output, FlowError> {
        let definition = self.catalog.get(F::KIND);
        let output = self.execute_with(definition, record, options).await?;
        serde_json::from_value(output.to_json()).map_err(|e| FlowError::OutputValidation {
            flow: definition.name(),
            violation: SchemaViolation {
                field: RESPONSE_FIELD.to_string(),
                reason: e.to_string(),
            },
        })
    }

    async fn run_stages(
        &self,
        definition: &FlowDefinition,
        input: &FlowInputRecord,
        options: &ExecuteOptions,
    ) -> Result<FlowOutputRecord, FlowError> {
        let flow = definition.name();

        debug!("{}", FlowStage::Validating);
        let validated = definition
            .input_schema()
            .validate_input(input)
            .map_err(|violation| FlowError::InvalidInput { flow, violation })?;

        debug!("{}", FlowStage::Rendering);
        let prompt = definition
            .template()
            .render(&validated)
            .map_err(|source| FlowError::TemplateRender { flow, source })?;

        debug!(
            prompt = %prompt.text_preview(),
            "{}: {} part(s), {} media",
            FlowStage::Dispatching,
            prompt.parts.len(),
            prompt.media_count()
        );
        let request = GenerationRequest {
            flow: flow.to_string(),
            system: definition.system().to_string(),
            parts: prompt.parts,
            output_schema: definition.output_schema().clone(),
        };
        let response = self.dispatch(flow, &request, options).await?;

        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "{}",
            FlowStage::ParsingResponse
        );
        parse_response(definition, &response)
    }

    async fn dispatch(
        &self,
        flow: &'static str,
        request: &GenerationRequest,
        options: &ExecuteOptions,
    ) -> Result<GenerationResponse, FlowError> {
        let call = self.service.generate(request);
        let bounded = async {
            match options.timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(GenerationError::Timeout(limit)),
                },
                None => call.await,
            }
        };

        let result = match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(FlowError::Cancelled { flow }),
                result = bounded => result,
            },
            None => bounded.await,
        };

        result.map_err(|source| match source {
            GenerationError::MalformedResponse(reason) => FlowError::OutputValidation {
                flow,
                violation: SchemaViolation {
                    field: RESPONSE_FIELD.to_string(),
                    reason,
                },
            },
            source => FlowError::Upstream { flow, source },
        })
    }
}

fn parse_response(
    definition: &FlowDefinition,
    response: &GenerationResponse,
) -> Result<FlowOutputRecord, FlowError> {
    let flow = definition.name();
    let invalid = |reason: String| FlowError::OutputValidation {
        flow,
        violation: SchemaViolation {
            field: RESPONSE_FIELD.to_string(),
            reason,
        },
    };

    let text = response
        .text
        .as_deref()
        .map(strip_json_fences)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| invalid("generation service returned no content".to_string()))?;

    let value: Value = serde_json::from_str(text)
        .map_err(|e| invalid(format!("response is not valid JSON: {e}")))?;

    definition
        .output_schema()
        .validate_output(&value)
        .map_err(|violation| FlowError::OutputValidation { flow, violation })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::flows::record::FieldValue;
    use crate::flows::schema::FieldSpec;
    use crate::flows::template::PromptPart;
    use crate::llm_client::stub::StubGenerationService;

    fn risk_definition() -> FlowDefinition {
        FlowDefinition::new(
            "test-risk",
            "Risk check",
            "You assess risk.".to_string(),
            "Crop: {{{cropType}}}\nScan: {{media url=scan}}",
            Schema::new(vec![
                FieldSpec::text("cropType", "crop"),
                FieldSpec::image("scan", "scan"),
            ]),
            Schema::new(vec![
                FieldSpec::category("riskLevel", &["Low", "High"], "risk"),
                FieldSpec::text("note", "note"),
            ]),
        )
        .unwrap()
    }

    fn engine(stub: &StubGenerationService) -> FlowEngine {
        FlowEngine::new(Arc::new(stub.clone()), Arc::new(FlowCatalog::load().unwrap()))
    }

    fn input() -> FlowInputRecord {
        FlowInputRecord::new()
            .with("cropType", "Banana")
            .with("scan", "data:image/jpeg;base64,AAAA")
    }

    #[test]
    fn test_definition_rejects_unknown_slot() {
        let err = FlowDefinition::new(
            "bad",
            "",
            String::new(),
            "{{{cropType}}} {{{region}}}",
            Schema::new(vec![FieldSpec::text("cropType", "")]),
            Schema::new(vec![]),
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownSlot { ref slot, .. } if slot == "region"));
    }

    #[test]
    fn test_definition_rejects_media_in_text_slot() {
        let err = FlowDefinition::new(
            "bad",
            "",
            String::new(),
            "{{{scan}}}",
            Schema::new(vec![FieldSpec::image("scan", "")]),
            Schema::new(vec![]),
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::SlotKindMismatch { .. }));
    }

    #[test]
    fn test_definition_rejects_unused_field() {
        let err = FlowDefinition::new(
            "bad",
            "",
            String::new(),
            "{{{cropType}}}",
            Schema::new(vec![
                FieldSpec::text("cropType", ""),
                FieldSpec::text("region", ""),
            ]),
            Schema::new(vec![]),
        )
        .unwrap_err();
        assert!(matches!(err, DefinitionError::UnusedField { field: "region", .. }));
    }

    #[tokio::test]
    async fn test_execute_sends_text_and_media_parts() {
        let stub =
            StubGenerationService::replying_json(json!({"riskLevel": "High", "note": "Sigatoka"}));
        let output = engine(&stub)
            .execute(&risk_definition(), &input())
            .await
            .unwrap();

        assert_eq!(
            output.get("riskLevel"),
            Some(&FieldValue::Category("High".into()))
        );
        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].flow, "test-risk");
        assert_eq!(requests[0].system, "You assess risk.");
        assert!(matches!(
            &requests[0].parts[0],
            PromptPart::Text(t) if t == "Crop: Banana\nScan: "
        ));
        assert!(matches!(
            &requests[0].parts[1],
            PromptPart::Media(m) if m.mime_type() == "image/jpeg"
        ));
        assert_eq!(requests[0].output_schema.fields().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_media_never_dispatches() {
        let stub = StubGenerationService::replying_json(json!({"riskLevel": "High", "note": "x"}));
        let err = engine(&stub)
            .execute(&risk_definition(), &input().with("scan", "banana.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::InvalidInput { ref violation, .. } if violation.field == "scan"
        ));
        assert_eq!(err.stage(), FlowStage::Validating);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_fenced_json_is_accepted() {
        let stub = StubGenerationService::replying_text(
            "```json\n{\"riskLevel\": \"Low\", \"note\": \"dry spell\"}\n```",
        );
        let output = engine(&stub)
            .execute(&risk_definition(), &input())
            .await
            .unwrap();
        assert_eq!(output.get("note").and_then(FieldValue::as_text), Some("dry spell"));
    }

    #[tokio::test]
    async fn test_empty_response_is_output_error() {
        let stub = StubGenerationService::replying_nothing();
        let err = engine(&stub)
            .execute(&risk_definition(), &input())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::OutputValidation { .. }));
        assert!(err.to_string().contains("no content"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_prose_response_is_output_error() {
        let stub = StubGenerationService::replying_text("The risk is high.");
        let err = engine(&stub)
            .execute(&risk_definition(), &input())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
        assert_eq!(err.stage(), FlowStage::ParsingResponse);
    }

    #[tokio::test]
    async fn test_unreadable_envelope_is_output_error() {
        let stub = StubGenerationService::malformed("expected value at line 1 column 1");
        let err = engine(&stub)
            .execute(&risk_definition(), &input())
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::OutputValidation { .. }));
        assert_eq!(err.stage(), FlowStage::ParsingResponse);
        assert!(err.to_string().contains("expected value"));
    }

    #[tokio::test]
    async fn test_error_names_its_flow() {
        let stub = StubGenerationService::rate_limited();
        let err = engine(&stub)
            .execute(&risk_definition(), &input())
            .await
            .unwrap_err();
        assert_eq!(err.flow(), "test-risk");
        assert_eq!(
            FlowError::Cancelled { flow: "yield-forecast" }.flow(),
            "yield-forecast"
        );
    }

    #[tokio::test]
    async fn test_api_error_is_upstream_and_not_retried() {
        let stub = StubGenerationService::failing(503, "overloaded");
        let err = engine(&stub)
            .execute(&risk_definition(), &input())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Upstream {
                source: GenerationError::Api { status: 503, .. },
                ..
            }
        ));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_timeout_bounds_dispatch() {
        let stub = StubGenerationService::replying_json(json!({"riskLevel": "Low", "note": "x"}))
            .with_delay(Duration::from_secs(30));
        let err = engine(&stub)
            .execute_with(
                &risk_definition(),
                &input(),
                ExecuteOptions::default().with_timeout(Duration::from_secs(5)),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Upstream {
                source: GenerationError::Timeout(d),
                ..
            } if d == Duration::from_secs(5)
        ));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_dispatch() {
        let stub = StubGenerationService::replying_json(json!({"riskLevel": "Low", "note": "x"}))
            .with_delay(Duration::from_secs(30));
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = engine(&stub)
            .execute_with(
                &risk_definition(),
                &input(),
                ExecuteOptions::default().with_cancel(token),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Cancelled { flow: "test-risk" }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_dispatch() {
        let stub = StubGenerationService::replying_json(json!({"riskLevel": "Low", "note": "x"}));
        let token = CancellationToken::new();
        token.cancel();
        let err = engine(&stub)
            .execute_with(
                &risk_definition(),
                &input(),
                ExecuteOptions::default().with_cancel(token),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Cancelled { .. }));
        assert_eq!(stub.calls(), 0);
    }
}
