//! Generation client: the single point of entry for calls to the hosted
//! text/vision model.
//!
//! Flows never talk to a provider directly. They build a [`GenerationRequest`]
//! and hand it to whatever [`GenerationService`] the engine was built with:
//! [`GeminiClient`] in production, a stub in tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::flows::schema::Schema;
use crate::flows::template::PromptPart;

mod gemini;
pub mod prompts;
#[cfg(test)]
pub mod stub;

pub use gemini::GeminiClient;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by the generation service")]
    RateLimited,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("unreadable response envelope: {0}")]
    MalformedResponse(String),
}

/// Everything the provider needs for one call: text and media parts in
/// order, plus the schema the structured answer must follow.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub flow: String,
    pub system: String,
    pub parts: Vec<PromptPart>,
    pub output_schema: Schema,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Raw provider answer. `text` is `None` when the model produced nothing
/// (e.g. the candidate was blocked); the engine treats that as invalid output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResponse {
    pub text: Option<String>,
    pub usage: Usage,
}

impl GenerationResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            usage: Usage::default(),
        }
    }
}

/// The external generation collaborator. Implementations must not retry;
/// retry policy belongs to callers.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"riskLevel\": \"High\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"riskLevel\": \"High\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"riskLevel\": \"High\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"riskLevel\": \"High\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "  {\"riskLevel\": \"High\"}\n";
        assert_eq!(strip_json_fences(input), "{\"riskLevel\": \"High\"}");
    }

    #[test]
    fn test_strip_json_fences_unterminated() {
        let input = "```json\n{\"riskLevel\": \"High\"}";
        assert_eq!(strip_json_fences(input), "{\"riskLevel\": \"High\"}");
    }
}
