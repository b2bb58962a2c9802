pub mod gemini;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;

use self::gemini::GeminiClient;

pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GROUNDING_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured for the generative AI provider")]
    MissingApiKey,
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
    },
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub chat_model: Option<String>,
    pub grounding_model: Option<String>,
    pub base_url: Option<String>,
}

/// Source kind of a grounding reference attached to a generated answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundingKind {
    Maps,
    Web,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingLink {
    pub kind: GroundingKind,
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A single-turn generation request.
///
/// A `response_schema` makes the provider answer with JSON matching it;
/// `maps_grounding` enables the location grounding tool.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub prompt: String,
    pub response_schema: Option<JsonValue>,
    pub maps_grounding: bool,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_response_schema(mut self, schema: JsonValue) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_maps_grounding(mut self) -> Self {
        self.maps_grounding = true;
        self
    }
}

/// Text of the first candidate (possibly empty) and its grounding links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    pub grounding: Vec<GroundingLink>,
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError>;

    fn chat_model(&self) -> &str;

    fn grounding_model(&self) -> &str;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn GenerativeClient>, LlmError> {
    let client = GeminiClient::from_config(config)?;
    Ok(Arc::new(client))
}
