use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;

use super::{
    GenerateRequest,
    GenerateResponse,
    GenerativeClient,
    GroundingKind,
    GroundingLink,
    LlmConfig,
    LlmError,
    DEFAULT_BASE_URL,
    DEFAULT_CHAT_MODEL,
    DEFAULT_GROUNDING_MODEL,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a JsonValue,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    google_maps: GoogleMapsTool,
}

#[derive(Serialize)]
struct GoogleMapsTool {}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    maps: Option<ChunkSource>,
    #[serde(default)]
    web: Option<ChunkSource>,
}

#[derive(Deserialize)]
struct ChunkSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    details: Vec<GoogleErrorDetail>,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    reason: Option<String>,
}

impl GeminiResponse {
    fn into_generate_response(self) -> GenerateResponse {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return GenerateResponse::default();
        };

        let text = candidate.content
            .map(|content| {
                content.parts
                    .into_iter()
                    .filter(|part| !part.thought.unwrap_or(false))
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        let grounding = candidate.grounding_metadata
            .map(|meta| {
                meta.grounding_chunks.into_iter().filter_map(grounding_link).collect()
            })
            .unwrap_or_default();

        GenerateResponse { text, grounding }
    }
}

fn grounding_link(chunk: GroundingChunk) -> Option<GroundingLink> {
    let (kind, source) = match (chunk.maps, chunk.web) {
        (Some(maps), _) => (GroundingKind::Maps, maps),
        (None, Some(web)) => (GroundingKind::Web, web),
        (None, None) => {
            return None;
        }
    };
    let uri = source.uri.filter(|u| !u.is_empty())?;
    Some(GroundingLink { kind, uri, title: source.title })
}

fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<GoogleErrorBody>(body) {
        Ok(parsed) => {
            let mut message = parsed.error.message;
            if let Some(code) = parsed.error.status {
                message = format!("{} ({})", message, code);
            }
            let reasons: Vec<String> = parsed.error.details
                .into_iter()
                .filter_map(|d| d.reason)
                .collect();
            if !reasons.is_empty() {
                message = format!("{} [{}]", message, reasons.join(", "));
            }
            message
        }
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    }
}

pub struct GeminiClient {
    http: HttpClient,
    api_key: Option<String>,
    chat_model: String,
    grounding_model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        chat_model: Option<String>,
        grounding_model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, LlmError> {
        let chat_model = chat_model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        let grounding_model = grounding_model.unwrap_or_else(||
            DEFAULT_GROUNDING_MODEL.to_string()
        );
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key = api_key.filter(|k| !k.trim().is_empty());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            api_key,
            chat_model,
            grounding_model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(
            config.api_key.clone(),
            config.chat_model.clone(),
            config.grounding_model.clone(),
            config.base_url.clone()
        )
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), model)
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let payload = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: &request.prompt }],
            }],
            system_instruction: request.system_instruction.as_deref().map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart { text }],
            }),
            generation_config: request.response_schema.as_ref().map(|schema| GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            }),
            tools: if request.maps_grounding {
                vec![GeminiTool { google_maps: GoogleMapsTool {} }]
            } else {
                Vec::new()
            },
        };

        info!(
            "GeminiClient::generate() → model={} structured={} grounding={}",
            request.model,
            request.response_schema.is_some(),
            request.maps_grounding
        );

        let resp = self.http
            .post(self.endpoint(&request.model))
            .header(API_KEY_HEADER, api_key)
            .json(&payload)
            .send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!("Gemini responded with status {}", status);

        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: describe_api_error(status, &body),
            });
        }

        let parsed: GeminiResponse = serde_json
            ::from_str(&body)
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        Ok(parsed.into_generate_response())
    }

    fn chat_model(&self) -> &str {
        &self.chat_model
    }

    fn grounding_model(&self) -> &str {
        &self.grounding_model
    }
}
