//! Task-level access to the generative model.
//!
//! Qualification and lead summaries sit on the live chat and dashboard paths,
//! so they always return something renderable. Neighborhood lookups return
//! `None` on failure. Copy and icebreaker generation surface a typed error.

use crate::config::prompt::{ self, PromptConfig };
use crate::llm::{ new_client, GenerateRequest, GenerativeClient, LlmConfig, LlmError };
use crate::models::analytics::{
    AnalyticsResult,
    ConnectionStatus,
    NeighborhoodReport,
    QualifyResult,
};

use log::{ error, info, warn };
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

const INVALID_KEY_MARKER: &str = "API_KEY_INVALID";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("the model returned an empty response")]
    EmptyResponse,
    #[error("response did not match the declared shape: {0}")]
    InvalidShape(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct AiGateway {
    client: Arc<dyn GenerativeClient>,
    prompts: Arc<PromptConfig>,
}

impl AiGateway {
    pub fn new(client: Arc<dyn GenerativeClient>, prompts: Arc<PromptConfig>) -> Self {
        Self { client, prompts }
    }

    pub fn from_config(
        llm_config: &LlmConfig,
        prompts: Arc<PromptConfig>
    ) -> Result<Self, LlmError> {
        let client = new_client(llm_config)?;
        info!(
            "Gateway configured: chat_model={} grounding_model={} credential={}",
            client.chat_model(),
            client.grounding_model(),
            if llm_config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                "missing"
            } else {
                "present"
            }
        );
        Ok(Self::new(client, prompts))
    }

    pub fn prompts(&self) -> &Arc<PromptConfig> {
        &self.prompts
    }

    pub fn with_prompts(&self, prompts: Arc<PromptConfig>) -> Self {
        Self { client: Arc::clone(&self.client), prompts }
    }

    async fn generate_text(&self, request: GenerateRequest) -> Result<String, GatewayError> {
        let response = self.client.generate(&request).await?;
        let text = response.text.trim();
        if text.is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    /// Answers a lead's message as the qualification assistant. Never fails.
    pub async fn qualify_message(
        &self,
        message: &str,
        history: &[String],
        lead_name: Option<&str>
    ) -> QualifyResult {
        let qualification = &self.prompts.qualification;
        let request = GenerateRequest::new(
            self.client.chat_model(),
            prompt::get_qualification_prompt(&self.prompts, message, history, lead_name)
        ).with_system_instruction(qualification.system_instruction.clone());

        match self.client.generate(&request).await {
            Ok(response) => {
                let reply = response.text.trim();
                if reply.is_empty() {
                    warn!("Qualification returned no text, using the empty-reply fallback");
                    return QualifyResult {
                        text: qualification.empty_reply.clone(),
                        is_handoff: false,
                    };
                }
                let is_handoff = qualification.detects_handoff(reply);
                info!("Qualification reply ready (handoff={})", is_handoff);
                QualifyResult { text: reply.to_string(), is_handoff }
            }
            Err(e) => {
                error!("Qualification call failed: {}", e);
                QualifyResult { text: qualification.failure_reply.clone(), is_handoff: false }
            }
        }
    }

    /// Prioritized summary of the given leads. Falls back to the default summary
    /// with no action items on any failure.
    pub async fn summarize_leads<T: Serialize + Sync>(&self, leads: &[T]) -> AnalyticsResult {
        match self.try_summarize(leads).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Lead analytics fell back to the default summary: {}", e);
                AnalyticsResult::fallback(&self.prompts.analytics.default_summary)
            }
        }
    }

    async fn try_summarize<T: Serialize + Sync>(
        &self,
        leads: &[T]
    ) -> Result<AnalyticsResult, GatewayError> {
        let leads_json = serde_json::to_string(leads)?;
        let request = GenerateRequest::new(
            self.client.chat_model(),
            prompt::get_analytics_prompt(&self.prompts, &leads_json)
        ).with_response_schema(prompt::analytics_schema(&self.prompts));

        let text = self.generate_text(request).await?;
        let result: AnalyticsResult = serde_json::from_str(&text)?;
        info!("Lead analytics produced {} action items", result.action_items.len());
        Ok(result)
    }

    /// Location-grounded commentary about an address, `None` when unavailable.
    pub async fn analyze_neighborhood(&self, address: &str) -> Option<NeighborhoodReport> {
        let request = GenerateRequest::new(
            self.client.grounding_model(),
            prompt::get_neighborhood_prompt(&self.prompts, address)
        ).with_maps_grounding();

        match self.client.generate(&request).await {
            Ok(response) if !response.text.trim().is_empty() => {
                info!("Neighborhood analysis returned {} grounding links", response.grounding.len());
                Some(NeighborhoodReport {
                    text: response.text.trim().to_string(),
                    links: response.grounding,
                })
            }
            Ok(_) => {
                warn!("Neighborhood analysis returned no text");
                None
            }
            Err(e) => {
                error!("Neighborhood analysis failed: {}", e);
                None
            }
        }
    }

    pub async fn generate_property_copy(
        &self,
        features: &[String],
        style: &str
    ) -> Result<String, GatewayError> {
        let request = GenerateRequest::new(
            self.client.chat_model(),
            prompt::get_property_copy_prompt(&self.prompts, features, style)
        );
        self.generate_text(request).await
    }

    pub async fn generate_icebreaker(
        &self,
        lead_type: &str,
        context: &str
    ) -> Result<String, GatewayError> {
        let request = GenerateRequest::new(
            self.client.chat_model(),
            prompt::get_icebreaker_prompt(&self.prompts, lead_type, context)
        );
        self.generate_text(request).await
    }

    /// Probes the provider with a trivial prompt to validate the credential.
    pub async fn check_connection(&self) -> ConnectionStatus {
        let connection = &self.prompts.connection;
        let request = GenerateRequest::new(self.client.chat_model(), connection.probe.clone());

        match self.generate_text(request).await {
            Ok(text) => ConnectionStatus { success: true, message: text },
            Err(e) => {
                error!("Connection probe failed: {}", e);
                let message = match &e {
                    GatewayError::Llm(LlmError::MissingApiKey) => &connection.missing_key_message,
                    GatewayError::Llm(LlmError::Api { message, .. }) if
                        message.contains(INVALID_KEY_MARKER)
                    => &connection.invalid_key_message,
                    _ => &connection.failure_message,
                };
                ConnectionStatus { success: false, message: message.clone() }
            }
        }
    }
}
