use crate::config::prompt::reload_prompts_if_changed;
use crate::gateway::GatewayError;
use crate::models::analytics::{ NeighborhoodReport, QualifyResult };
use crate::models::chat::{ ChatMessage, Transcript };
use crate::models::integration::{ ConfigError, WhatsAppConfig };
use crate::models::lead::{ Lead, LeadError, LeadStats, PhaseEvent };
use super::AppState;

use axum::{
    body::Bytes,
    extract::{ Path, State },
    http::StatusCode,
    response::{ IntoResponse, Response },
    Json,
};
use log::{ error, info, warn };
use serde::{ Deserialize, Serialize };
use serde_json::json;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<LeadError> for ApiError {
    fn from(err: LeadError) -> Self {
        let status = match err {
            LeadError::NotFound(_) => StatusCode::NOT_FOUND,
            LeadError::InvalidTransition { .. } => StatusCode::CONFLICT,
            LeadError::Load(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::new(StatusCode::BAD_GATEWAY, err.to_string())
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn ai_health(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = state.gateway().await;
    Json(gateway.check_connection().await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualifyRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub lead_name: Option<String>,
}

pub async fn qualify(
    State(state): State<AppState>,
    Json(req): Json<QualifyRequest>
) -> Json<QualifyResult> {
    let gateway = state.gateway().await;
    Json(gateway.qualify_message(&req.message, &req.history, req.lead_name.as_deref()).await)
}

pub async fn list_leads(State(state): State<AppState>) -> Json<Vec<Lead>> {
    Json(state.leads.read().await.clone())
}

pub async fn lead_stats(State(state): State<AppState>) -> Json<LeadStats> {
    Json(LeadStats::from_leads(&state.leads.read().await))
}

pub async fn lead_analytics(State(state): State<AppState>) -> impl IntoResponse {
    let leads = state.leads.read().await.clone();
    let gateway = state.gateway().await;
    Json(gateway.summarize_leads(&leads).await)
}

#[derive(Deserialize)]
pub struct PhaseRequest {
    pub event: PhaseEvent,
}

pub async fn lead_phase(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PhaseRequest>
) -> ApiResult<Lead> {
    let mut leads = state.leads.write().await;
    let lead = leads
        .iter_mut()
        .find(|l| l.id == id)
        .ok_or_else(|| LeadError::NotFound(id.clone()))?;
    let phase = lead.transition(req.event)?;
    info!("Lead {} moved to {:?} after {:?}", id, phase, req.event);
    Ok(Json(lead.clone()))
}

#[derive(Deserialize)]
pub struct NeighborhoodRequest {
    pub address: String,
}

pub async fn neighborhood(
    State(state): State<AppState>,
    Json(req): Json<NeighborhoodRequest>
) -> Json<Option<NeighborhoodReport>> {
    let gateway = state.gateway().await;
    Json(gateway.analyze_neighborhood(&req.address).await)
}

#[derive(Serialize)]
pub struct GeneratedText {
    pub text: String,
}

#[derive(Deserialize)]
pub struct PropertyCopyRequest {
    pub features: Vec<String>,
    pub style: String,
}

pub async fn property_copy(
    State(state): State<AppState>,
    Json(req): Json<PropertyCopyRequest>
) -> ApiResult<GeneratedText> {
    let gateway = state.gateway().await;
    let text = gateway.generate_property_copy(&req.features, &req.style).await?;
    Ok(Json(GeneratedText { text }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcebreakerRequest {
    pub lead_type: String,
    #[serde(default)]
    pub context: String,
}

pub async fn icebreaker(
    State(state): State<AppState>,
    Json(req): Json<IcebreakerRequest>
) -> ApiResult<GeneratedText> {
    let gateway = state.gateway().await;
    let text = gateway.generate_icebreaker(&req.lead_type, &req.context).await?;
    Ok(Json(GeneratedText { text }))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub lead_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub transcript: Transcript,
}

pub async fn create_session(
    State(state): State<AppState>,
    body: Bytes
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let req: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json
            ::from_slice(&body)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid body: {}", e)))?
    };
    if let Some(lead_id) = &req.lead_id {
        if !state.leads.read().await.iter().any(|l| &l.id == lead_id) {
            return Err(LeadError::NotFound(lead_id.clone()).into());
        }
    }

    let greeting = state.gateway().await.prompts().qualification.greeting.clone();
    let transcript = Transcript::with_greeting(req.lead_id, &greeting);
    let session_id = Uuid::new_v4();
    state.sessions.lock().await.insert(session_id, transcript.clone());
    info!("Opened chat session {}", session_id);

    Ok((StatusCode::CREATED, Json(SessionView { session_id, transcript })))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>
) -> ApiResult<SessionView> {
    let sessions = state.sessions.lock().await;
    let transcript = sessions
        .get(&session_id)
        .cloned()
        .ok_or_else(||
            ApiError::new(StatusCode::NOT_FOUND, format!("session '{}' not found", session_id))
        )?;
    Ok(Json(SessionView { session_id, transcript }))
}

#[derive(Deserialize)]
pub struct ChatTurnRequest {
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnResponse {
    pub reply: QualifyResult,
    pub messages: Vec<ChatMessage>,
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ChatTurnRequest>
) -> ApiResult<ChatTurnResponse> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "message content is empty"));
    }
    if !state.ai_active.load(Ordering::SeqCst) {
        return Err(ApiError::new(StatusCode::CONFLICT, "the AI assistant is switched off"));
    }

    let (history, lead_id) = {
        let sessions = state.sessions.lock().await;
        let transcript = sessions
            .get(&session_id)
            .ok_or_else(||
                ApiError::new(StatusCode::NOT_FOUND, format!("session '{}' not found", session_id))
            )?;
        (transcript.history(), transcript.lead_id.clone())
    };

    let lead_name = match &lead_id {
        Some(id) => {
            let leads = state.leads.read().await;
            let lead = leads
                .iter()
                .find(|l| &l.id == id)
                .ok_or_else(|| LeadError::NotFound(id.clone()))?;
            if !lead.phase.accepts_ai_replies() {
                return Err(
                    ApiError::new(
                        StatusCode::CONFLICT,
                        format!("lead '{}' is {:?}; the assistant does not reply", id, lead.phase)
                    )
                );
            }
            Some(lead.name.clone())
        }
        None => None,
    };

    let gateway = state.gateway().await;
    let reply = gateway.qualify_message(content, &history, lead_name.as_deref()).await;

    // State may have changed while the model was answering; re-check before applying.
    let mut leads = state.leads.write().await;
    if !state.ai_active.load(Ordering::SeqCst) {
        warn!("Dropping reply for session {}: assistant switched off meanwhile", session_id);
        return Err(ApiError::new(StatusCode::CONFLICT, "the AI assistant is switched off"));
    }
    let lead = match &lead_id {
        Some(id) => {
            let lead = leads
                .iter_mut()
                .find(|l| &l.id == id)
                .ok_or_else(|| LeadError::NotFound(id.clone()))?;
            if !lead.phase.accepts_ai_replies() {
                warn!("Dropping reply for lead {}: now {:?}", id, lead.phase);
                return Err(
                    ApiError::new(
                        StatusCode::CONFLICT,
                        format!("lead '{}' is {:?}; the assistant does not reply", id, lead.phase)
                    )
                );
            }
            Some(lead)
        }
        None => None,
    };

    let messages = {
        let mut sessions = state.sessions.lock().await;
        let transcript = sessions
            .get_mut(&session_id)
            .ok_or_else(||
                ApiError::new(StatusCode::GONE, format!("session '{}' was closed", session_id))
            )?;
        transcript.push(ChatMessage::user(content));
        transcript.push(ChatMessage::assistant(reply.text.clone()));
        transcript.messages().to_vec()
    };

    if let Some(lead) = lead {
        lead.record_ai_exchange(content);
        if reply.is_handoff {
            match lead.transition(PhaseEvent::Escalate) {
                Ok(_) => info!("Lead {} escalated to a human after handoff", lead.id),
                Err(e) => warn!("Handoff for lead {} not applied: {}", lead.id, e),
            }
        }
    }
    drop(leads);

    Ok(Json(ChatTurnResponse { reply, messages }))
}

pub async fn get_whatsapp(State(state): State<AppState>) -> Json<WhatsAppConfig> {
    Json(state.whatsapp.read().await.masked())
}

pub async fn put_whatsapp(
    State(state): State<AppState>,
    Json(update): Json<WhatsAppConfig>
) -> ApiResult<WhatsAppConfig> {
    let mut current = state.whatsapp.write().await;
    let merged = current.merge_update(update);
    merged.validate()?;
    *current = merged;
    info!("WhatsApp integration updated: {:?}", *current);
    Ok(Json(current.masked()))
}

#[derive(Serialize, Deserialize)]
pub struct AiSwitch {
    pub active: bool,
}

pub async fn get_ai_switch(State(state): State<AppState>) -> Json<AiSwitch> {
    Json(AiSwitch { active: state.ai_active.load(Ordering::SeqCst) })
}

pub async fn put_ai_switch(
    State(state): State<AppState>,
    Json(req): Json<AiSwitch>
) -> Json<AiSwitch> {
    state.ai_active.store(req.active, Ordering::SeqCst);
    info!("Global AI assistant switched {}", if req.active { "on" } else { "off" });
    Json(req)
}

#[derive(Serialize)]
struct ReloadResponse {
    success: bool,
    message: String,
}

pub async fn reload_prompts(State(state): State<AppState>) -> impl IntoResponse {
    let Some(path) = state.prompts_path.as_deref() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ReloadResponse {
                success: false,
                message: "No prompts file configured; using built-in prompts".to_string(),
            }),
        );
    };

    let current = state.gateway().await.prompts().clone();
    match reload_prompts_if_changed(path, &current) {
        Ok(Some(new_prompts)) => {
            let mut gateway = state.gateway.write().await;
            let updated = gateway.with_prompts(new_prompts);
            *gateway = updated;
            info!("Prompts reloaded from {}", path);
            (
                StatusCode::OK,
                Json(ReloadResponse { success: true, message: "Prompts reloaded".to_string() }),
            )
        }
        Ok(None) =>
            (
                StatusCode::OK,
                Json(ReloadResponse { success: true, message: "Prompts unchanged".to_string() }),
            ),
        Err(e) => {
            error!("Failed to reload prompts from {}: {}", path, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ReloadResponse { success: false, message: e.to_string() }),
            )
        }
    }
}
