pub mod api;
pub mod auth;

use crate::cli::Args;
use crate::gateway::AiGateway;
use crate::models::chat::Transcript;
use crate::models::integration::WhatsAppConfig;
use crate::models::lead::Lead;
use self::auth::{ api_key_middleware, rate_limit_middleware, GlobalLimiter };

use axum::{ middleware, routing::{ get, post }, Router };
use governor::{ Quota, RateLimiter };
use log::{ info, warn, error };
use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{ Mutex, RwLock };
use tower_http::cors::{ Any, CorsLayer };
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<RwLock<AiGateway>>,
    pub leads: Arc<RwLock<Vec<Lead>>>,
    pub sessions: Arc<Mutex<HashMap<Uuid, Transcript>>>,
    pub whatsapp: Arc<RwLock<WhatsAppConfig>>,
    pub ai_active: Arc<AtomicBool>,
    pub prompts_path: Option<String>,
}

impl AppState {
    pub fn new(gateway: AiGateway, leads: Vec<Lead>) -> Self {
        Self {
            gateway: Arc::new(RwLock::new(gateway)),
            leads: Arc::new(RwLock::new(leads)),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            whatsapp: Arc::new(RwLock::new(WhatsAppConfig::default())),
            ai_active: Arc::new(AtomicBool::new(true)),
            prompts_path: None,
        }
    }

    /// Snapshot of the gateway; no lock is held while the caller awaits the model.
    pub async fn gateway(&self) -> AiGateway {
        self.gateway.read().await.clone()
    }
}

pub fn router(state: AppState, api_key: Option<String>, rate_limit_per_second: u32) -> Router {
    let api_key: Option<Arc<str>> = api_key
        .filter(|k| !k.trim().is_empty())
        .map(|k| Arc::from(k.as_str()));
    let quota = Quota::per_second(NonZeroU32::new(rate_limit_per_second).unwrap_or(NonZeroU32::MIN));
    let limiter: Arc<GlobalLimiter> = Arc::new(RateLimiter::direct(quota));

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api_routes = Router::new()
        .route("/api/health/ai", get(api::ai_health))
        .route("/api/qualify", post(api::qualify))
        .route("/api/leads", get(api::list_leads))
        .route("/api/leads/stats", get(api::lead_stats))
        .route("/api/leads/analytics", get(api::lead_analytics))
        .route("/api/leads/{id}/phase", post(api::lead_phase))
        .route("/api/neighborhood", post(api::neighborhood))
        .route("/api/property-copy", post(api::property_copy))
        .route("/api/icebreaker", post(api::icebreaker))
        .route("/api/chat/sessions", post(api::create_session))
        .route("/api/chat/sessions/{id}", get(api::get_session))
        .route("/api/chat/sessions/{id}/messages", post(api::send_message))
        .route("/api/integration/whatsapp", get(api::get_whatsapp).put(api::put_whatsapp))
        .route("/api/integration/ai", get(api::get_ai_switch).put(api::put_ai_switch))
        .route("/api/reload-prompts", post(api::reload_prompts))
        .route_layer(middleware::from_fn_with_state(api_key, api_key_middleware));

    Router::new()
        .route("/health", get(api::health))
        .merge(api_routes)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(cors)
        .with_state(state)
}

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        if args.server_api_key.as_deref().map_or(false, |k| !k.trim().is_empty()) {
            info!("Server configured with API Key authentication.");
        } else {
            warn!("Server configured WITHOUT API Key authentication. The API is open.");
        }
        Self { addr, state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = router(
            self.state.clone(),
            self.args.server_api_key.clone(),
            self.args.rate_limit_per_second
        );

        if self.args.enable_tls {
            let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                (Some(_), None) | (None, Some(_)) => {
                    error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                    return Err("Missing TLS certificate or key path".into());
                }
                (None, None) => {
                    error!("--enable-tls was set but no certificate/key paths provided.");
                    return Err("TLS enabled without cert/key".into());
                }
            };
            // Several rustls backends may be linked; pin ring explicitly.
            let _ = rustls::crypto::ring::default_provider().install_default();
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;
            info!("HTTPS server listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
        } else {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("HTTP server listening on: http://{}", addr);
            axum::serve(listener, app).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::prompt::PromptConfig;
    use crate::gateway::tests::ScriptedClient;
    use crate::llm::{ GenerateRequest, GenerateResponse, GenerativeClient, LlmError };
    use crate::models::lead::{ seed_leads, LeadPhase, PhaseEvent, Speaker };
    use async_trait::async_trait;
    use axum::body::{ to_bytes, Body };
    use axum::http::{ Request, StatusCode };
    use serde_json::{ json, Value as JsonValue };
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn state_with(client: Arc<ScriptedClient>) -> AppState {
        let gateway = AiGateway::new(client, PromptConfig::shared_default());
        AppState::new(gateway, seed_leads().unwrap())
    }

    fn replies(texts: &[&str]) -> Arc<ScriptedClient> {
        ScriptedClient::new(
            texts
                .iter()
                .map(|t| Ok(GenerateResponse { text: t.to_string(), grounding: vec![] }))
                .collect()
        )
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<JsonValue>
    ) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn api_key_is_enforced_except_on_health() {
        let app = router(state_with(replies(&[])), Some("secret".into()), 100);

        let (status, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "GET", "/api/leads", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, leads) = call(&app, "GET", "/api/leads?api_key=secret", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(leads.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn rate_limit_answers_429() {
        let app = router(state_with(replies(&[])), None, 1);
        let (first, _) = call(&app, "GET", "/health", None).await;
        let (second, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn analytics_endpoint_falls_back() {
        let app = router(state_with(ScriptedClient::failing()), None, 100);
        let (status, body) = call(&app, "GET", "/api/leads/analytics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prioritySummary"], PromptConfig::default().analytics.default_summary);
        assert_eq!(body["actionItems"], json!([]));
    }

    #[tokio::test]
    async fn generators_map_failure_to_bad_gateway() {
        let app = router(state_with(ScriptedClient::failing()), None, 100);
        let (status, body) = call(
            &app,
            "POST",
            "/api/property-copy",
            Some(json!({ "features": ["2 bedrooms", "garage"], "style": "casual" }))
        ).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].is_string());

        let app = router(state_with(replies(&["Oi, sumido!"])), None, 100);
        let (status, body) = call(
            &app,
            "POST",
            "/api/icebreaker",
            Some(json!({ "leadType": "frio", "context": "visitou em março" }))
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Oi, sumido!");
    }

    #[tokio::test]
    async fn neighborhood_endpoint_returns_null_on_failure() {
        let app = router(state_with(ScriptedClient::failing()), None, 100);
        let (status, body) = call(
            &app,
            "POST",
            "/api/neighborhood",
            Some(json!({ "address": "Rua da Praia, 1" }))
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_null());
    }

    #[tokio::test]
    async fn lead_phase_transitions_and_rejections() {
        let app = router(state_with(replies(&[])), None, 100);
        let (status, body) = call(
            &app,
            "POST",
            "/api/leads/2/phase",
            Some(json!({ "event": "resume" }))
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "monitoring");

        let (status, _) = call(
            &app,
            "POST",
            "/api/leads/2/phase",
            Some(json!({ "event": "hand_back" }))
        ).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            "POST",
            "/api/leads/99/phase",
            Some(json!({ "event": "pause" }))
        ).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_session_appends_turns_and_escalates_on_handoff() {
        let state = state_with(
            replies(&["Bah, qual tua renda?", "Show! O Magalhães vai entrar em contato."])
        );
        let app = router(state.clone(), None, 100);

        let (status, session) = call(
            &app,
            "POST",
            "/api/chat/sessions",
            Some(json!({ "leadId": "1" }))
        ).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = session["sessionId"].as_str().unwrap().to_string();
        assert_eq!(session["transcript"]["messages"].as_array().unwrap().len(), 1);

        let uri = format!("/api/chat/sessions/{}/messages", id);
        let (status, turn) = call(&app, "POST", &uri, Some(json!({ "content": "Oi" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(turn["reply"]["isHandoff"], false);
        assert_eq!(turn["messages"].as_array().unwrap().len(), 3);

        let (_, turn) = call(
            &app,
            "POST",
            &uri,
            Some(json!({ "content": "Ganho 6 mil, gosto do Bom Fim" }))
        ).await;
        assert_eq!(turn["reply"]["isHandoff"], true);
        assert_eq!(turn["messages"].as_array().unwrap().len(), 5);

        let leads = state.leads.read().await;
        let lead = leads.iter().find(|l| l.id == "1").unwrap();
        assert_eq!(lead.phase, LeadPhase::Escalated);
        assert_eq!(lead.interaction_count, 10);

        // Escalated leads no longer get automated replies.
        drop(leads);
        let (status, _) = call(&app, "POST", &uri, Some(json!({ "content": "Oi?" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn chat_is_refused_while_ai_is_switched_off() {
        let state = state_with(replies(&["nunca usado"]));
        let app = router(state.clone(), None, 100);
        let (_, session) = call(&app, "POST", "/api/chat/sessions", None).await;
        let id = session["sessionId"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "PUT",
            "/api/integration/ai",
            Some(json!({ "active": false }))
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);
        assert!(!state.ai_active.load(Ordering::SeqCst));

        let uri = format!("/api/chat/sessions/{}/messages", id);
        let (status, _) = call(&app, "POST", &uri, Some(json!({ "content": "Oi" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, session) = call(&app, "GET", &format!("/api/chat/sessions/{}", id), None).await;
        assert_eq!(session["transcript"]["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn whatsapp_config_is_validated_and_masked() {
        let app = router(state_with(replies(&[])), None, 100);
        let config =
            json!({
            "phoneNumberId": "5551999",
            "accessToken": "EAAG-secret",
            "verifyToken": "v",
            "webhookUrl": "https://example.com/hook",
            "isActive": true,
            "guardianMode": { "enabled": true, "timeoutHours": 12.0, "intensity": "persuasive", "monitorNewLeads": false }
        });
        let (status, body) = call(&app, "PUT", "/api/integration/whatsapp", Some(config)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accessToken"], "********");

        let (status, _) = call(
            &app,
            "PUT",
            "/api/integration/whatsapp",
            Some(json!({ "webhookUrl": "not a url" }))
        ).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, body) = call(&app, "GET", "/api/integration/whatsapp", None).await;
        assert_eq!(body["phoneNumberId"], "5551999");
        assert_eq!(body["guardianMode"]["intensity"], "persuasive");
    }

    /// Lets a human act on the board while the model is still answering.
    struct InterruptingClient {
        leads: Arc<RwLock<Vec<Lead>>>,
        ai_active: Arc<AtomicBool>,
        pause_lead: Option<&'static str>,
        switch_off: bool,
    }

    #[async_trait]
    impl GenerativeClient for InterruptingClient {
        async fn generate(
            &self,
            _request: &GenerateRequest
        ) -> Result<GenerateResponse, LlmError> {
            if let Some(id) = self.pause_lead {
                let mut leads = self.leads.write().await;
                if let Some(lead) = leads.iter_mut().find(|l| l.id == id) {
                    lead.transition(PhaseEvent::Pause).unwrap();
                }
            }
            if self.switch_off {
                self.ai_active.store(false, Ordering::SeqCst);
            }
            Ok(GenerateResponse {
                text: "O Magalhães vai entrar em contato".to_string(),
                grounding: vec![],
            })
        }

        fn chat_model(&self) -> &str {
            "chat-model"
        }

        fn grounding_model(&self) -> &str {
            "grounding-model"
        }
    }

    async fn interrupted_state(pause_lead: Option<&'static str>, switch_off: bool) -> AppState {
        let state = state_with(replies(&[]));
        let client = Arc::new(InterruptingClient {
            leads: Arc::clone(&state.leads),
            ai_active: Arc::clone(&state.ai_active),
            pause_lead,
            switch_off,
        });
        *state.gateway.write().await = AiGateway::new(client, PromptConfig::shared_default());
        state
    }

    #[tokio::test]
    async fn reply_is_dropped_when_lead_is_paused_mid_call() {
        let state = interrupted_state(Some("1"), false).await;
        let app = router(state.clone(), None, 100);
        let (_, session) = call(
            &app,
            "POST",
            "/api/chat/sessions",
            Some(json!({ "leadId": "1" }))
        ).await;
        let id = session["sessionId"].as_str().unwrap().to_string();

        let uri = format!("/api/chat/sessions/{}/messages", id);
        let (status, _) = call(&app, "POST", &uri, Some(json!({ "content": "Oi" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let leads = state.leads.read().await;
        let lead = leads.iter().find(|l| l.id == "1").unwrap();
        assert_eq!(lead.phase, LeadPhase::Paused);
        assert_eq!(lead.interaction_count, 8);
        assert_eq!(lead.last_speaker, Speaker::Lead);
        drop(leads);

        let (_, session) = call(&app, "GET", &format!("/api/chat/sessions/{}", id), None).await;
        assert_eq!(session["transcript"]["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reply_is_dropped_when_ai_is_switched_off_mid_call() {
        let state = interrupted_state(None, true).await;
        let app = router(state.clone(), None, 100);
        let (_, session) = call(&app, "POST", "/api/chat/sessions", None).await;
        let id = session["sessionId"].as_str().unwrap().to_string();

        let uri = format!("/api/chat/sessions/{}/messages", id);
        let (status, _) = call(&app, "POST", &uri, Some(json!({ "content": "Oi" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, session) = call(&app, "GET", &format!("/api/chat/sessions/{}", id), None).await;
        assert_eq!(session["transcript"]["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn qualify_endpoint_answers_and_falls_back() {
        let app = router(state_with(replies(&["Bah! Qual teu nome?"])), None, 100);
        let (status, body) = call(
            &app,
            "POST",
            "/api/qualify",
            Some(json!({ "message": "Oi", "history": ["Olá"], "leadName": "Ana" }))
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Bah! Qual teu nome?");
        assert_eq!(body["isHandoff"], false);

        let app = router(state_with(ScriptedClient::failing()), None, 100);
        let (status, body) = call(&app, "POST", "/api/qualify", Some(json!({ "message": "Oi" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], PromptConfig::default().qualification.failure_reply);
        assert_eq!(body["isHandoff"], false);
    }

    #[tokio::test]
    async fn ai_health_reports_credential_problem_without_provider_detail() {
        let client = ScriptedClient::new(
            vec![
                Err(LlmError::Api {
                    status: 400,
                    message: "API key not valid: AIzaSyLEAKED [API_KEY_INVALID]".into(),
                })
            ]
        );
        let app = router(state_with(client), None, 100);
        let (status, body) = call(&app, "GET", "/api/health/ai", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], PromptConfig::default().connection.invalid_key_message);
        assert!(!body.to_string().contains("AIzaSyLEAKED"));

        let app = router(state_with(replies(&["SISTEMA ONLINE"])), None, 100);
        let (_, body) = call(&app, "GET", "/api/health/ai", None).await;
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn reload_without_prompts_file_is_rejected() {
        let app = router(state_with(replies(&[])), None, 100);
        let (status, body) = call(&app, "POST", "/api/reload-prompts", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
