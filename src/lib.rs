pub mod cli;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod models;
pub mod server;

use cli::Args;
use config::prompt::{ load_prompts, PromptConfig };
use gateway::AiGateway;
use llm::LlmConfig;
use log::{ info, warn };
use models::lead::{ load_leads, seed_leads };
use server::{ AppState, Server };
use std::error::Error;
use std::sync::atomic::Ordering;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or(llm::DEFAULT_CHAT_MODEL));
    info!(
        "Grounding Model: {}",
        args.grounding_model.as_deref().unwrap_or(llm::DEFAULT_GROUNDING_MODEL)
    );
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("(built-in)"));
    info!("Leads Path: {}", args.leads_path.as_deref().unwrap_or("(seed data)"));
    info!("AI Assistant Active: {}", !args.start_ai_paused);
    info!("Rate Limit: {} req/s", args.rate_limit_per_second);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let llm_config = LlmConfig {
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.trim().is_empty()),
        chat_model: args.chat_model.clone(),
        grounding_model: args.grounding_model.clone(),
        base_url: args.chat_base_url.clone(),
    };

    let prompts = match &args.prompts_path {
        Some(path) => load_prompts(path)?,
        None => PromptConfig::shared_default(),
    };
    let leads = match &args.leads_path {
        Some(path) => load_leads(path)?,
        None => seed_leads()?,
    };
    info!("Loaded {} leads", leads.len());

    let gateway = AiGateway::from_config(&llm_config, prompts)?;
    if args.skip_connection_check {
        info!("Skipping the credential probe");
    } else {
        let status = gateway.check_connection().await;
        if status.success {
            info!("AI provider reachable: {}", status.message);
        } else {
            warn!("AI provider check failed: {}. AI features will use fallbacks.", status.message);
        }
    }

    let mut state = AppState::new(gateway, leads);
    state.prompts_path = args.prompts_path.clone();
    state.ai_active.store(!args.start_ai_paused, Ordering::SeqCst);

    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}
