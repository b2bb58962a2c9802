use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Generative AI Provider Args ---
    /// API key for the Gemini API. Without it every AI call fails and falls back.
    #[arg(long, env = "CHAT_API_KEY", default_value = "", hide_env_values = true)]
    pub chat_api_key: String,

    /// Model used for qualification, analytics, copy and icebreakers.
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on client defaults if None
    pub chat_model: Option<String>,

    /// Model used for location-grounded neighborhood analysis.
    #[arg(long, env = "GROUNDING_MODEL")]
    pub grounding_model: Option<String>,

    /// Base URL of the Gemini REST API (e.g., https://generativelanguage.googleapis.com/v1beta)
    #[arg(long, env = "CHAT_BASE_URL")]
    pub chat_base_url: Option<String>,

    // --- Data Args ---
    /// Optional prompt configuration file. The built-in prompt set is used when unset.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Optional JSON file with the leads to load on startup. Built-in seed leads when unset.
    #[arg(long, env = "LEADS_PATH")]
    pub leads_path: Option<String>,

    /// Start with the global AI assistant switched off.
    #[arg(long, env = "START_AI_PAUSED", default_value = "false")]
    pub start_ai_paused: bool,

    /// Skip the credential probe on startup.
    #[arg(long, env = "SKIP_CONNECTION_CHECK", default_value = "false")]
    pub skip_connection_check: bool,

    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional API Key required on every /api request (X-API-Key header or api_key query).
    #[arg(long, env = "SERVER_API_KEY", hide_env_values = true)]
    pub server_api_key: Option<String>,

    /// Global request budget per second before answering 429.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "10")]
    pub rate_limit_per_second: u32,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}
