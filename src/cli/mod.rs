use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, gateway, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., https://ai-gateway.vercel.sh/v1)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Fallback model name when a request carries none (the prompt file's allowlist wins)
    #[arg(long, env = "CHAT_MODEL")]
    pub chat_model: Option<String>,

    // --- Mentor Content Args ---
    /// Path to the prompt configuration file.
    #[arg(long, env = "PROMPTS_PATH", default_value = "json/prompts.json")]
    pub prompts_path: String,

    /// Path to the guide catalog file.
    #[arg(long, env = "GUIDES_PATH", default_value = "json/guides.json")]
    pub guides_path: String,

    // --- Usage Log Args ---
    /// Usage record store type (memory, redis)
    #[arg(long, env = "USAGE_STORE_TYPE", default_value = "memory")]
    pub usage_store_type: String,

    /// Redis URL for the usage log.
    #[arg(long, env = "USAGE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub usage_redis_url: String,

    /// Prefix for Redis usage keys.
    #[arg(long, env = "USAGE_REDIS_PREFIX", default_value = "usage:")]
    pub usage_redis_prefix: String,

    /// Number of records the usage store keeps before dropping the oldest.
    #[arg(long, env = "USAGE_MAX_RECORDS", default_value = "1000")]
    pub usage_max_records: usize,

    // --- General App Args ---
    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional API Key. If set, clients must sign requests with `x-api-ts` / `x-api-sign`.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Requests per second accepted on the chat endpoints.
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

impl Args {
    /// Defaults only, for tests and embedding.
    pub fn defaults() -> Self {
        Self::parse_from(["vibe-guide-mentor"])
    }
}
