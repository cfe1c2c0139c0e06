use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub llm_provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub extraction_timeout_ms: u64,
    pub history_limit: usize,
    /// Abandoned sessions are only reaped when this is set.
    pub session_ttl_minutes: Option<i64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "bookbot.db".to_string(),
            admin_token: "changeme".to_string(),
            llm_provider: "ollama".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "mistral".to_string(),
            groq_api_key: String::new(),
            groq_model: "llama-3.1-8b-instant".to_string(),
            extraction_timeout_ms: 8000,
            history_limit: 10,
            session_ttl_minutes: None,
        }
    }
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or(defaults.admin_token),
            llm_provider: env::var("LLM_PROVIDER")
                .map(|p| p.to_lowercase())
                .unwrap_or(defaults.llm_provider),
            ollama_url: env::var("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or(defaults.groq_api_key),
            groq_model: env::var("GROQ_MODEL").unwrap_or(defaults.groq_model),
            extraction_timeout_ms: parsed("EXTRACTION_TIMEOUT_MS")
                .unwrap_or(defaults.extraction_timeout_ms),
            history_limit: parsed("HISTORY_LIMIT").unwrap_or(defaults.history_limit),
            session_ttl_minutes: parsed("SESSION_TTL_MINUTES").filter(|m: &i64| *m > 0),
        }
    }
}
