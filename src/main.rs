use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use bookbot::config::AppConfig;
use bookbot::db;
use bookbot::services::ai::extraction::{FieldExtractor, LlmFieldExtractor, RuleBasedExtractor};
use bookbot::services::ai::groq::GroqProvider;
use bookbot::services::ai::ollama::OllamaProvider;
use bookbot::services::sessions;
use bookbot::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let extractor: Box<dyn FieldExtractor> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Box::new(LlmFieldExtractor::new(Box::new(GroqProvider::new(
                config.groq_api_key.clone(),
                config.groq_model.clone(),
            ))))
        }
        "ollama" => {
            tracing::info!(
                "using Ollama LLM provider (url: {}, model: {})",
                config.ollama_url,
                config.ollama_model
            );
            Box::new(LlmFieldExtractor::new(Box::new(OllamaProvider::new(
                config.ollama_url.clone(),
                config.ollama_model.clone(),
            ))))
        }
        "rules" => {
            tracing::info!("using rule-based field extraction");
            Box::new(RuleBasedExtractor)
        }
        other => anyhow::bail!("unknown LLM_PROVIDER '{other}' (expected ollama, groq or rules)"),
    };

    let port = config.port;
    let ttl = config.session_ttl_minutes;
    let state = Arc::new(AppState::new(conn, config, extractor));

    if let Some(ttl_minutes) = ttl {
        tracing::info!(ttl_minutes, "session reaper enabled");
        tokio::spawn(sessions::run_reaper(state.clone(), ttl_minutes));
    }

    let app = bookbot::build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
