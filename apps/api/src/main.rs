mod config;
mod errors;
mod kb;
mod llm_client;
mod models;
mod resolution;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::resolution::extractor::{LlmRoleExtractor, PhraseExtractor};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on unparseable env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting role resolver v{}", env!("CARGO_PKG_VERSION"));

    let extractor = build_extractor(&config)?;
    let state = AppState::new(config.clone(), extractor);

    // The KB is re-read per request; this load only reports its state at boot.
    match state.store.load() {
        Ok(records) => {
            let custom = records.iter().filter(|r| r.is_custom).count();
            info!(
                "KB at {}: {} curated, {} custom roles (threshold {})",
                state.store.data_dir().display(),
                records.len() - custom,
                custom,
                config.fuzzy_threshold
            );
        }
        Err(e) => warn!("KB at {} is not loadable yet: {e}", config.data_dir.display()),
    }

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the operator UI has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// LLM extraction needs both the flag and a key; anything else runs heuristic-only.
fn build_extractor(config: &Config) -> Result<PhraseExtractor> {
    if !config.llm_extraction {
        info!("Role extraction: heuristic only");
        return Ok(PhraseExtractor::heuristic_only());
    }
    let Some(api_key) = config.anthropic_api_key.clone() else {
        warn!("LLM_EXTRACTION is set but ANTHROPIC_API_KEY is missing; using heuristic extraction");
        return Ok(PhraseExtractor::heuristic_only());
    };

    let llm = LlmClient::new(api_key)?;
    info!(
        "Role extraction: LLM first (model: {}, {} calls per session)",
        llm_client::MODEL,
        config.llm_call_cap
    );
    Ok(PhraseExtractor::with_external(Arc::new(LlmRoleExtractor::new(llm))))
}
