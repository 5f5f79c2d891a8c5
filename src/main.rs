use anyhow::Result;
use std::sync::Arc;

use insight_services::{app, config, logging, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;
    let addr = config.bind_addr;

    let state = Arc::new(AppState::new(config));
    if !state.llm.is_configured() {
        tracing::warn!("Running without an LLM key; insights and reports are placeholders");
    }

    let app = app(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
