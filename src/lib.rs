use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use services::{dataset_store::DatasetSlot, llm_agent::LlmAgent};

// Application state
pub struct AppState {
    pub config: config::Config,
    pub datasets: DatasetSlot,
    pub llm: LlmAgent,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        let llm = LlmAgent::new(&config.llm);
        Self {
            config,
            datasets: DatasetSlot::new(),
            llm,
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_file_size;
    routes::routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
