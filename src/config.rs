use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_LLM_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_MODEL_TEXT_FAST: &str = "gemini-3-flash-preview";
pub const DEFAULT_MODEL_TEXT_REASONING: &str = "gemini-3-pro-preview";

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Unset means insights and reports fall back to canned text.
    pub api_key: Option<String>,
    pub api_base: String,
    pub model_fast: String,
    pub model_reasoning: String,
    pub max_rows_for_ai: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_LLM_API_BASE.to_string(),
            model_fast: DEFAULT_MODEL_TEXT_FAST.to_string(),
            model_reasoning: DEFAULT_MODEL_TEXT_REASONING.to_string(),
            max_rows_for_ai: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_file_size: usize,
    pub max_rows_for_preview: usize,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_file_size: default_max_file_size(),
            max_rows_for_preview: 5,
            llm: LlmConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file first
        dotenv().ok();

        let defaults = Config::default();

        let api_key = non_empty_var("GEMINI_API_KEY").or_else(|| non_empty_var("API_KEY"));

        Ok(Config {
            bind_addr: parsed_var("INSIGHT_BIND_ADDR", defaults.bind_addr)?,
            max_file_size: parsed_var("MAX_FILE_SIZE", defaults.max_file_size)?,
            max_rows_for_preview: parsed_var("MAX_ROWS_FOR_PREVIEW", defaults.max_rows_for_preview)?,
            llm: LlmConfig {
                api_key,
                api_base: non_empty_var("LLM_API_BASE").unwrap_or(defaults.llm.api_base),
                model_fast: non_empty_var("MODEL_TEXT_FAST").unwrap_or(defaults.llm.model_fast),
                model_reasoning: non_empty_var("MODEL_TEXT_REASONING")
                    .unwrap_or(defaults.llm.model_reasoning),
                max_rows_for_ai: parsed_var("MAX_ROWS_FOR_AI", defaults.llm.max_rows_for_ai)?,
            },
        })
    }
}

pub fn load_config() -> Result<Config> {
    Config::from_env()
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
        None => Ok(default),
    }
}
