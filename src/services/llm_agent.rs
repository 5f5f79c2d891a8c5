use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        CreateChatCompletionRequest, Role,
    },
    Client,
};
use once_cell::sync::Lazy;
use regex::Regex;
use crate::config::LlmConfig;
use crate::error::AppError;
use crate::models::{AiReport, ColumnProfile, DataRow, Table};

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

pub const INSIGHT_API_ERROR: &str = "Could not generate insights at this time due to an API error.";
pub const NO_INSIGHTS: &str = "No insights generated.";
pub const REPORT_FAILED: &str = "Failed to generate report.";

const SYSTEM_PROMPT: &str = "You are a data analyst. You receive a description of a tabular \
dataset and a sample of its rows, and you answer only about that data.";

/// Talks to the chat-completions endpoint. Without an API key every call
/// answers with canned text instead, so the rest of the app keeps working.
#[derive(Clone)]
pub struct LlmAgent {
    client: Option<Client<OpenAIConfig>>,
    model_fast: String,
    model_reasoning: String,
    max_rows_for_ai: usize,
}

impl LlmAgent {
    pub fn new(config: &LlmConfig) -> Self {
        let client = config.api_key.as_ref().map(|key| {
            let openai_config = OpenAIConfig::new()
                .with_api_key(key)
                .with_api_base(&config.api_base);
            Client::with_config(openai_config)
        });

        Self {
            client,
            model_fast: config.model_fast.clone(),
            model_reasoning: config.model_reasoning.clone(),
            max_rows_for_ai: config.max_rows_for_ai,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Short Markdown overview of a freshly uploaded dataset. Never fails:
    /// API problems come back as an explanatory sentence.
    pub async fn generate_initial_insights(&self, table: &Table, columns: &[ColumnProfile]) -> String {
        let Some(client) = &self.client else {
            return mock_insight(table, columns);
        };

        let sample = table.head(self.max_rows_for_ai);
        let prompt = match insight_prompt(sample, columns) {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::error!("Failed to build insight prompt: {}", e);
                return INSIGHT_API_ERROR.to_string();
            }
        };

        let start = std::time::Instant::now();
        match self.complete(client, &self.model_fast, prompt).await {
            Ok(text) if text.trim().is_empty() => NO_INSIGHTS.to_string(),
            Ok(text) => {
                tracing::info!("Initial insights generated in {:?}", start.elapsed());
                text
            }
            Err(e) => {
                tracing::error!("Insight request failed: {}", e);
                INSIGHT_API_ERROR.to_string()
            }
        }
    }

    /// Structured report over `selected_columns`.
    pub async fn generate_detailed_report(
        &self,
        table: &Table,
        selected_columns: &[String],
    ) -> Result<AiReport, AppError> {
        let Some(client) = &self.client else {
            return Ok(demo_report());
        };

        let sample: Vec<DataRow> = table
            .head(self.max_rows_for_ai)
            .iter()
            .map(|row| row.project(selected_columns))
            .collect();
        let prompt = report_prompt(&sample, selected_columns)?;

        let start = std::time::Instant::now();
        let content = self
            .complete(client, &self.model_reasoning, prompt)
            .await
            .map_err(|e| {
                tracing::error!("Report request failed: {}", e);
                AppError::LlmError(REPORT_FAILED.to_string())
            })?;

        let report = parse_report(&content).map_err(|e| {
            tracing::error!("Report response was not usable: {}", e);
            AppError::LlmError(REPORT_FAILED.to_string())
        })?;
        tracing::info!("Report generated in {:?}", start.elapsed());
        Ok(report)
    }

    async fn complete(
        &self,
        client: &Client<OpenAIConfig>,
        model: &str,
        prompt: String,
    ) -> Result<String, AppError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: SYSTEM_PROMPT.to_string(),
                    name: None,
                    role: Role::System,
                }
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(prompt),
                    name: None,
                    role: Role::User,
                }
            ),
        ];

        let request = CreateChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature: Some(0.4),
            ..Default::default()
        };

        tracing::debug!("Sending completion request to {}", model);
        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::LlmError(e.to_string()))?;

        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default())
    }
}

/// `name (type)` pairs, comma separated.
pub fn column_summary(columns: &[ColumnProfile]) -> String {
    columns
        .iter()
        .map(|c| format!("{} ({})", c.name, c.column_type))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn insight_prompt(sample: &[DataRow], columns: &[ColumnProfile]) -> Result<String, AppError> {
    Ok(format!(
        r#"I have a dataset with the following columns: {}.
Here is a sample of the first {} rows:
{}

Give a brief, high-level executive summary of what this dataset appears to be about.
Describe the nature of the data and 3 potentially meaningful insights or trends it may hide.
Keep it under 200 words. Format the answer as clean Markdown."#,
        column_summary(columns),
        sample.len(),
        serde_json::to_string(sample)?
    ))
}

pub fn report_prompt(sample: &[DataRow], selected_columns: &[String]) -> Result<String, AppError> {
    Ok(format!(
        r#"Analyze the following dataset, focusing on these columns: {}.
Data sample (first {} rows):
{}

Write a comprehensive report as a JSON object with these fields:
- title: a creative title for the analysis.
- summary: one paragraph summarizing the findings.
- keyInsights: an array of strings, each a distinct insight.
- recommendations: an array of strings with actionable advice based on the data.
- markdownContent: the full report in Markdown, with headings, lists, and a discussion of distributions or correlations.

Return ONLY valid JSON."#,
        selected_columns.join(", "),
        sample.len(),
        serde_json::to_string(sample)?
    ))
}

/// Pulls the outermost JSON object out of a model reply, ignoring any prose
/// or code fences around it.
pub fn parse_report(content: &str) -> Result<AiReport, AppError> {
    let json_str = JSON_OBJECT
        .find(content)
        .ok_or_else(|| AppError::ParseError("No JSON found in report response".to_string()))?
        .as_str();

    serde_json::from_str(json_str)
        .map_err(|e| AppError::ParseError(format!("Failed to parse report JSON: {}", e)))
}

fn mock_insight(table: &Table, columns: &[ColumnProfile]) -> String {
    let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ");
    format!(
        "**Mock Insight**: This dataset contains {} records with columns {}.\n\n\
         *Note: no API key is configured. Set GEMINI_API_KEY and restart the service to get real insights.*",
        table.len(),
        names
    )
}

fn demo_report() -> AiReport {
    AiReport {
        title: "Demo Analysis Report".to_string(),
        summary: "This is a placeholder report generated because no API key was found.".to_string(),
        key_insights: vec![
            "Insight 1: Data is loaded.".to_string(),
            "Insight 2: You selected columns.".to_string(),
        ],
        recommendations: vec![
            "Add an API key to see real analysis.".to_string(),
            "Try uploading a different file.".to_string(),
        ],
        markdown_content: "## Demo Report\n\nConfigure GEMINI_API_KEY to generate real reports.".to_string(),
    }
}
