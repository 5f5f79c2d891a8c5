use axum::{
    extract::{Query, State},
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    models::{AiReport, ChartConfig, ColumnProfile, DataRow},
    services::{
        chart::{self, ChartData},
        dataset_store::{Dataset, InsightState},
        file_processor,
        profiler,
        utils,
    },
};
use tower_http::cors::{CorsLayer, Any};

pub const INSIGHT_TASK_FAILED: &str = "Failed to generate AI insights.";

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/datasets/upload", post(upload_dataset))
        .route("/datasets/fetch", post(fetch_dataset))
        .route("/datasets/current", get(current_dataset).delete(reset_dataset))
        .route("/datasets/current/insight", get(current_insight))
        .route("/datasets/current/chart", get(default_chart).post(render_chart))
        .route("/datasets/current/report", post(generate_report))
        .layer(cors)
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub file_name: Option<String>,
    pub signed_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub columns: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetOverview {
    pub id: u64,
    pub file_name: String,
    pub row_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub preview: Vec<DataRow>,
    pub insight: InsightState,
}

impl DatasetOverview {
    fn new(dataset: &Dataset, preview_rows: usize) -> Self {
        Self {
            id: dataset.id,
            file_name: dataset.file_name.clone(),
            row_count: dataset.table.len(),
            columns: dataset.columns.as_ref().clone(),
            preview: dataset.table.head(preview_rows).to_vec(),
            insight: dataset.insight.clone(),
        }
    }
}

pub async fn upload_dataset(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<DatasetOverview>, AppError> {
    ingest(state, params.file_name, body).await.map(Json)
}

pub async fn fetch_dataset(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FetchRequest>,
) -> Result<Json<DatasetOverview>, AppError> {
    let file_name = request
        .file_name
        .clone()
        .unwrap_or_else(|| file_name_from_url(&request.signed_url));

    // Reject before downloading anything we could not parse.
    file_processor::FileKind::from_file_name(&file_name)?;

    tracing::info!("Downloading {} from URL...", file_name);
    let download_start = std::time::Instant::now();
    let file_data =
        utils::load_file_from_url(&request.signed_url, state.config.max_file_size).await?;
    tracing::info!(
        "File downloaded, size: {}KB, took: {:?}",
        file_data.len() / 1024,
        download_start.elapsed()
    );

    ingest(state, file_name, file_data).await.map(Json)
}

pub async fn current_dataset(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DatasetOverview>, AppError> {
    let dataset = require_dataset(&state)?;
    Ok(Json(DatasetOverview::new(&dataset, state.config.max_rows_for_preview)))
}

pub async fn reset_dataset(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.datasets.clear() {
        tracing::info!("Current dataset cleared");
    }
    StatusCode::NO_CONTENT
}

pub async fn current_insight(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InsightState>, AppError> {
    Ok(Json(require_dataset(&state)?.insight))
}

pub async fn default_chart(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ChartConfig>, AppError> {
    let dataset = require_dataset(&state)?;
    chart::default_chart_config(&dataset.columns)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Dataset has no columns to chart".to_string()))
}

pub async fn render_chart(
    State(state): State<Arc<AppState>>,
    Json(config): Json<ChartConfig>,
) -> Result<Json<ChartData>, AppError> {
    let dataset = require_dataset(&state)?;
    chart::chart_data(&dataset.table, &config).map(Json)
}

pub async fn generate_report(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<AiReport>, AppError> {
    let dataset = require_dataset(&state)?;

    if request.columns.is_empty() {
        return Err(AppError::InvalidInput("Select at least one column".to_string()));
    }
    if let Some(unknown) = request
        .columns
        .iter()
        .find(|name| !dataset.columns.iter().any(|c| &c.name == *name))
    {
        return Err(AppError::InvalidInput(format!("Unknown column: {}", unknown)));
    }

    tracing::info!("Generating report over {} columns", request.columns.len());
    let report = state
        .llm
        .generate_detailed_report(&dataset.table, &request.columns)
        .await?;
    Ok(Json(report))
}

/// Parse, profile and install a new dataset, then start its insight in the
/// background. The upload answers before the insight is ready.
async fn ingest(
    state: Arc<AppState>,
    file_name: String,
    file_data: Bytes,
) -> Result<DatasetOverview, AppError> {
    let limit = state.config.max_file_size;
    if file_data.len() > limit {
        return Err(AppError::FileTooLarge { size: file_data.len(), limit });
    }

    let start = std::time::Instant::now();
    let parse_name = file_name.clone();
    let (table, columns) = tokio::task::spawn_blocking(move || {
        let table = file_processor::parse_file(&parse_name, file_data)?;
        let columns = profiler::analyze_data(&table);
        Ok::<_, AppError>((table, columns))
    })
    .await
    .map_err(|e| AppError::Internal(format!("File processing task failed: {}", e)))??;

    tracing::info!(
        "Profiled {} ({} rows, {} columns) in {:?}",
        file_name,
        table.len(),
        columns.len(),
        start.elapsed()
    );

    let dataset = state.datasets.replace(file_name, table, columns);
    spawn_insight(state.clone(), &dataset);

    Ok(DatasetOverview::new(&dataset, state.config.max_rows_for_preview))
}

fn spawn_insight(state: Arc<AppState>, dataset: &Dataset) {
    let id = dataset.id;
    let table = dataset.table.clone();
    let columns = dataset.columns.clone();
    let llm = state.llm.clone();

    tokio::spawn(async move {
        let generation =
            tokio::spawn(async move { llm.generate_initial_insights(&table, &columns).await });

        let insight = match generation.await {
            Ok(text) => InsightState::Ready(text),
            Err(e) => {
                tracing::error!("Insight task for dataset {} failed: {}", id, e);
                InsightState::Failed(INSIGHT_TASK_FAILED.to_string())
            }
        };
        state.datasets.set_insight(id, insight);
    });
}

fn require_dataset(state: &AppState) -> Result<Dataset, AppError> {
    state
        .datasets
        .current()
        .ok_or_else(|| AppError::NotFound("No dataset has been uploaded".to_string()))
}

fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_string()
}
