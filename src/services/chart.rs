use serde::Serialize;
use std::collections::HashMap;
use crate::error::AppError;
use crate::models::{ChartConfig, ChartType, ColumnProfile, ColumnType, DataRow, Table};

/// Rows handed to cartesian charts; larger tables are truncated.
pub const MAX_CHART_ROWS: usize = 100;
/// Pie charts keep only the largest slices.
pub const MAX_PIE_SLICES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartSeries {
    Rows(Vec<DataRow>),
    Slices(Vec<PieSlice>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub config: ChartConfig,
    pub data: ChartSeries,
}

/// Starting configuration for a fresh dataset: a bar chart of the first
/// number column (or the first column) against the first column.
pub fn default_chart_config(columns: &[ColumnProfile]) -> Option<ChartConfig> {
    let x_axis = columns.first()?.name.clone();
    let y_axis = columns
        .iter()
        .find(|c| c.column_type == ColumnType::Number)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| x_axis.clone());

    Some(ChartConfig {
        chart_type: ChartType::Bar,
        x_axis,
        y_axis: vec![y_axis],
        title: String::new(),
    })
}

pub fn chart_data(table: &Table, config: &ChartConfig) -> Result<ChartData, AppError> {
    if config.y_axis.is_empty() {
        return Err(AppError::InvalidInput("At least one y-axis column is required".to_string()));
    }
    for column in std::iter::once(&config.x_axis).chain(config.y_axis.iter()) {
        if !table.has_column(column) {
            return Err(AppError::InvalidInput(format!("Unknown column: {}", column)));
        }
    }

    let data = match config.chart_type {
        ChartType::Pie => ChartSeries::Slices(pie_slices(table, &config.x_axis, &config.y_axis[0])),
        _ => ChartSeries::Rows(table.head(MAX_CHART_ROWS).to_vec()),
    };

    Ok(ChartData {
        config: config.clone(),
        data,
    })
}

/// Sums `value_column` per distinct `label_column` display string. Values
/// that do not read as numbers count as zero.
fn pie_slices(table: &Table, label_column: &str, value_column: &str) -> Vec<PieSlice> {
    let mut order: Vec<String> = Vec::new();
    let mut totals: HashMap<String, f64> = HashMap::new();

    for (label, value) in table
        .column_values(label_column)
        .zip(table.column_values(value_column))
    {
        let name = label.to_string();
        let amount = value.to_number_lossy().unwrap_or(0.0);
        match totals.get_mut(&name) {
            Some(total) => *total += amount,
            None => {
                totals.insert(name.clone(), amount);
                order.push(name);
            }
        }
    }

    let mut slices: Vec<PieSlice> = order
        .into_iter()
        .map(|name| {
            let value = totals[&name];
            PieSlice { name, value }
        })
        .collect();
    // Stable sort keeps first-seen order among equal totals.
    slices.sort_by(|a, b| b.value.total_cmp(&a.value));
    slices.truncate(MAX_PIE_SLICES);
    slices
}
