use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use crate::models::{ColumnProfile, Table};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "lowercase")]
pub enum InsightState {
    Pending,
    Ready(String),
    Failed(String),
}

/// The dataset currently loaded, with its profiles and insight status.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: u64,
    pub file_name: String,
    pub table: Arc<Table>,
    pub columns: Arc<Vec<ColumnProfile>>,
    pub insight: InsightState,
}

/// Holds at most one dataset. A new upload replaces the previous one
/// wholesale; nothing is merged.
#[derive(Debug, Default)]
pub struct DatasetSlot {
    current: RwLock<Option<Dataset>>,
    next_id: AtomicU64,
}

impl DatasetSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, file_name: String, table: Table, columns: Vec<ColumnProfile>) -> Dataset {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let dataset = Dataset {
            id,
            file_name,
            table: Arc::new(table),
            columns: Arc::new(columns),
            insight: InsightState::Pending,
        };

        let previous = self.current.write().replace(dataset.clone());
        if let Some(previous) = previous {
            tracing::info!("Dataset {} ({}) replaced by {}", previous.id, previous.file_name, id);
        }
        dataset
    }

    pub fn current(&self) -> Option<Dataset> {
        self.current.read().clone()
    }

    /// Records the insight for dataset `id`. Returns false and drops the
    /// insight when that dataset is no longer current.
    pub fn set_insight(&self, id: u64, insight: InsightState) -> bool {
        let mut guard = self.current.write();
        match guard.as_mut() {
            Some(dataset) if dataset.id == id => {
                dataset.insight = insight;
                true
            }
            _ => {
                tracing::debug!("Dropping insight for stale dataset {}", id);
                false
            }
        }
    }

    pub fn clear(&self) -> bool {
        self.current.write().take().is_some()
    }
}
