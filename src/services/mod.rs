pub mod chart;
pub mod dataset_store;
pub mod file_processor;
pub mod llm_agent;
pub mod profiler;
pub mod utils;
