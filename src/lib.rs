pub mod aggregation;
pub mod charts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod filter;
pub mod format;
pub mod insights;
pub mod llm;
pub mod options;
