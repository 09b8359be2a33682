pub mod batch;
pub mod config;
pub mod pipeline;
pub mod repository;
pub mod scraper;

// Re-export error handling
pub use assay_common::{Error, Result};
