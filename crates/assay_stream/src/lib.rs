pub mod config;
pub mod consumer;
pub mod processor;
pub mod producer;
pub mod repository;
pub mod simulator;

// Re-export error handling
pub use assay_common::{Error, Result};
