pub mod config;
pub mod dedup;
pub mod error;
pub mod models;
pub mod schema;
pub mod utils;
pub mod validator;

pub use error::{Error, Result};
