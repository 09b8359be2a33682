use crate::config::DatabaseConfig;
use assay_common::{
    Error, Result,
    models::{CleanRecord, QuarantineRecord, RawRecord},
    utils::{current_timestamp, parse_timestamp},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Repository for validated and rejected sensor readings.
#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Store a reading that passed validation.
    async fn store_valid(&self, reading: &CleanRecord) -> Result<()>;

    /// Store a rejected reading with its reasons.
    async fn store_invalid(&self, reading: &QuarantineRecord) -> Result<()>;
}

/// TimescaleDB implementation of the reading repository.
pub struct PgReadingRepository {
    /// Database connection pool
    pool: PgPool,
}

#[async_trait]
impl ReadingRepository for PgReadingRepository {
    async fn store_valid(&self, reading: &CleanRecord) -> Result<()> {
        let sensor_id = reading
            .get_str("sensor_id")
            .ok_or_else(|| Error::Validation("Reading has no sensor_id".to_string()))?;
        let time = reading
            .get_str("timestamp")
            .and_then(parse_timestamp)
            .ok_or_else(|| Error::Validation("Reading has no usable timestamp".to_string()))?;

        debug!(sensor_id, %time, "Storing valid reading");

        sqlx::query(
            r#"
            INSERT INTO sensor_readings (time, sensor_id, temperature, humidity, pressure, location)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(time)
        .bind(sensor_id)
        .bind(reading.get_f64("temperature"))
        .bind(reading.get_f64("humidity"))
        .bind(reading.get_f64("pressure"))
        .bind(reading.get_str("location").unwrap_or("unknown"))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to store reading: {}", e)))?;

        Ok(())
    }

    async fn store_invalid(&self, reading: &QuarantineRecord) -> Result<()> {
        let raw = reading.raw();
        let (time, sensor_id) = invalid_row_identity(raw);

        debug!(sensor_id, reasons = ?reading.reasons(), "Storing invalid reading");

        sqlx::query(
            r#"
            INSERT INTO sensor_readings_invalid (time, sensor_id, raw_data, issues)
            VALUES ($1, $2, $3::jsonb, $4)
            "#,
        )
        .bind(time)
        .bind(sensor_id)
        .bind(raw.to_json_text()?)
        .bind(reading.joined_reasons())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to store invalid reading: {}", e)))?;

        Ok(())
    }
}

/// Time and sensor columns of an invalid row. Both fall back when the
/// reading itself cannot supply them.
fn invalid_row_identity(raw: &RawRecord) -> (DateTime<Utc>, String) {
    let time = raw
        .get_text("timestamp")
        .and_then(|ts| parse_timestamp(&ts))
        .unwrap_or_else(current_timestamp);
    let sensor_id = raw
        .get_text("sensor_id")
        .unwrap_or_else(|| "unknown".to_string());

    (time, sensor_id)
}

/// Manager for all repositories.
#[derive(Clone)]
pub struct RepositoryManager {
    /// Valid and invalid readings repository
    reading_repo: Arc<dyn ReadingRepository>,
}

impl RepositoryManager {
    /// Connect to TimescaleDB and create the repositories.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing database connection");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.connect_timeout_seconds,
            ))
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(Self {
            reading_repo: Arc::new(PgReadingRepository { pool }),
        })
    }

    pub fn in_memory(store: Arc<MemoryReadingRepository>) -> Self {
        Self {
            reading_repo: store as Arc<dyn ReadingRepository>,
        }
    }

    /// Get the reading repository.
    pub fn reading_repository(&self) -> Arc<dyn ReadingRepository> {
        Arc::clone(&self.reading_repo)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    valid: Vec<CleanRecord>,
    invalid: Vec<QuarantineRecord>,
    failing: bool,
}

/// In-memory reading tables, used for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryReadingRepository {
    state: Mutex<MemoryState>,
}

impl MemoryReadingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every write fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    pub fn valid(&self) -> Vec<CleanRecord> {
        self.state().valid.clone()
    }

    pub fn invalid(&self) -> Vec<QuarantineRecord> {
        self.state().invalid.clone()
    }

    fn check_available(state: &MemoryState) -> Result<()> {
        if state.failing {
            return Err(Error::Database("Reading store unavailable".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl ReadingRepository for MemoryReadingRepository {
    async fn store_valid(&self, reading: &CleanRecord) -> Result<()> {
        let mut state = self.state();
        Self::check_available(&state)?;

        state.valid.push(reading.clone());
        Ok(())
    }

    async fn store_invalid(&self, reading: &QuarantineRecord) -> Result<()> {
        let mut state = self.state();
        Self::check_available(&state)?;

        state.invalid.push(reading.clone());
        Ok(())
    }
}
