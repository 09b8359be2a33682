use crate::config::DatabaseConfig;
use assay_common::{
    Error, Result,
    models::{CleanRecord, QuarantineRecord, RawRecord},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::{debug, info};

/// A raw record persisted in the staging table.
#[derive(Clone, Debug, PartialEq)]
pub struct StagedRecord {
    /// Staging row id
    pub id: i64,

    /// The record exactly as extracted
    pub raw: RawRecord,
}

/// Repository for the raw zone.
#[async_trait]
pub trait StagingRepository: Send + Sync {
    /// Persist a raw record as unprocessed under `batch_id`.
    async fn insert(&self, batch_id: &str, source: &str, raw: &RawRecord) -> Result<i64>;

    /// Unprocessed records of a batch, in staging order.
    async fn fetch_unprocessed(&self, batch_id: &str) -> Result<Vec<StagedRecord>>;

    /// Flag a staging row as processed so reruns skip it.
    async fn mark_processed(&self, id: i64) -> Result<()>;
}

/// Repository for validated products.
#[async_trait]
pub trait CleanRepository: Send + Sync {
    /// Insert or replace the product with the same natural key.
    async fn upsert(&self, record: &CleanRecord) -> Result<()>;
}

/// Repository for rejected records.
#[async_trait]
pub trait QuarantineRepository: Send + Sync {
    /// Store a rejected record with its reasons.
    async fn insert(&self, record: &QuarantineRecord) -> Result<()>;
}

/// Postgres implementation of the staging repository.
pub struct PgStagingRepository {
    /// Database connection pool
    pool: PgPool,
}

#[async_trait]
impl StagingRepository for PgStagingRepository {
    async fn insert(&self, batch_id: &str, source: &str, raw: &RawRecord) -> Result<i64> {
        debug!(batch_id, source, "Staging raw record");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO raw_products (source, ingestion_time, raw_data, batch_id, processed)
            VALUES ($1, $2, $3::jsonb, $4, FALSE)
            RETURNING id::BIGINT
            "#,
        )
        .bind(source)
        .bind(Utc::now())
        .bind(raw.to_json_text()?)
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to stage raw record: {}", e)))?;

        Ok(id)
    }

    async fn fetch_unprocessed(&self, batch_id: &str) -> Result<Vec<StagedRecord>> {
        debug!(batch_id, "Fetching unprocessed raw records");

        let rows = sqlx::query(
            r#"
            SELECT id::BIGINT AS id, raw_data::TEXT AS raw_data
            FROM raw_products
            WHERE batch_id = $1 AND processed = FALSE
            ORDER BY id
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to fetch raw records: {}", e)))?;

        let records = rows
            .into_iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let raw_data: String = row.get("raw_data");

                StagedRecord {
                    id,
                    raw: RawRecord::from_json(raw_data),
                }
            })
            .collect();

        Ok(records)
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE raw_products SET processed = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to mark record {} processed: {}", id, e)))?;

        Ok(())
    }
}

/// Postgres implementation of the clean product repository.
pub struct PgCleanRepository {
    /// Database connection pool
    pool: PgPool,
}

#[async_trait]
impl CleanRepository for PgCleanRepository {
    async fn upsert(&self, record: &CleanRecord) -> Result<()> {
        let product_id = required_str(record, "product_id")?;
        debug!(product_id, "Upserting clean product");

        sqlx::query(
            r#"
            INSERT INTO clean_products (product_id, name, price, stock, source, category, loaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_id) DO UPDATE
            SET name = EXCLUDED.name,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                source = EXCLUDED.source,
                category = EXCLUDED.category,
                loaded_at = EXCLUDED.loaded_at
            "#,
        )
        .bind(product_id)
        .bind(required_str(record, "name")?)
        .bind(record.get_f64("price"))
        .bind(record.get_i64("stock"))
        .bind(record.get_str("source").unwrap_or("unknown"))
        .bind(record.get_str("category").unwrap_or("Unknown"))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to upsert clean product: {}", e)))?;

        Ok(())
    }
}

fn required_str<'a>(record: &'a CleanRecord, field: &str) -> Result<&'a str> {
    record
        .get_str(field)
        .ok_or_else(|| Error::Validation(format!("Clean record has no {} column value", field)))
}

/// Postgres implementation of the quarantine repository.
pub struct PgQuarantineRepository {
    /// Database connection pool
    pool: PgPool,
}

#[async_trait]
impl QuarantineRepository for PgQuarantineRepository {
    async fn insert(&self, record: &QuarantineRecord) -> Result<()> {
        debug!(reasons = ?record.reasons(), "Quarantining record");

        sqlx::query(
            r#"
            INSERT INTO quarantine_products (raw_data, issues, quarantined_at)
            VALUES ($1::jsonb, $2, $3)
            "#,
        )
        .bind(record.raw().to_json_text()?)
        .bind(record.joined_reasons())
        .bind(record.quarantined_at())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to quarantine record: {}", e)))?;

        Ok(())
    }
}

/// Manager for all repositories.
#[derive(Clone)]
pub struct RepositoryManager {
    /// Raw zone repository
    staging_repo: Arc<dyn StagingRepository>,

    /// Clean zone repository
    clean_repo: Arc<dyn CleanRepository>,

    /// Quarantine repository
    quarantine_repo: Arc<dyn QuarantineRepository>,
}

impl RepositoryManager {
    /// Connect to Postgres and create the repositories.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing database connection");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(
                config.connect_timeout_seconds,
            ))
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(Self {
            staging_repo: Arc::new(PgStagingRepository { pool: pool.clone() }),
            clean_repo: Arc::new(PgCleanRepository { pool: pool.clone() }),
            quarantine_repo: Arc::new(PgQuarantineRepository { pool }),
        })
    }

    /// Back every repository with the same in-memory store.
    pub fn in_memory(store: Arc<MemoryRepository>) -> Self {
        Self {
            staging_repo: Arc::clone(&store) as Arc<dyn StagingRepository>,
            clean_repo: Arc::clone(&store) as Arc<dyn CleanRepository>,
            quarantine_repo: store as Arc<dyn QuarantineRepository>,
        }
    }

    /// Get the staging repository.
    pub fn staging_repository(&self) -> Arc<dyn StagingRepository> {
        Arc::clone(&self.staging_repo)
    }

    /// Get the clean product repository.
    pub fn clean_repository(&self) -> Arc<dyn CleanRepository> {
        Arc::clone(&self.clean_repo)
    }

    /// Get the quarantine repository.
    pub fn quarantine_repository(&self) -> Arc<dyn QuarantineRepository> {
        Arc::clone(&self.quarantine_repo)
    }
}

/// A staging row held by [`MemoryRepository`].
#[derive(Clone, Debug)]
pub struct MemoryStagedRow {
    pub id: i64,
    pub batch_id: String,
    pub source: String,
    pub raw: RawRecord,
    pub processed: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    staged: Vec<MemoryStagedRow>,
    clean: BTreeMap<String, CleanRecord>,
    quarantine: Vec<QuarantineRecord>,
    failing_sink: bool,
}

/// In-memory raw, clean and quarantine zones, used for local runs and tests.
///
/// The clean zone is keyed by `product_id`, mirroring the unique
/// constraint of the Postgres table.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make clean and quarantine writes fail, simulating an outage.
    pub fn set_failing_sink(&self, failing: bool) {
        self.state().failing_sink = failing;
    }

    pub fn staged(&self) -> Vec<MemoryStagedRow> {
        self.state().staged.clone()
    }

    pub fn clean_records(&self) -> Vec<CleanRecord> {
        self.state().clean.values().cloned().collect()
    }

    pub fn quarantined(&self) -> Vec<QuarantineRecord> {
        self.state().quarantine.clone()
    }

    fn check_sink(state: &MemoryState) -> Result<()> {
        if state.failing_sink {
            return Err(Error::Database("Sink unavailable".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl StagingRepository for MemoryRepository {
    async fn insert(&self, batch_id: &str, source: &str, raw: &RawRecord) -> Result<i64> {
        let mut state = self.state();
        let id = state.staged.len() as i64 + 1;

        state.staged.push(MemoryStagedRow {
            id,
            batch_id: batch_id.to_string(),
            source: source.to_string(),
            raw: raw.clone(),
            processed: false,
        });

        Ok(id)
    }

    async fn fetch_unprocessed(&self, batch_id: &str) -> Result<Vec<StagedRecord>> {
        let records = self
            .state()
            .staged
            .iter()
            .filter(|row| row.batch_id == batch_id && !row.processed)
            .map(|row| StagedRecord {
                id: row.id,
                raw: row.raw.clone(),
            })
            .collect();

        Ok(records)
    }

    async fn mark_processed(&self, id: i64) -> Result<()> {
        let mut state = self.state();
        let row = state
            .staged
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| Error::Database(format!("No staging row {}", id)))?;

        row.processed = true;
        Ok(())
    }
}

#[async_trait]
impl CleanRepository for MemoryRepository {
    async fn upsert(&self, record: &CleanRecord) -> Result<()> {
        let mut state = self.state();
        Self::check_sink(&state)?;

        let product_id = required_str(record, "product_id")?.to_string();
        state.clean.insert(product_id, record.clone());

        Ok(())
    }
}

#[async_trait]
impl QuarantineRepository for MemoryRepository {
    async fn insert(&self, record: &QuarantineRecord) -> Result<()> {
        let mut state = self.state();
        Self::check_sink(&state)?;

        state.quarantine.push(record.clone());
        Ok(())
    }
}
