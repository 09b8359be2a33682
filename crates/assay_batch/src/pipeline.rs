use crate::{
    batch::{BatchSummary, BatchValidator},
    config::Config,
    repository::RepositoryManager,
    scraper::ProductScraper,
};
use assay_common::{Error, Result, models::RawRecord, validator::RecordValidator};
use tracing::{error, info};
use uuid::Uuid;

/// What one pipeline run did, stage by stage.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineReport {
    pub batch_id: String,
    pub extracted: usize,
    pub loaded_raw: usize,
    pub summary: BatchSummary,
}

impl PipelineReport {
    pub fn log(&self) {
        info!(
            batch_id = %self.batch_id,
            extracted = self.extracted,
            loaded_raw = self.loaded_raw,
            "Pipeline execution report"
        );
        self.summary.log();
    }
}

/// The daily product pipeline: extract, load raw, validate, report.
pub struct ProductPipeline {
    config: Config,
    repositories: RepositoryManager,
}

impl ProductPipeline {
    pub fn new(config: Config, repositories: RepositoryManager) -> Self {
        Self {
            config,
            repositories,
        }
    }

    /// The configured batch id, or a freshly generated one.
    pub fn batch_id(&self) -> String {
        self.config
            .batch
            .batch_id
            .clone()
            .unwrap_or_else(|| format!("manual__{}", Uuid::new_v4()))
    }

    /// Scrape every configured source.
    pub fn extract(&self) -> Vec<(String, RawRecord)> {
        let extract = &self.config.extract;
        let mut scraper = ProductScraper::new(extract.seed);
        let mut products = Vec::new();

        for source in &extract.sources {
            let scraped = scraper.scrape_source(source, extract.products_per_source);
            info!(source = %source, count = scraped.len(), "Scraped products");
            products.extend(scraped.into_iter().map(|p| (source.clone(), p)));
        }

        products
    }

    /// Store scraped products in the raw zone, unprocessed.
    pub async fn load_raw(&self, batch_id: &str, products: &[(String, RawRecord)]) -> Result<usize> {
        if products.is_empty() {
            return Err(Error::Validation("No products to load".to_string()));
        }

        let staging = self.repositories.staging_repository();
        let mut loaded = 0;

        for (source, product) in products {
            match staging.insert(batch_id, source, product).await {
                Ok(_) => loaded += 1,
                Err(e) => error!(source = %source, error = %e, "Failed to load raw product"),
            }
        }

        info!(batch_id, loaded, "Loaded products to raw zone");
        Ok(loaded)
    }

    /// Validate the batch into the clean and quarantine zones.
    pub async fn validate(&self, batch_id: &str) -> Result<BatchSummary> {
        let validator = BatchValidator::new(
            RecordValidator::new(self.config.schema.clone()),
            self.repositories.clone(),
            self.config.batch.dedupe,
        );

        validator.run(batch_id).await
    }

    /// Run every enabled stage in order.
    pub async fn run(&self) -> Result<PipelineReport> {
        let batch_id = self.batch_id();
        info!(batch_id = %batch_id, "Starting product pipeline");

        let (extracted, loaded_raw) = if self.config.extract.enabled {
            let products = self.extract();
            let loaded = self.load_raw(&batch_id, &products).await?;
            (products.len(), loaded)
        } else {
            info!("Extraction disabled, validating existing batch");
            (0, 0)
        };

        let summary = self.validate(&batch_id).await?;

        Ok(PipelineReport {
            batch_id,
            extracted,
            loaded_raw,
            summary,
        })
    }
}
