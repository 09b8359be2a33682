use assay_batch::{config::Config, pipeline::ProductPipeline, repository::RepositoryManager};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting Assay batch pipeline");

    // Load configuration
    info!("Loading configuration");
    let config = Config::load()?;
    info!("Configuration loaded successfully");

    // Connect to database
    info!("Connecting to database");
    let repository_manager = RepositoryManager::new(&config.database).await?;
    info!("Database connection established");

    let pipeline = ProductPipeline::new(config, repository_manager);

    match pipeline.run().await {
        Ok(report) => {
            report.log();
            Ok(())
        }
        Err(e) => {
            error!("Pipeline error: {}", e);
            Err(e.into())
        }
    }
}
