use assay_common::validator::RecordValidator;
use assay_stream::{
    config::Config,
    consumer::KafkaConsumer,
    processor::{RunOptions, StreamValidator},
    repository::RepositoryManager,
};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting Assay stream validator");

    // Load configuration
    info!("Loading configuration");
    let config = Config::load()?;
    info!("Configuration loaded successfully");

    // Connect to database
    info!("Connecting to database");
    let repository_manager = RepositoryManager::new(&config.database).await?;
    info!("Database connection established");

    let mut consumer = KafkaConsumer::new(&config.kafka)?;
    let mut validator = StreamValidator::from_config(
        RecordValidator::new(config.schema.clone()),
        repository_manager.reading_repository(),
        &config.stream,
    );

    // Handle shutdown gracefully
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C signal");
            },
            _ = terminate => {
                info!("Received SIGTERM signal");
            }
        }

        info!("Shutting down gracefully");
        running_clone.store(false, Ordering::SeqCst);
    });

    let options = RunOptions::from(&config.stream);
    let result = validator.run(&mut consumer, &options, running).await;
    consumer.stop();

    if let Err(e) = result {
        error!("Stream validator error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
