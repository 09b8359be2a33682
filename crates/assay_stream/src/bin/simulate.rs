use assay_stream::{config::SimulatorSettings, producer::KafkaProducer, simulator::SensorSimulator};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting Assay sensor simulator");

    let settings = SimulatorSettings::load()?;
    let producer = KafkaProducer::new(&settings.kafka)?;
    let mut simulator = SensorSimulator::new(settings.simulator.seed);

    let rate = settings.simulator.readings_per_second.max(1);
    let duration = Duration::from_secs(settings.simulator.duration_seconds);
    info!(
        rate,
        duration_seconds = settings.simulator.duration_seconds,
        topic = %settings.kafka.topics.raw_readings,
        "Publishing sensor readings"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(1) / rate);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let started = Instant::now();
    let mut sent = 0u64;
    let mut failed = 0u64;

    while started.elapsed() < duration {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C signal");
                break;
            }
        }

        for simulated in simulator.tick() {
            if simulated.duplicate {
                warn!(key = %simulated.key, "Sending duplicate reading");
            } else if let Some(issue) = simulated.issue {
                warn!(key = %simulated.key, ?issue, "Sending reading with a quality issue");
            }

            match producer.send_reading(&simulated.key, &simulated.reading).await {
                Ok(()) => {
                    sent += 1;
                    if sent % 50 == 0 {
                        info!("Sent {} readings", sent);
                    }
                }
                Err(e) => {
                    failed += 1;
                    error!("Failed to send reading: {}", e);
                }
            }
        }
    }

    producer.flush()?;

    let stats = simulator.stats();
    info!(
        sent,
        failed,
        duplicates = stats.duplicates,
        invalid = stats.invalid,
        late = stats.late,
        elapsed_seconds = started.elapsed().as_secs_f64(),
        "Simulator stopped"
    );

    Ok(())
}
