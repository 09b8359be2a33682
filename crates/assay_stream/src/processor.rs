use crate::{config::StreamConfig, consumer::MessageSource, repository::ReadingRepository};
use assay_common::{
    Result,
    dedup::SeenKeys,
    models::{RawRecord, Validation},
    validator::RecordValidator,
};
use bon::Builder;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};

/// Running counters of a stream validation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Messages received, duplicates included
    pub processed: u64,
    pub valid: u64,
    pub invalid: u64,
    pub duplicate: u64,
    /// Writes that failed and were dropped
    pub sink_errors: u64,
    /// Occurrences of each rejection reason
    pub reasons: BTreeMap<String, u64>,
}

impl StreamStats {
    /// Percentage of processed messages that were valid.
    pub fn valid_percent(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }

        self.valid as f64 / self.processed as f64 * 100.0
    }

    /// Rejection reasons, most frequent first.
    pub fn reason_breakdown(&self) -> Vec<(&str, u64)> {
        let mut reasons: Vec<(&str, u64)> = self
            .reasons
            .iter()
            .map(|(reason, count)| (reason.as_str(), *count))
            .collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        reasons
    }

    pub fn log(&self) {
        info!(
            processed = self.processed,
            valid = self.valid,
            invalid = self.invalid,
            duplicate = self.duplicate,
            sink_errors = self.sink_errors,
            reasons = ?self.reason_breakdown(),
            "Stream validation progress"
        );
    }
}

/// What happened to a single message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Identifier already seen this run; dropped before validation
    Duplicate,
    Valid,
    Invalid,
}

/// Loop controls for [`StreamValidator::run`].
#[derive(Clone, Debug, Builder)]
pub struct RunOptions {
    /// Log counters every this many messages
    #[builder(default = 50)]
    pub report_every: u64,

    /// Stop after this many messages
    pub max_messages: Option<u64>,

    /// Stop after this long without a message
    pub idle_timeout: Option<Duration>,

    /// Longest wait on the source before checking for shutdown
    #[builder(default = Duration::from_secs(1))]
    pub poll_interval: Duration,
}

impl From<&StreamConfig> for RunOptions {
    fn from(config: &StreamConfig) -> Self {
        let idle_timeout = (config.idle_timeout_seconds > 0)
            .then(|| Duration::from_secs(config.idle_timeout_seconds));

        Self {
            report_every: config.report_every,
            max_messages: config.max_messages,
            idle_timeout,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }
}

/// Validates a stream of readings one message at a time.
///
/// A message whose identifier was already seen is counted as a duplicate
/// and dropped without validation. Everything else is validated and
/// written to the reading repository. Failed writes are logged and
/// dropped.
pub struct StreamValidator {
    validator: RecordValidator,
    repository: Arc<dyn ReadingRepository>,
    seen: SeenKeys,
    stats: StreamStats,
}

impl StreamValidator {
    pub fn new(
        validator: RecordValidator,
        repository: Arc<dyn ReadingRepository>,
        seen: SeenKeys,
    ) -> Self {
        Self {
            validator,
            repository,
            seen,
            stats: StreamStats::default(),
        }
    }

    /// Build a validator with the seen-key bound from `config`.
    pub fn from_config(
        validator: RecordValidator,
        repository: Arc<dyn ReadingRepository>,
        config: &StreamConfig,
    ) -> Self {
        let seen = match config.seen_capacity {
            Some(capacity) => SeenKeys::bounded(capacity),
            None => SeenKeys::new(),
        };

        Self::new(validator, repository, seen)
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Process one message.
    pub async fn process(&mut self, raw: RawRecord) -> Outcome {
        self.stats.processed += 1;

        if let Some(key) = raw.key(self.validator.schema().key_fields()) {
            if self.seen.check_and_insert(&key) {
                self.stats.duplicate += 1;
                // Only the first of every ten
                if self.stats.duplicate % 10 == 1 {
                    warn!(key = %key, "Duplicate reading detected");
                }
                return Outcome::Duplicate;
            }
        }

        match self.validator.validate(&raw) {
            Validation::Valid(clean) => {
                self.stats.valid += 1;
                if let Err(e) = self.repository.store_valid(&clean).await {
                    self.stats.sink_errors += 1;
                    error!("Failed to store valid reading: {}", e);
                }
                Outcome::Valid
            }
            Validation::Invalid(quarantined) => {
                self.stats.invalid += 1;
                for reason in quarantined.reasons() {
                    *self.stats.reasons.entry(reason.clone()).or_default() += 1;
                }
                debug!(reasons = %quarantined.joined_reasons(), "Invalid reading");
                if let Err(e) = self.repository.store_invalid(&quarantined).await {
                    self.stats.sink_errors += 1;
                    error!("Failed to store invalid reading: {}", e);
                }
                Outcome::Invalid
            }
        }
    }

    /// Consume `source` until it closes, goes idle, reaches the message
    /// limit, or `running` is cleared.
    pub async fn run(
        &mut self,
        source: &mut dyn MessageSource,
        options: &RunOptions,
        running: Arc<AtomicBool>,
    ) -> Result<StreamStats> {
        info!("Starting stream validation");

        let mut last_message = Instant::now();
        let mut received = 0u64;

        while running.load(Ordering::SeqCst) {
            if let Some(limit) = options.max_messages {
                if received >= limit {
                    info!("Reached max messages ({})", limit);
                    break;
                }
            }

            let payload = match timeout(options.poll_interval, source.next_payload()).await {
                Err(_) => {
                    if let Some(idle) = options.idle_timeout {
                        if last_message.elapsed() >= idle {
                            info!("No messages for {:?}, stopping", idle);
                            break;
                        }
                    }
                    continue;
                }
                Ok(None) => {
                    warn!("Message source closed");
                    break;
                }
                Ok(Some(Err(e))) => {
                    error!("Error receiving message: {}", e);
                    continue;
                }
                Ok(Some(Ok(payload))) => payload,
            };

            last_message = Instant::now();
            received += 1;

            self.process(RawRecord::from_bytes(payload)).await;

            if options.report_every > 0 && self.stats.processed % options.report_every == 0 {
                self.stats.log();
            }
        }

        if received == 0 {
            warn!("No messages were received");
        }

        self.stats.log();
        info!(
            "Stream validation finished, {:.1}% valid",
            self.stats.valid_percent()
        );

        Ok(self.stats.clone())
    }
}
