use crate::repository::{RepositoryManager, StagedRecord};
use assay_common::{
    Result,
    dedup::SeenKeys,
    models::{QuarantineRecord, Validation},
    validator::RecordValidator,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Counts produced by one validation run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Records fetched from the raw zone
    pub total: usize,

    /// Records written to the clean zone
    pub valid: usize,

    /// Records written to quarantine
    pub invalid: usize,

    /// Records quarantined because their key repeated within the run
    pub duplicates: usize,

    /// Records left unprocessed after an infrastructure error
    pub skipped: usize,

    /// Reason frequencies, most frequent first
    pub reasons: Vec<(String, usize)>,
}

impl BatchSummary {
    /// Share of fetched records that were valid, in percent.
    pub fn quality_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }

        self.valid as f64 / self.total as f64 * 100.0
    }

    /// Write the summary to the log.
    pub fn log(&self) {
        info!(
            total = self.total,
            valid = self.valid,
            invalid = self.invalid,
            duplicates = self.duplicates,
            skipped = self.skipped,
            quality = format!("{:.1}%", self.quality_percent()),
            "Batch validation report"
        );

        for (reason, count) in &self.reasons {
            info!(reason = %reason, count, "Rejection reason");
        }
    }
}

/// Splits a staged batch into clean and quarantined records.
///
/// Items are processed strictly in staging order. A record is marked
/// processed only once its sink write succeeded, so a rerun resumes
/// exactly where infrastructure errors left off.
pub struct BatchValidator {
    /// Validator for product records
    validator: RecordValidator,

    /// Raw, clean and quarantine repositories
    repositories: RepositoryManager,

    /// Quarantine keys repeated within one run
    dedupe: bool,
}

enum Routed {
    Clean,
    Quarantined { duplicate: bool },
}

impl BatchValidator {
    pub fn new(validator: RecordValidator, repositories: RepositoryManager, dedupe: bool) -> Self {
        Self {
            validator,
            repositories,
            dedupe,
        }
    }

    /// Validate every unprocessed record of `batch_id`.
    ///
    /// Only a failure to read the raw zone is returned as an error; per
    /// item failures are logged and counted as skipped.
    pub async fn run(&self, batch_id: &str) -> Result<BatchSummary> {
        let staged = self
            .repositories
            .staging_repository()
            .fetch_unprocessed(batch_id)
            .await?;

        info!(batch_id, count = staged.len(), "Validating raw records");

        let mut summary = BatchSummary {
            total: staged.len(),
            ..BatchSummary::default()
        };
        let mut reasons: HashMap<String, usize> = HashMap::new();
        let mut seen = SeenKeys::new();

        for item in staged {
            let id = item.id;

            match self.process(item, &mut seen, &mut reasons).await {
                Ok(Routed::Clean) => summary.valid += 1,
                Ok(Routed::Quarantined { duplicate }) => {
                    summary.invalid += 1;
                    if duplicate {
                        summary.duplicates += 1;
                    }
                }
                Err(e) => {
                    error!(id, error = %e, "Skipping raw record");
                    summary.skipped += 1;
                }
            }
        }

        let mut reasons: Vec<(String, usize)> = reasons.into_iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        summary.reasons = reasons;

        Ok(summary)
    }

    async fn process(
        &self,
        item: StagedRecord,
        seen: &mut SeenKeys,
        reasons: &mut HashMap<String, usize>,
    ) -> Result<Routed> {
        let key_fields = self.validator.schema().key_fields();
        let duplicate = match item.raw.key(key_fields) {
            Some(key) if self.dedupe => seen.check_and_insert(&key),
            _ => false,
        };

        let outcome = match self.validator.validate(&item.raw) {
            Validation::Valid(_) if duplicate => Validation::Invalid(QuarantineRecord::new(
                item.raw.clone(),
                vec![duplicate_reason(key_fields)],
            )),
            Validation::Invalid(rejected) if duplicate => {
                let mut all = rejected.reasons().to_vec();
                all.push(duplicate_reason(key_fields));
                Validation::Invalid(QuarantineRecord::new(item.raw.clone(), all))
            }
            outcome => outcome,
        };

        let routed = match &outcome {
            Validation::Valid(clean) => {
                self.repositories.clean_repository().upsert(clean).await?;
                debug!(id = item.id, "Loaded clean record");
                Routed::Clean
            }
            Validation::Invalid(rejected) => {
                self.repositories
                    .quarantine_repository()
                    .insert(rejected)
                    .await?;
                warn!(id = item.id, reasons = %rejected.joined_reasons(), "Quarantined record");
                Routed::Quarantined { duplicate }
            }
        };

        self.repositories
            .staging_repository()
            .mark_processed(item.id)
            .await?;

        for reason in outcome.reasons() {
            *reasons.entry(reason.clone()).or_default() += 1;
        }

        Ok(routed)
    }
}

fn duplicate_reason(key_fields: &[String]) -> String {
    format!("duplicate {}", key_fields.join(", "))
}
