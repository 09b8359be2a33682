use assay_common::models::Fields;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use serde_json::json;

const SENSORS: &[(&str, &str)] = &[
    ("sensor_001", "warehouse_a"),
    ("sensor_002", "warehouse_b"),
    ("sensor_003", "warehouse_c"),
];

/// Share of readings sent with a quality issue.
const ISSUE_RATE: f64 = 0.08;

/// Chance of resending a reading as a duplicate.
const DUPLICATE_RATE: f64 = 0.01;

/// Quality problem injected into a reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Issue {
    MissingTimestamp,
    TemperatureOutOfRange,
    /// Timestamp this many minutes in the past
    Late(i64),
    MissingSensorId,
}

/// A generated reading ready to publish.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulatedReading {
    /// Partition key, the sensor id or `"unknown"`
    pub key: String,
    pub reading: Fields,
    pub issue: Option<Issue>,
    /// Whether this is a resend of the previous reading
    pub duplicate: bool,
}

/// Counts of what a simulator has generated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SimulationStats {
    pub generated: u64,
    pub duplicates: u64,
    pub invalid: u64,
    pub late: u64,
}

/// Generates IoT sensor readings, some of them messy.
pub struct SensorSimulator {
    rng: StdRng,
    stats: SimulationStats,
}

impl SensorSimulator {
    /// Create a simulator; a seed makes the output reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            stats: SimulationStats::default(),
        }
    }

    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    /// Generate the next reading, occasionally followed by a duplicate.
    pub fn tick(&mut self) -> Vec<SimulatedReading> {
        self.tick_at(Utc::now())
    }

    /// Like [`tick`](Self::tick) with an explicit clock.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Vec<SimulatedReading> {
        let reading = self.reading_at(now);
        let mut readings = vec![reading.clone()];

        if self.rng.gen_bool(DUPLICATE_RATE) {
            self.stats.duplicates += 1;
            readings.push(SimulatedReading {
                duplicate: true,
                ..reading
            });
        }

        readings
    }

    fn reading_at(&mut self, now: DateTime<Utc>) -> SimulatedReading {
        let (sensor_id, location) = SENSORS[self.rng.gen_range(0..SENSORS.len())];

        let mut reading = Fields::new();
        reading.insert("sensor_id".to_string(), json!(sensor_id));
        reading.insert("location".to_string(), json!(location));
        reading.insert("timestamp".to_string(), json!(iso_timestamp(now)));
        reading.insert("temperature".to_string(), json!(self.uniform(18.0, 28.0)));
        reading.insert("humidity".to_string(), json!(self.uniform(35.0, 65.0)));
        reading.insert("pressure".to_string(), json!(self.uniform(995.0, 1015.0)));

        let issue = self.pick_issue();
        match issue {
            Some(Issue::MissingTimestamp) => {
                reading.remove("timestamp");
            }
            Some(Issue::TemperatureOutOfRange) => {
                let temperature = if self.rng.gen_bool(0.5) {
                    self.uniform(-50.0, -40.5)
                } else {
                    self.uniform(85.5, 100.0)
                };
                reading.insert("temperature".to_string(), json!(temperature));
            }
            Some(Issue::Late(minutes)) => {
                reading.insert(
                    "timestamp".to_string(),
                    json!(iso_timestamp(now - Duration::minutes(minutes))),
                );
            }
            Some(Issue::MissingSensorId) => {
                reading.remove("sensor_id");
            }
            None => {}
        }

        self.stats.generated += 1;
        match issue {
            Some(Issue::Late(_)) => self.stats.late += 1,
            Some(_) => self.stats.invalid += 1,
            None => {}
        }

        let key = reading
            .get("sensor_id")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        SimulatedReading {
            key,
            reading,
            issue,
            duplicate: false,
        }
    }

    /// Issue split: 2% missing timestamp, 3% bad temperature, 2% late and
    /// 1% missing sensor id.
    fn pick_issue(&mut self) -> Option<Issue> {
        let roll: f64 = self.rng.gen_range(0.0..1.0);
        if roll >= ISSUE_RATE {
            return None;
        }

        Some(if roll < 0.02 {
            Issue::MissingTimestamp
        } else if roll < 0.05 {
            Issue::TemperatureOutOfRange
        } else if roll < 0.07 {
            Issue::Late(self.rng.gen_range(10..=60))
        } else {
            Issue::MissingSensorId
        })
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        (self.rng.gen_range(low..high) * 100.0).round() / 100.0
    }
}

/// Naive ISO-8601 with microseconds.
fn iso_timestamp(ts: DateTime<Utc>) -> String {
    ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
