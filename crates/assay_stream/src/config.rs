use assay_common::{Error, config::load_layered, schema::Schema};
use bon::Builder;
use serde::{Deserialize, Serialize};

/// Configuration for the stream validator service.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct Config {
    /// TimescaleDB holding the valid and invalid reading tables
    pub database: DatabaseConfig,

    /// Kafka configuration for consuming readings
    pub kafka: KafkaConfig,

    /// Processing loop configuration
    #[builder(default)]
    #[serde(default)]
    pub stream: StreamConfig,

    /// Reading schema; the built-in one unless overridden
    #[builder(default = Schema::sensor_readings())]
    #[serde(default = "Schema::sensor_readings")]
    pub schema: Schema,
}

/// Configuration for the sensor simulator.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct SimulatorSettings {
    /// Kafka configuration for publishing readings
    pub kafka: KafkaConfig,

    /// Generation settings
    #[builder(default)]
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Database configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct DatabaseConfig {
    /// Database URL
    #[builder(into)]
    pub url: String,

    /// Maximum connections in the pool
    #[builder(default = default_max_connections())]
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds
    #[builder(default = default_connect_timeout())]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

/// Kafka configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct KafkaConfig {
    /// Comma-separated list of broker addresses
    #[builder(into)]
    pub brokers: String,

    /// Client ID for Kafka connection
    #[builder(default = default_client_id())]
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Consumer group ID
    #[builder(default = default_group_id())]
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Kafka topics configuration
    #[builder(default)]
    #[serde(default)]
    pub topics: KafkaTopics,
}

/// Kafka topics configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct KafkaTopics {
    /// Topic carrying raw sensor readings
    #[builder(default = default_raw_readings_topic())]
    #[serde(default = "default_raw_readings_topic")]
    pub raw_readings: String,
}

/// Processing loop configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct StreamConfig {
    /// Log the running counters every this many messages
    #[builder(default = default_report_every())]
    #[serde(default = "default_report_every")]
    pub report_every: u64,

    /// Stop after this many messages
    pub max_messages: Option<u64>,

    /// Stop after this long without a message; 0 waits forever
    #[builder(default = default_idle_timeout())]
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// How often the loop wakes up to check for shutdown, in milliseconds
    #[builder(default = default_poll_interval_ms())]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Bound on remembered reading keys; unbounded when unset
    pub seen_capacity: Option<usize>,
}

/// Sensor simulator configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Builder)]
pub struct SimulatorConfig {
    /// How long to publish for
    #[builder(default = default_duration_seconds())]
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,

    /// Publishing rate
    #[builder(default = default_readings_per_second())]
    #[serde(default = "default_readings_per_second")]
    pub readings_per_second: u32,

    /// Seed for reproducible readings
    pub seed: Option<u64>,
}

impl Default for KafkaTopics {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_client_id() -> String {
    "assay-stream".to_string()
}

fn default_group_id() -> String {
    "sensor_validator_group".to_string()
}

fn default_raw_readings_topic() -> String {
    "sensor_readings_raw".to_string()
}

fn default_report_every() -> u64 {
    50
}

fn default_idle_timeout() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_duration_seconds() -> u64 {
    60
}

fn default_readings_per_second() -> u32 {
    10
}

impl Config {
    /// Load configuration from files and `ASSAY_STREAM__*` environment variables.
    pub fn load() -> Result<Self, Error> {
        load_layered("ASSAY_STREAM")
    }
}

impl SimulatorSettings {
    /// Load simulator settings from the same sources as [`Config`].
    pub fn load() -> Result<Self, Error> {
        load_layered("ASSAY_STREAM")
    }
}
