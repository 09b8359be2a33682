use crate::{Error, Result};
use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load layered configuration from files and environment variables.
///
/// Sources, later ones overriding earlier ones:
/// `$CONFIG_DIR/base.toml`, `$CONFIG_DIR/$RUN_ENV.toml`,
/// `$CONFIG_DIR/local.toml`, then `<env_prefix>__SECTION__KEY` variables.
pub fn load_layered<T: DeserializeOwned>(env_prefix: &str) -> Result<T> {
    let mut config_builder = ConfigLib::builder();

    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".to_string());

    // Base configuration
    let base_config = Path::new(&config_dir).join("base.toml");
    if base_config.exists() {
        config_builder = config_builder.add_source(File::from(base_config));
    }

    // Environment-specific configuration
    let env = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());
    let env_config = Path::new(&config_dir).join(format!("{}.toml", env));
    if env_config.exists() {
        config_builder = config_builder.add_source(File::from(env_config));
    }

    // Local overrides (gitignored)
    let local_config = Path::new(&config_dir).join("local.toml");
    if local_config.exists() {
        config_builder = config_builder.add_source(File::from(local_config));
    }

    config_builder = config_builder.add_source(
        Environment::with_prefix(env_prefix)
            .separator("__")
            .try_parsing(true),
    );

    let config = config_builder
        .build()
        .map_err(|e: ConfigError| Error::Config(e.to_string()))?;

    // Schema checks run during deserialization
    config
        .try_deserialize()
        .map_err(|e| Error::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Settings {
        #[serde(default)]
        name: Option<String>,
    }

    #[test]
    fn missing_files_are_skipped() {
        let settings: Settings = load_layered("ASSAY_LAYERED_TEST_UNUSED").unwrap();

        assert!(settings.name.is_none());
    }
}
