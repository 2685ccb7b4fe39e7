use serde::{Deserialize, Serialize};

#[cfg(feature = "database")]
use crate::database::DatabaseConfig;
use crate::error::MemberflowError;
use crate::subscriptions::config::{EngineConfig, GraceBoundary, PeriodUnit};
use crate::utils::get_env_with_prefix;

/// Main configuration for a memberflow deployment
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[cfg(feature = "database")]
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an unknown log level, zero or inverted
    /// listing page sizes, a zero operation timeout, or a database pool whose
    /// minimum exceeds its maximum.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(MemberflowError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        self.engine.validate()?;

        #[cfg(feature = "database")]
        self.database.validate()?;

        Ok(())
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.config.engine = engine;
        self
    }

    pub fn with_period_unit(mut self, unit: PeriodUnit) -> Self {
        self.config.engine.period_unit = unit;
        self
    }

    pub fn with_grace_boundary(mut self, boundary: GraceBoundary) -> Self {
        self.config.engine.grace_boundary = boundary;
        self
    }

    #[cfg(feature = "database")]
    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.config.database = database;
        self
    }

    /// Load configuration from environment variables with MEMBERFLOW_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }

        self.config.engine = EngineConfig::from_env();

        #[cfg(feature = "database")]
        if let Some(database) = DatabaseConfig::from_env() {
            self.config.database = database.with_env_overrides();
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// See [`Config::validate`].
    pub fn build(self) -> crate::error::Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert_eq!(config.engine.period_unit, PeriodUnit::Weeks);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = ConfigBuilder::new().with_log_level("verbose").build();
        assert!(matches!(result, Err(MemberflowError::BadRequest(_))));
    }

    #[test]
    fn test_log_level_case_insensitive() {
        assert!(ConfigBuilder::new().with_log_level("DEBUG").build().is_ok());
    }

    #[test]
    fn test_engine_validation_propagates() {
        let engine = EngineConfig::new().with_listing_per_page(0, 0);
        let result = ConfigBuilder::new().with_engine(engine).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ConfigBuilder::new()
            .with_period_unit(PeriodUnit::Days)
            .with_grace_boundary(GraceBoundary::Window)
            .with_json_logging(true)
            .build()
            .unwrap();
        assert_eq!(config.engine.period_unit, PeriodUnit::Days);
        assert_eq!(config.engine.grace_boundary, GraceBoundary::Window);
        assert!(config.logging.json);
    }

    #[test]
    fn test_from_env_log_settings() {
        unsafe {
            std::env::set_var("MEMBERFLOW_LOG_LEVEL", "warn");
            std::env::set_var("MEMBERFLOW_LOG_JSON", "true");
        }

        let config = ConfigBuilder::new().from_env().build().unwrap();
        assert_eq!(config.logging.level, "warn");
        assert!(config.logging.json);

        unsafe {
            std::env::remove_var("MEMBERFLOW_LOG_LEVEL");
            std::env::remove_var("MEMBERFLOW_LOG_JSON");
        }
    }
}
