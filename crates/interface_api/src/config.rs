//! API configuration
//!
//! Read from `BONUS_*` environment variables, for example `BONUS_PORT=8080`
//! or `BONUS_DEFAULT_TIMEZONE=Asia/Tokyo`. Every key has a default.

use serde::Deserialize;

use core_kernel::{TemporalError, Timezone};
use domain_bonus::EngineSettings;
use infra_db::DatabaseConfig;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// IANA zone for facilities without one
    pub default_timezone: String,
    pub terminal_care_window_days: u32,
    pub terminal_care_min_visits: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/bonus".to_string(),
            max_connections: 10,
            min_connections: 1,
            log_level: "info".to_string(),
            default_timezone: "Asia/Tokyo".to_string(),
            terminal_care_window_days: engine.terminal_care_window_days,
            terminal_care_min_visits: engine.terminal_care_min_visits,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `BONUS_*` variables over the defaults
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        config::Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("database_url", defaults.database_url)?
            .set_default("max_connections", i64::from(defaults.max_connections))?
            .set_default("min_connections", i64::from(defaults.min_connections))?
            .set_default("log_level", defaults.log_level)?
            .set_default("default_timezone", defaults.default_timezone)?
            .set_default("terminal_care_window_days", i64::from(defaults.terminal_care_window_days))?
            .set_default("terminal_care_min_visits", i64::from(defaults.terminal_care_min_visits))?
            .add_source(config::Environment::with_prefix("BONUS").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_url)
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
    }

    /// Engine settings, failing on an unknown default timezone
    pub fn engine_settings(&self) -> Result<EngineSettings, TemporalError> {
        let timezone: Timezone = self.default_timezone.parse()?;
        Ok(EngineSettings {
            default_timezone: timezone,
            terminal_care_window_days: self.terminal_care_window_days,
            terminal_care_min_visits: self.terminal_care_min_visits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_settings_from_defaults() {
        let settings = ApiConfig::default().engine_settings().unwrap();
        assert_eq!(settings.default_timezone.name(), "Asia/Tokyo");
        assert_eq!(settings.terminal_care_window_days, 14);
        assert_eq!(settings.terminal_care_min_visits, 2);
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let config = ApiConfig {
            default_timezone: "Atlantis/Capital".to_string(),
            ..ApiConfig::default()
        };
        assert!(config.engine_settings().is_err());
    }

    #[test]
    fn test_database_config_carries_pool_sizes() {
        let config = ApiConfig {
            max_connections: 32,
            ..ApiConfig::default()
        };
        assert_eq!(config.database().max_connections, 32);
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
    }
}
