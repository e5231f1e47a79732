mod app;

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;

pub use app::{
    AppConfig, AppSection, Environment, IntegrationsSection, PerformanceSection, SecuritySection,
    ServiceToggle, ServicesSection, UiSection,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value `{value}`")]
    InvalidValue { name: &'static str, value: String },
}

/// Process-level settings read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub frontend_origin: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub event_retry_base: Duration,
    pub max_step_transitions: usize,
    pub schedule_poll_interval: Duration,
    pub webhook_timeout: Duration,
    pub app: AppConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            frontend_origin: "http://localhost:5173".to_string(),
            jwt_issuer: "siteflow".to_string(),
            jwt_audience: "siteflow-app".to_string(),
            event_retry_base: Duration::from_millis(5000),
            max_step_transitions: 500,
            schedule_poll_interval: Duration::from_secs(30),
            webhook_timeout: Duration::from_secs(10),
            app: AppConfig::for_environment(Environment::Development),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        let environment = match env::var("APP_ENV") {
            Ok(raw) => raw.parse::<Environment>().map_err(|_| ConfigError::InvalidValue {
                name: "APP_ENV",
                value: raw,
            })?,
            Err(_) => Environment::Development,
        };

        Ok(Config {
            bind_addr: parse_var("BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            frontend_origin: env::var("FRONTEND_ORIGIN").unwrap_or(defaults.frontend_origin),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            jwt_audience: env::var("JWT_AUDIENCE").unwrap_or(defaults.jwt_audience),
            event_retry_base: parse_var::<u64>("EVENT_RETRY_BASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.event_retry_base),
            max_step_transitions: parse_var("WORKFLOW_MAX_STEP_TRANSITIONS")?
                .unwrap_or(defaults.max_step_transitions),
            schedule_poll_interval: parse_var::<u64>("SCHEDULE_POLL_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.schedule_poll_interval),
            webhook_timeout: parse_var::<u64>("WEBHOOK_TIMEOUT_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.webhook_timeout),
            app: AppConfig::for_environment(environment),
        })
    }
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_development_overlay() {
        let config = Config::default();
        assert_eq!(config.app.app.environment, Environment::Development);
        assert_eq!(config.event_retry_base, Duration::from_millis(5000));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn parse_var_rejects_garbage() {
        std::env::set_var("SITEFLOW_TEST_BAD_NUMBER", "twelve");
        let err = parse_var::<u64>("SITEFLOW_TEST_BAD_NUMBER").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "SITEFLOW_TEST_BAD_NUMBER", .. }
        ));
        std::env::remove_var("SITEFLOW_TEST_BAD_NUMBER");
    }

    #[test]
    fn parse_var_missing_is_none() {
        let value = parse_var::<u64>("SITEFLOW_TEST_NEVER_SET").unwrap();
        assert!(value.is_none());
    }
}
