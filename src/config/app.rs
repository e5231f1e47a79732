use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSection {
    pub name: String,
    pub version: String,
    pub environment: Environment,
    pub api_base_url: String,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UiSection {
    pub theme: String,
    pub items_per_page: u32,
    pub toast_duration_ms: u64,
    pub date_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceToggle {
    pub enabled: bool,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicesSection {
    pub email: ServiceToggle,
    pub notifications: ServiceToggle,
    pub storage: ServiceToggle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationsSection {
    pub webhooks_enabled: bool,
    pub max_webhooks: u32,
    pub api_keys_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySection {
    pub session_timeout_minutes: u32,
    pub password_min_length: usize,
    pub max_login_attempts: u32,
    pub require_https: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSection {
    pub event_retry_limit: u32,
    pub max_concurrent_workflows: u32,
    pub cache_ttl_seconds: u64,
}

/// Product configuration shared with clients. The environment overlay is
/// applied once at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app: AppSection,
    pub features: BTreeMap<String, bool>,
    pub feature_flags: BTreeMap<String, bool>,
    pub ui: UiSection,
    pub services: ServicesSection,
    pub integrations: IntegrationsSection,
    pub security: SecuritySection,
    pub performance: PerformanceSection,
}

impl AppConfig {
    pub fn for_environment(env: Environment) -> Self {
        let mut config = Self::base();
        config.app.environment = env;
        match env {
            Environment::Development => {
                config.app.debug = true;
                config.features.insert("demoData".into(), true);
                config.feature_flags.insert("verboseWorkflowLogs".into(), true);
            }
            Environment::Staging => {
                config.app.api_base_url = "https://staging.siteflow.app/api".into();
                config.features.insert("demoData".into(), true);
                config.security.require_https = true;
            }
            Environment::Production => {
                config.app.api_base_url = "https://siteflow.app/api".into();
                config.security.require_https = true;
                config.security.session_timeout_minutes = 30;
                config.performance.cache_ttl_seconds = 600;
            }
        }
        config
    }

    fn base() -> Self {
        let features = [
            ("automationRules", true),
            ("workflows", true),
            ("webhooks", true),
            ("notifications", true),
            ("demoData", false),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        AppConfig {
            app: AppSection {
                name: "SiteFlow".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                environment: Environment::Development,
                api_base_url: "http://localhost:3000/api".into(),
                debug: false,
            },
            features,
            feature_flags: BTreeMap::new(),
            ui: UiSection {
                theme: "light".into(),
                items_per_page: 20,
                toast_duration_ms: 5000,
                date_format: "YYYY-MM-DD".into(),
            },
            services: ServicesSection {
                email: ServiceToggle {
                    enabled: true,
                    provider: "smtp".into(),
                },
                notifications: ServiceToggle {
                    enabled: true,
                    provider: "in_app".into(),
                },
                storage: ServiceToggle {
                    enabled: false,
                    provider: "local".into(),
                },
            },
            integrations: IntegrationsSection {
                webhooks_enabled: true,
                max_webhooks: 25,
                api_keys_enabled: true,
            },
            security: SecuritySection {
                session_timeout_minutes: 120,
                password_min_length: 6,
                max_login_attempts: 5,
                require_https: false,
            },
            performance: PerformanceSection {
                event_retry_limit: 3,
                max_concurrent_workflows: 50,
                cache_ttl_seconds: 300,
            },
        }
    }

    /// `features[name] || feature_flags[name]`; unknown names are off.
    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
            || self.feature_flags.get(name).copied().unwrap_or(false)
    }

    /// The subset of the configuration that is safe to hand to clients.
    pub fn public_view(&self) -> Value {
        json!({
            "app": self.app,
            "features": self.features,
            "featureFlags": self.feature_flags,
            "ui": self.ui,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_lookup_falls_back_to_flags() {
        let mut config = AppConfig::for_environment(Environment::Production);
        assert!(!config.is_feature_enabled("betaScheduler"));

        config.feature_flags.insert("betaScheduler".into(), true);
        assert!(config.is_feature_enabled("betaScheduler"));

        config.features.insert("webhooks".into(), false);
        assert!(!config.is_feature_enabled("webhooks"));
    }

    #[test]
    fn overlays_specialize_base() {
        let dev = AppConfig::for_environment(Environment::Development);
        let prod = AppConfig::for_environment(Environment::Production);

        assert!(dev.is_feature_enabled("demoData"));
        assert!(!prod.is_feature_enabled("demoData"));
        assert!(prod.security.require_https);
        assert_eq!(prod.security.session_timeout_minutes, 30);
        assert_eq!(dev.app.environment, Environment::Development);
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("Staging".parse::<Environment>(), Ok(Environment::Staging));
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn public_view_omits_security_section() {
        let view = AppConfig::for_environment(Environment::Staging).public_view();
        assert!(view.get("security").is_none());
        assert_eq!(view["app"]["environment"], "staging");
        assert_eq!(view["features"]["workflows"], true);
    }
}
