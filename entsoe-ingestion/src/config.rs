use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::ImportError;

pub const DEFAULT_CONFIG_PATH: &str = "entsoe-config.toml";
pub const DEFAULT_COUNTRY_CODE: &str = "NL";
pub const DEFAULT_DERIVED_DATA_SOURCE: &str = "ENTSO-E importer";

pub const PRODUCTION_SERVER_URL: &str = "https://web-api.tp.entsoe.eu/api";
pub const TEST_SERVER_URL: &str = "https://iop-transparency.entsoe.eu/api";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntsoeConfig {
    pub auth_token: Option<String>,
    pub auth_token_test_server: Option<String>,
    pub use_test_server: bool,
    pub country_code: Option<String>,
    pub country_timezone: Option<String>,
    pub derived_data_source: Option<String>,
    /// Overrides the production/test server URL.
    pub base_url: Option<String>,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for EntsoeConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            auth_token_test_server: None,
            use_test_server: false,
            country_code: None,
            country_timezone: None,
            derived_data_source: None,
            base_url: None,
            retry_count: 1,
            retry_delay_ms: 0,
            timeout_secs: 60,
        }
    }
}

/// Where to send requests and with which token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub url: String,
    pub auth_token: String,
}

impl EntsoeConfig {
    /// Resolve the server URL and the matching auth token.
    ///
    /// The test server has its own token; an empty token is treated as missing.
    pub fn server(&self) -> Result<ServerSettings, ImportError> {
        let (setting, token, default_url) = if self.use_test_server {
            (
                "ENTSOE_AUTH_TOKEN_TEST_SERVER",
                self.auth_token_test_server.as_deref(),
                TEST_SERVER_URL,
            )
        } else {
            ("ENTSOE_AUTH_TOKEN", self.auth_token.as_deref(), PRODUCTION_SERVER_URL)
        };

        let auth_token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ImportError::Configuration(format!("setting {setting} seems empty")))?;

        Ok(ServerSettings {
            url: self.base_url.clone().unwrap_or_else(|| default_url.to_string()),
            auth_token: auth_token.to_string(),
        })
    }

    pub fn derived_data_source_name(&self) -> &str {
        self.derived_data_source
            .as_deref()
            .unwrap_or(DEFAULT_DERIVED_DATA_SOURCE)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Co2Config {
    /// kg CO₂ per MWh. Applied to both built-in tables: forecast labels such as
    /// `"Wind Onshore"` and production types such as `"fossil_gas"` are
    /// disjoint, so each key takes effect in the table that uses it.
    pub factors: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus text file written at the end of each run.
    pub textfile: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub entsoe: EntsoeConfig,
    pub database: Option<DatabaseConfig>,
    pub sink: SinkConfig,
    pub co2: Co2Config,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load the config file (explicit path, `ENTSOE_CONFIG`, or the default
    /// file if present) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        use std::env;

        let mut cfg = match path.map(Path::to_path_buf).or_else(|| env::var_os("ENTSOE_CONFIG").map(PathBuf::from)) {
            Some(path) => Self::from_path(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_path(Path::new(DEFAULT_CONFIG_PATH))?,
            None => Self::default(),
        };
        cfg.apply_env_overrides(|key| env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    /// Environment variables win over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let e = &mut self.entsoe;
        if let Some(v) = lookup("ENTSOE_AUTH_TOKEN") {
            e.auth_token = Some(v);
        }
        if let Some(v) = lookup("ENTSOE_AUTH_TOKEN_TEST_SERVER") {
            e.auth_token_test_server = Some(v);
        }
        if let Some(v) = lookup("ENTSOE_USE_TEST_SERVER") {
            e.use_test_server = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = lookup("ENTSOE_COUNTRY_CODE") {
            e.country_code = Some(v);
        }
        if let Some(v) = lookup("ENTSOE_COUNTRY_TIMEZONE") {
            e.country_timezone = Some(v);
        }
        if let Some(v) = lookup("ENTSOE_DERIVED_DATA_SOURCE") {
            e.derived_data_source = Some(v);
        }
        if let Some(uri) = lookup("DATABASE_URL") {
            match &mut self.database {
                Some(db) => db.uri = uri,
                None => {
                    self.database = Some(DatabaseConfig {
                        uri,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }
    }

    /// Log settings that are not set, each at the level it matters.
    pub fn report_missing_settings(&self) {
        let e = &self.entsoe;
        if e.auth_token.is_none() && !e.use_test_server {
            tracing::error!(
                setting = "ENTSOE_AUTH_TOKEN",
                "not set; generate a token after creating an account at ENTSO-E"
            );
        }
        if e.use_test_server && e.auth_token_test_server.is_none() {
            tracing::debug!(setting = "ENTSOE_AUTH_TOKEN_TEST_SERVER", "not set");
        }
        if e.country_code.is_none() {
            tracing::warn!(
                setting = "ENTSOE_COUNTRY_CODE",
                "not set; '{DEFAULT_COUNTRY_CODE}' will be used as a default"
            );
        }
        if e.country_timezone.is_none() {
            tracing::info!(
                setting = "ENTSOE_COUNTRY_TIMEZONE",
                "not set; the market area's timezone will be used"
            );
        }
        if e.derived_data_source.is_none() {
            tracing::info!(
                setting = "ENTSOE_DERIVED_DATA_SOURCE",
                "not set; '{DEFAULT_DERIVED_DATA_SOURCE}' will be used as a default"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_full_toml_config() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [entsoe]
            auth_token = "abc"
            country_code = "BE"
            country_timezone = "Europe/Brussels"
            retry_count = 3

            [database]
            uri = "postgres://localhost/flex"

            [sink]
            batch_size = 100

            [co2.factors]
            "Solar" = 40.0

            [metrics]
            textfile = "/var/lib/node_exporter/entsoe.prom"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.entsoe.auth_token.as_deref(), Some("abc"));
        assert_eq!(cfg.entsoe.country_code.as_deref(), Some("BE"));
        assert_eq!(cfg.entsoe.retry_count, 3);
        assert_eq!(cfg.database.unwrap().max_connections, 2);
        assert_eq!(cfg.sink.batch_size, 100);
        assert_eq!(cfg.sink.max_retries, 3);
        assert_eq!(cfg.co2.factors.get("Solar"), Some(&40.0));
        assert!(cfg.metrics.is_some());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert!(cfg.database.is_none());
        assert_eq!(cfg.entsoe.retry_count, 1);
        assert_eq!(cfg.entsoe.derived_data_source_name(), DEFAULT_DERIVED_DATA_SOURCE);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut cfg = AppConfig::from_toml_str("[entsoe]\nauth_token = \"from-file\"\n").unwrap();
        let env: HashMap<&str, &str> = [
            ("ENTSOE_AUTH_TOKEN", "from-env"),
            ("ENTSOE_USE_TEST_SERVER", "true"),
            ("DATABASE_URL", "postgres://db/entsoe"),
        ]
        .into_iter()
        .collect();

        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.entsoe.auth_token.as_deref(), Some("from-env"));
        assert!(cfg.entsoe.use_test_server);
        assert_eq!(cfg.database.unwrap().uri, "postgres://db/entsoe");
    }

    #[test]
    fn missing_token_is_a_configuration_error() {
        let cfg = EntsoeConfig::default();
        assert!(matches!(cfg.server(), Err(ImportError::Configuration(_))));

        let blank = EntsoeConfig {
            auth_token: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(matches!(blank.server(), Err(ImportError::Configuration(_))));
    }

    #[test]
    fn test_server_uses_its_own_url_and_token() {
        let cfg = EntsoeConfig {
            auth_token: Some("prod".to_string()),
            auth_token_test_server: Some("iop".to_string()),
            use_test_server: true,
            ..Default::default()
        };
        let server = cfg.server().unwrap();
        assert_eq!(server.url, TEST_SERVER_URL);
        assert_eq!(server.auth_token, "iop");

        let without_test_token = EntsoeConfig {
            auth_token: Some("prod".to_string()),
            use_test_server: true,
            ..Default::default()
        };
        assert!(matches!(without_test_token.server(), Err(ImportError::Configuration(_))));
    }

    #[test]
    fn production_server_is_the_default() {
        let cfg = EntsoeConfig {
            auth_token: Some("prod".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.server().unwrap().url, PRODUCTION_SERVER_URL);
    }
}
