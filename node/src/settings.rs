//! Node configuration: defaults, optional config file, environment
//! overrides, then command-line flags, in that order of precedence.

use anyhow::{Context, Result};
use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_PATH: &str = "./data/ofactory-db";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 86_400;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    /// Process-wide signing secret. Must be set to a non-default value in
    /// production; tokens from different secrets do not interoperate.
    pub secret: String,
    pub token_ttl_secs: u64,
    pub retry_attempts: u32,
    pub log_level: String,
    /// Directory of additional schema JSON files, registered at startup
    /// under the slug of their title.
    pub schemas_dir: Option<PathBuf>,
    pub node_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: DEFAULT_DB_PATH.to_string(),
            secret: "dev-secret-change-me".to_string(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            schemas_dir: None,
            node_id: "ofactory-node".to_string(),
        }
    }
}

impl Settings {
    /// Merge defaults, an optional config file, and `OFACTORY_*`
    /// environment variables.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(ConfigFile::with_name(path));
        } else {
            builder = builder.add_source(ConfigFile::with_name("ofactory").required(false));
        }
        builder = builder.add_source(Environment::with_prefix("OFACTORY").try_parsing(true));

        let merged = builder.build().context("failed to assemble configuration")?;
        merged
            .try_deserialize()
            .context("failed to parse configuration")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080");
        assert_eq!(settings.token_ttl_secs, 86_400);
        assert!(settings.schemas_dir.is_none());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.port, DEFAULT_PORT);
    }
}
