//! Service configuration: one TOML file plus environment overrides.
//!
//! Resolution order: the file named by `FANOUT_CONFIG`, else
//! `<config dir>/fanout/config.toml` if it exists, else built-in defaults.
//! `FANOUT_*` environment variables are applied on top, then the whole
//! configuration is validated.

use std::path::{Path, PathBuf};

use fanout_retrieval::{ReadinessConfig, RetrievalConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener and deployment metadata.
    pub server: ServerConfig,
    /// Lanes, deadlines, health and ranking.
    pub retrieval: RetrievalConfig,
    /// Dependencies checked by `/ready`.
    pub readiness: ReadinessConfig,
}

/// HTTP listener and deployment metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`. Port `0` picks a free port.
    pub bind: String,
    /// Deployment environment reported by `/version`.
    pub environment: String,
    /// Build commit reported by `/health` and `/version`.
    pub build_sha: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_owned(),
            environment: "development".to_owned(),
            build_sha: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ServiceError::Config(format!("{}: {e}", path.display())))
    }

    /// Returns the default config file path: `<config dir>/fanout/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp/fanout-config"))
            .join("fanout")
            .join("config.toml")
    }

    /// Resolve, override and validate configuration from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing or invalid, an
    /// override cannot be parsed, or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// [`ServiceConfig::load`] with an injectable environment lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ServiceConfig::load`].
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match env("FANOUT_CONFIG") {
            Some(path) => {
                let path = PathBuf::from(path);
                tracing::info!(path = %path.display(), "loading config");
                Self::from_file(&path)?
            }
            None => {
                let path = Self::default_config_path();
                if path.exists() {
                    tracing::info!(path = %path.display(), "loading config");
                    Self::from_file(&path)?
                } else {
                    tracing::info!("no config file found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `FANOUT_*` overrides from `env`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if a value cannot be parsed.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bind) = env("FANOUT_BIND") {
            self.server.bind = bind;
        }
        if let Some(environment) = env("FANOUT_ENVIRONMENT") {
            self.server.environment = environment;
        }
        if let Some(sha) = env("FANOUT_BUILD_SHA") {
            self.server.build_sha = Some(sha).filter(|s| !s.trim().is_empty());
        }
        if let Some(ms) = env("FANOUT_PROVIDER_TIMEOUT_CEILING_MS") {
            self.retrieval.provider_timeout_ceiling_ms =
                parse_override("FANOUT_PROVIDER_TIMEOUT_CEILING_MS", &ms)?;
        }
        if let Some(flag) = env("FANOUT_DISABLE_KEYLESS") {
            let disabled: bool = parse_override("FANOUT_DISABLE_KEYLESS", &flag)?;
            self.retrieval.allow_keyless_fallback = !disabled;
        }
        if let Some(ratio) = env("FANOUT_DEMOTION_THRESHOLD") {
            self.retrieval.health.demotion_ratio = parse_override("FANOUT_DEMOTION_THRESHOLD", &ratio)?;
        }
        if let Some(size) = env("FANOUT_HEALTH_WINDOW") {
            self.retrieval.health.window_size = parse_override("FANOUT_HEALTH_WINDOW", &size)?;
        }
        Ok(())
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            return Err(ServiceError::Config("server.bind must not be empty".into()));
        }
        self.retrieval.validate()?;
        self.readiness.validate()?;
        Ok(())
    }
}

fn parse_override<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ServiceError::Config(format!("{name}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(config.readiness.dependencies.is_empty());
    }

    #[test]
    fn default_config_path_ends_with_config_toml() {
        let path = ServiceConfig::default_config_path();
        assert!(path.ends_with("fanout/config.toml"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "0.0.0.0:9000"

[retrieval]
provider_timeout_ceiling_ms = 600

[retrieval.health]
window_size = 50

[[readiness.dependencies]]
name = "vector_store"
type = "tcp"
address = "127.0.0.1:6333"
"#,
        )
        .unwrap();

        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.environment, "development");
        assert_eq!(config.retrieval.provider_timeout_ceiling_ms, 600);
        assert_eq!(config.retrieval.health.window_size, 50);
        assert_eq!(config.retrieval.health.recovery_successes, 3);
        assert!(!config.retrieval.lanes.is_empty());
        assert!(config.readiness.dependencies[0].required);
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanout.toml");
        std::fs::write(&path, "[server]\nenvironment = \"staging\"\n").unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let config = ServiceConfig::load_with(env(&[("FANOUT_CONFIG", path_str.as_str())])).unwrap();
        assert_eq!(config.server.environment, "staging");
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let result = ServiceConfig::load_with(env(&[("FANOUT_CONFIG", "/nonexistent/fanout.toml")]));
        assert!(matches!(result, Err(ServiceError::Io(_))));
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(
            ServiceConfig::from_file(&path),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = ServiceConfig::default();
        config
            .apply_env_overrides(env(&[
                ("FANOUT_BIND", "0.0.0.0:0"),
                ("FANOUT_ENVIRONMENT", "production"),
                ("FANOUT_BUILD_SHA", "abc1234"),
                ("FANOUT_PROVIDER_TIMEOUT_CEILING_MS", "500"),
                ("FANOUT_DISABLE_KEYLESS", "true"),
                ("FANOUT_DEMOTION_THRESHOLD", "0.5"),
                ("FANOUT_HEALTH_WINDOW", "40"),
            ]))
            .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:0");
        assert_eq!(config.server.environment, "production");
        assert_eq!(config.server.build_sha.as_deref(), Some("abc1234"));
        assert_eq!(config.retrieval.provider_timeout_ceiling_ms, 500);
        assert!(!config.retrieval.allow_keyless_fallback);
        assert!((config.retrieval.health.demotion_ratio - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.retrieval.health.window_size, 40);
    }

    #[test]
    fn unparseable_override_is_rejected() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_env_overrides(env(&[("FANOUT_HEALTH_WINDOW", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("FANOUT_HEALTH_WINDOW"));
    }

    #[test]
    fn override_that_breaks_validation_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();
        let path_str = path.to_string_lossy().into_owned();
        let result = ServiceConfig::load_with(env(&[
            ("FANOUT_CONFIG", path_str.as_str()),
            ("FANOUT_PROVIDER_TIMEOUT_CEILING_MS", "0"),
        ]));
        assert!(matches!(result, Err(ServiceError::Retrieval(_))));
    }

    #[test]
    fn config_serializes_to_toml() {
        let toml = toml::to_string_pretty(&ServiceConfig::default()).unwrap();
        let parsed: ServiceConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.server, ServerConfig::default());
        assert_eq!(parsed.retrieval.lanes.len(), ServiceConfig::default().retrieval.lanes.len());
    }
}
