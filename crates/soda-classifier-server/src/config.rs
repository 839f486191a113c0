//! Application configuration.
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. `config/default.toml`
//! 3. `config/{SODA_CLASSIFIER_ENV}.toml` (default `development`)
//! 4. An explicit file passed with `--config`
//! 5. `SODA_CLASSIFIER__*` environment variables, e.g.
//!    `SODA_CLASSIFIER__CLASSIFIER__WEIGHTS_PATH=/models/soda.pth`
//! 6. `PORT`
//!
//! CLI flags are applied on top by the binary.

use std::path::Path;

use serde::{Deserialize, Serialize};
use soda_classifier_core::{ClassifierConfig, ClassifierError};

use crate::error::ConfigLoadError;

const ENV_PREFIX: &str = "SODA_CLASSIFIER";
const ENV_PROFILE_VAR: &str = "SODA_CLASSIFIER_ENV";

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub max_payload_size: usize,
    /// Build the model runtime before accepting requests.
    pub warm_on_start: bool,
    pub cors_allow_any_origin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_payload_size: 10 * 1024 * 1024,
            warm_on_start: false,
            cors_allow_any_origin: true,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.bind_address.trim().is_empty() {
            return Err(ClassifierError::InvalidConfig {
                field: "server.bind_address".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.max_payload_size == 0 {
            return Err(ClassifierError::InvalidConfig {
                field: "server.max_payload_size".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }

    /// `bind_address:port`.
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub classifier: ClassifierConfig,
}

impl AppConfig {
    /// Load from files and environment, then validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let profile = std::env::var(ENV_PROFILE_VAR).unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{profile}")).required(false));

        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ConfigLoadError::MissingFile(path.to_path_buf()));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("classifier.class_labels"),
        );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;

        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port.parse().map_err(|_| ClassifierError::InvalidConfig {
                field: "PORT".into(),
                reason: format!("'{port}' is not a valid port"),
            })?;
            tracing::info!(port = config.server.port, "ENV override: server.port from PORT");
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        self.server.validate()?;
        self.classifier.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soda_classifier_core::DevicePolicy;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn write_toml(body: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.listen_address(), "0.0.0.0:8080");
        assert_eq!(config.server.max_payload_size, 10 * 1024 * 1024);
        assert!(config.server.cors_allow_any_origin);
        assert!(!config.server.warm_on_start);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_toml(
            r#"
            [server]
            port = 9090

            [classifier]
            weights_path = "/models/soda.safetensors"
            device = "cpu"
            class_labels = ["vide", "plein"]
            "#,
        );
        let config = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(
            config.classifier.weights_path,
            PathBuf::from("/models/soda.safetensors")
        );
        assert_eq!(config.classifier.device, DevicePolicy::Cpu);
        assert_eq!(config.classifier.class_labels.get(1), Some("plein"));
    }

    #[test]
    fn test_zero_payload_limit_rejected() {
        let file = write_toml("[server]\nmax_payload_size = 0\n");
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(ConfigLoadError::Invalid(ClassifierError::InvalidConfig { .. }))
        ));
    }

    #[test]
    fn test_unknown_device_rejected() {
        let file = write_toml("[classifier]\ndevice = \"tpu\"\n");
        assert!(matches!(
            AppConfig::load(Some(file.path())),
            Err(ConfigLoadError::Source(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = AppConfig::load(Some(Path::new("/no/such/config.toml"))).unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingFile(_)));
    }
}
