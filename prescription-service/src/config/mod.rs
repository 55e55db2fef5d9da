use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Gemini model used when `GEMINI_MODEL` is not set.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-002";

#[derive(Debug, Clone, Deserialize)]
pub struct PrescriptionConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub gemini: GeminiSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
}

impl PrescriptionConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let config = PrescriptionConfig {
            common,
            service_name: get_env("SERVICE_NAME", Some("prescription-service"))?,
            log_level: get_env("LOG_LEVEL", Some("info"))?,
            gemini: GeminiSettings {
                api_key: get_env("GEMINI_API_KEY", None)?,
                model: get_env("GEMINI_MODEL", Some(DEFAULT_GEMINI_MODEL))?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.gemini.api_key.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GEMINI_API_KEY must not be empty"
            )));
        }

        if self.gemini.model.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GEMINI_MODEL must not be empty"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) => Ok(def.to_string()),
            None => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required but not set",
                key
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::config::Environment;

    fn config_with_key(api_key: &str) -> PrescriptionConfig {
        PrescriptionConfig {
            common: core_config::Config {
                port: 8080,
                environment: Environment::Dev,
            },
            service_name: "prescription-service".to_string(),
            log_level: "info".to_string(),
            gemini: GeminiSettings {
                api_key: api_key.to_string(),
                model: DEFAULT_GEMINI_MODEL.to_string(),
            },
        }
    }

    #[test]
    fn get_env_falls_back_to_default() {
        let value = get_env("PRESCRIPTION_SERVICE_TEST_UNSET_VAR", Some("fallback")).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn get_env_requires_value_without_default() {
        let err = get_env("PRESCRIPTION_SERVICE_TEST_UNSET_VAR", None).unwrap_err();
        assert!(err
            .to_string()
            .contains("PRESCRIPTION_SERVICE_TEST_UNSET_VAR is required but not set"));
    }

    #[test]
    fn blank_api_key_is_rejected() {
        assert!(config_with_key("   ").validate().is_err());
        assert!(config_with_key("secret").validate().is_ok());
    }
}
