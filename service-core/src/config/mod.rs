use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Settings shared by every service: where to listen and which environment we run in.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub port: u16,
    #[serde(rename = "env")]
    pub environment: Environment,
}

/// Deployment environment. Only affects log formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Stg,
    Prd,
}

impl Config {
    /// Load from an optional `configuration` file, `.env` and the process environment.
    ///
    /// `PORT` and `ENV` are required; a missing or unknown value fails startup.
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Stg => "stg",
            Environment::Prd => "prd",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "stg" => Ok(Environment::Stg),
            "prd" | "prod" => Ok(Environment::Prd),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_environments() {
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!("STG".parse::<Environment>().unwrap(), Environment::Stg);
        assert_eq!("prd".parse::<Environment>().unwrap(), Environment::Prd);
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prd);
    }

    #[test]
    fn rejects_unknown_environment() {
        let err = "qa".parse::<Environment>().unwrap_err();
        assert_eq!(err, "Invalid environment: qa");
    }

    #[test]
    fn deserializes_from_config_values() {
        let config: Config = Cfg::builder()
            .set_override("port", 9000)
            .unwrap()
            .set_override("env", "stg")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.environment, Environment::Stg);
    }

    #[test]
    fn missing_port_is_an_error() {
        let result: Result<Config, _> = Cfg::builder()
            .set_override("env", "dev")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize();

        assert!(result.is_err());
    }
}
