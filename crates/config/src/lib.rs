//! Configuration for guac-analyst.
//!
//! Everything is read from `GUAC_ANALYST_*` environment variables with
//! defaults suitable for a local GUAC deployment.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("OpenAI API key is required (set GUAC_ANALYST_OPENAI_API_KEY environment variable)")]
    MissingApiKey,

    #[error("Azure deployment name is required when using Azure provider")]
    MissingAzureDeployment,

    #[error("Azure API endpoint is required when using Azure provider")]
    MissingAzureEndpoint,

    #[error("GUAC GraphQL endpoint is required")]
    MissingGuacEndpoint,

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub guac: GuacConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which chat-completion API flavor to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Azure,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "openai" => Ok(ProviderKind::OpenAi),
            "azure" => Ok(ProviderKind::Azure),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Azure => write!(f, "azure"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub api_endpoint: String,
    pub model: String,
    pub deployment_name: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct GuacConfig {
    pub graphql_endpoint: String,
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from the environment and validate it.
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration");

        let provider = match env_or("GUAC_ANALYST_OPENAI_PROVIDER", "openai").parse() {
            Ok(kind) => kind,
            Err(value) => {
                return Err(ConfigError::Invalid {
                    var: "GUAC_ANALYST_OPENAI_PROVIDER",
                    value,
                })
            }
        };

        let cfg = Self {
            server: ServerConfig {
                host: env_or("GUAC_ANALYST_SERVER_HOST", "0.0.0.0"),
                port: env_parse("GUAC_ANALYST_SERVER_PORT", 8000),
                read_timeout: Duration::from_secs(env_parse(
                    "GUAC_ANALYST_SERVER_READ_TIMEOUT_SECS",
                    30,
                )),
                write_timeout: Duration::from_secs(env_parse(
                    "GUAC_ANALYST_SERVER_WRITE_TIMEOUT_SECS",
                    30,
                )),
            },
            openai: OpenAiConfig {
                provider,
                api_key: env_or("GUAC_ANALYST_OPENAI_API_KEY", ""),
                api_endpoint: env_or("GUAC_ANALYST_OPENAI_ENDPOINT", "https://api.openai.com/v1"),
                model: env_or("GUAC_ANALYST_OPENAI_MODEL", "gpt-4"),
                deployment_name: env_or("GUAC_ANALYST_OPENAI_DEPLOYMENT", "gpt-4o-mini"),
                api_version: env_or("GUAC_ANALYST_OPENAI_API_VERSION", "2023-05-15"),
            },
            guac: GuacConfig {
                graphql_endpoint: env_or(
                    "GUAC_ANALYST_GUAC_ENDPOINT",
                    "http://localhost:8080/query",
                ),
                timeout: Duration::from_secs(env_parse("GUAC_ANALYST_GUAC_TIMEOUT_SECS", 30)),
            },
        };

        cfg.validate()?;
        info!("Configuration loaded successfully");
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.openai.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        if self.openai.provider == ProviderKind::Azure {
            if self.openai.deployment_name.is_empty() {
                return Err(ConfigError::MissingAzureDeployment);
            }
            if self.openai.api_endpoint.is_empty() {
                return Err(ConfigError::MissingAzureEndpoint);
            }
        }

        if self.guac.graphql_endpoint.is_empty() {
            return Err(ConfigError::MissingGuacEndpoint);
        }

        Ok(())
    }
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8000,
                read_timeout: Duration::from_secs(30),
                write_timeout: Duration::from_secs(30),
            },
            openai: OpenAiConfig {
                provider: ProviderKind::OpenAi,
                api_key: "sk-test".into(),
                api_endpoint: "https://api.openai.com/v1".into(),
                model: "gpt-4".into(),
                deployment_name: "gpt-4o-mini".into(),
                api_version: "2023-05-15".into(),
            },
            guac: GuacConfig {
                graphql_endpoint: "http://localhost:8080/query".into(),
                timeout: Duration::from_secs(30),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let mut cfg = valid_config();
        cfg.openai.api_key = String::new();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_azure_requires_deployment() {
        let mut cfg = valid_config();
        cfg.openai.provider = ProviderKind::Azure;
        cfg.openai.deployment_name = String::new();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingAzureDeployment)
        ));
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let mut cfg = valid_config();
        cfg.openai.provider = ProviderKind::Azure;
        cfg.openai.api_endpoint = String::new();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingAzureEndpoint)
        ));
    }

    #[test]
    fn test_empty_guac_endpoint_rejected() {
        let mut cfg = valid_config();
        cfg.guac.graphql_endpoint = String::new();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingGuacEndpoint)
        ));
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("openai".parse(), Ok(ProviderKind::OpenAi));
        assert_eq!("azure".parse(), Ok(ProviderKind::Azure));
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_bind_addr() {
        let cfg = valid_config();
        assert_eq!(cfg.server.bind_addr(), "0.0.0.0:8000");
    }
}
