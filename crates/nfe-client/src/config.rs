//! # Client Configuration
//!
//! [`ClientConfig`] names the issuer and the authority it talks to. It can
//! be deserialized from YAML/JSON or assembled from `NFE_*` environment
//! variables:
//!
//! | Variable                  | Field                          | Default      |
//! |---------------------------|--------------------------------|--------------|
//! | `NFE_ISSUER`              | `issuer`                       | required     |
//! | `NFE_REGION`              | `region`                       | required     |
//! | `NFE_ENVIRONMENT`         | `environment`                  | `staging`    |
//! | `NFE_MODEL`               | `model`                        | `55`         |
//! | `NFE_APP_VERSION`         | `app_version`                  | crate version|
//! | `NFE_UTC_OFFSET_MINUTES`  | `utc_offset_minutes`           | `-180`       |
//! | `NFE_TIMEOUT_SECS`        | `transport.timeout_secs`       | `30`         |
//! | `NFE_MAX_RETRIES`         | `transport.max_retries`        | `2`          |
//! | `NFE_RETRY_DELAY_MS`      | `transport.retry_delay_ms`     | `1000`       |
//! | `NFE_CALL_DEADLINE_SECS`  | `transport.call_deadline_secs` | unset        |
//! | `NFE_CERTIFICATE_PATH`    | `transport.certificate_path`   | unset        |
//! | `NFE_REQUIRE_CERTIFICATE` | `transport.require_certificate`| `true`       |

use std::path::PathBuf;

use chrono::FixedOffset;
use nfe_core::{
    offset_from_minutes, DocumentModel, Environment, IssuerId, Region, DEFAULT_UTC_OFFSET_MINUTES,
};
use nfe_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_VERSION_MAX: usize = 20;
const MAX_RETRIES_LIMIT: u32 = 10;

/// Errors from loading or validating a [`ClientConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A variable is set but does not parse.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable or field name.
        name: &'static str,
        /// Parse failure.
        reason: String,
    },

    /// Individually valid values that cannot be used together.
    #[error("inconsistent configuration: {reason}")]
    Inconsistent {
        /// What conflicts.
        reason: String,
    },
}

/// Issuer identity and authority settings for a [`crate::DocumentClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Issuer tax identifier.
    pub issuer: IssuerId,
    /// Issuer region; selects the authorizer.
    pub region: Region,
    /// Target environment.
    #[serde(default = "default_environment")]
    pub environment: Environment,
    /// Model of the documents this client issues.
    #[serde(default = "default_model")]
    pub model: DocumentModel,
    /// Application version reported in substitution events.
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// Offset of every timestamp this client renders.
    #[serde(default = "default_offset")]
    pub utc_offset_minutes: i32,
    /// HTTP transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_environment() -> Environment {
    Environment::Staging
}

fn default_model() -> DocumentModel {
    DocumentModel::Nfe
}

fn default_app_version() -> String {
    concat!("nfe-client-", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_offset() -> i32 {
    DEFAULT_UTC_OFFSET_MINUTES
}

impl ClientConfig {
    /// Defaults for `issuer` in `region`.
    pub fn new(issuer: IssuerId, region: Region) -> Self {
        Self {
            issuer,
            region,
            environment: default_environment(),
            model: default_model(),
            app_version: default_app_version(),
            utc_offset_minutes: default_offset(),
            transport: TransportConfig::default(),
        }
    }

    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when a required variable is missing, a value does not
    /// parse, or [`ClientConfig::validate`] fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// As [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let issuer = get("NFE_ISSUER").ok_or(ConfigError::Missing("NFE_ISSUER"))?;
        let issuer = IssuerId::new(issuer.trim()).map_err(|e| ConfigError::Invalid {
            name: "NFE_ISSUER",
            reason: e.to_string(),
        })?;
        let region: Region = get("NFE_REGION")
            .ok_or(ConfigError::Missing("NFE_REGION"))?
            .trim()
            .parse()
            .map_err(|e: nfe_core::ValidationError| ConfigError::Invalid {
                name: "NFE_REGION",
                reason: e.to_string(),
            })?;

        let mut config = Self::new(issuer, region);

        if let Some(raw) = get("NFE_ENVIRONMENT") {
            config.environment = parse_environment(raw.trim())?;
        }
        if let Some(raw) = get("NFE_MODEL") {
            config.model = raw.trim().parse().map_err(|e: nfe_core::ValidationError| {
                ConfigError::Invalid {
                    name: "NFE_MODEL",
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(raw) = get("NFE_APP_VERSION") {
            config.app_version = raw.trim().to_string();
        }
        if let Some(raw) = get("NFE_UTC_OFFSET_MINUTES") {
            config.utc_offset_minutes = parse_number("NFE_UTC_OFFSET_MINUTES", &raw)?;
        }

        let transport = &mut config.transport;
        if let Some(raw) = get("NFE_TIMEOUT_SECS") {
            transport.timeout_secs = parse_number("NFE_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("NFE_MAX_RETRIES") {
            transport.max_retries = parse_number("NFE_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = get("NFE_RETRY_DELAY_MS") {
            transport.retry_delay_ms = parse_number("NFE_RETRY_DELAY_MS", &raw)?;
        }
        if let Some(raw) = get("NFE_CALL_DEADLINE_SECS") {
            transport.call_deadline_secs = Some(parse_number("NFE_CALL_DEADLINE_SECS", &raw)?);
        }
        if let Some(raw) = get("NFE_CERTIFICATE_PATH") {
            transport.certificate_path = Some(PathBuf::from(raw.trim()));
        }
        if let Some(raw) = get("NFE_REQUIRE_CERTIFICATE") {
            transport.require_certificate = parse_bool("NFE_REQUIRE_CERTIFICATE", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from YAML and validate.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] on malformed input, or any
    /// [`ClientConfig::validate`] failure.
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(input).map_err(|e| ConfigError::Invalid {
            name: "config",
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would fail at the authority or at runtime.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Inconsistent`] for the national pseudo-region, a
    ///   production environment without a certificate requirement, or a
    ///   zero timeout.
    /// - [`ConfigError::Invalid`] for an out-of-range offset, retry count,
    ///   or application version.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region == Region::National {
            return Err(ConfigError::Inconsistent {
                reason: "the national organ cannot be an issuer region".into(),
            });
        }
        self.utc_offset()?;
        let version_len = self.app_version.chars().count();
        if version_len == 0 || version_len > APP_VERSION_MAX {
            return Err(ConfigError::Invalid {
                name: "app_version",
                reason: format!("must be 1..={APP_VERSION_MAX} characters, got {version_len}"),
            });
        }
        if self.transport.timeout_secs == 0 {
            return Err(ConfigError::Inconsistent {
                reason: "transport timeout must be positive".into(),
            });
        }
        if self.transport.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::Invalid {
                name: "max_retries",
                reason: format!("at most {MAX_RETRIES_LIMIT}, got {}", self.transport.max_retries),
            });
        }
        if self.environment.is_production() && !self.transport.require_certificate {
            return Err(ConfigError::Inconsistent {
                reason: "production requires a client certificate".into(),
            });
        }
        Ok(())
    }

    /// The configured offset.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when `utc_offset_minutes` is out of range.
    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        offset_from_minutes(self.utc_offset_minutes).map_err(|e| ConfigError::Invalid {
            name: "utc_offset_minutes",
            reason: e.to_string(),
        })
    }
}

fn parse_environment(raw: &str) -> Result<Environment, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "production" => Ok(Environment::Production),
        "2" | "staging" | "homologation" => Ok(Environment::Staging),
        other => Err(ConfigError::Invalid {
            name: "NFE_ENVIRONMENT",
            reason: format!("expected production or staging, got {other:?}"),
        }),
    }
}

fn parse_number<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}
