//! Pipeline configuration.
//!
//! Everything here is read once at startup. Invalid values never abort the
//! process: they are logged and replaced by the default.
//!
//! # Environment Variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `OASGATE_NON_HTTP_POLICY` | `allow` | Verdict for checks without HTTP attributes (`allow` or `deny`) |
//! | `OASGATE_INCLUDE_VALUES` | `false` | Echo offending request values in deny details |

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Configuration value errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Unknown non-HTTP policy name.
    #[error("unknown non-HTTP policy '{value}': must be \"allow\" or \"deny\"")]
    UnknownNonHttpPolicy { value: String },
}

/// What to do with a check that carries no HTTP attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NonHttpPolicy {
    /// Allow without validating (nothing to validate).
    #[default]
    Allow,
    /// Deny with a single explanatory violation.
    Deny,
}

impl FromStr for NonHttpPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            _ => Err(ConfigError::UnknownNonHttpPolicy {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for NonHttpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Runtime configuration for the check pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Verdict for non-HTTP checks.
    pub non_http_policy: NonHttpPolicy,

    /// Whether deny details may carry the offending request value.
    /// Off by default so request data is not reflected back to clients.
    pub include_values: bool,
}

impl PipelineConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        Self {
            non_http_policy: parse_warn(
                &lookup,
                "OASGATE_NON_HTTP_POLICY",
                default.non_http_policy,
            ),
            include_values: parse_warn(&lookup, "OASGATE_INCLUDE_VALUES", default.include_values),
        }
    }
}

pub(crate) fn parse_warn<T, F>(lookup: &F, name: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(val) => match val.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    env_var = name,
                    value = %val,
                    default = %default,
                    "Invalid value for environment variable, using default"
                );
                default
            }
        },
        None => default,
    }
}
