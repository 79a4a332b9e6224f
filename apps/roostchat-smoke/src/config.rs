//! Environment-backed runtime configuration for the smoke binary.

use std::{env, error::Error, fmt};

const DEFAULT_USER_ID: &str = "smoke@example.org";
const DEFAULT_COMMAND_BUFFER: usize = 16;
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Runtime configuration for the smoke run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeConfig {
    /// Account the runtime acts as.
    pub user_id: String,
    /// Command channel capacity.
    pub command_buffer: usize,
    /// Event broadcast capacity.
    pub event_buffer: usize,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let user_id = lookup("ROOSTCHAT_USER")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_ID.to_owned());

        let command_buffer =
            parse_optional_usize("ROOSTCHAT_COMMAND_BUFFER", DEFAULT_COMMAND_BUFFER, &mut lookup)?;
        let event_buffer =
            parse_optional_usize("ROOSTCHAT_EVENT_BUFFER", DEFAULT_EVENT_BUFFER, &mut lookup)?;

        if command_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ROOSTCHAT_COMMAND_BUFFER",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if event_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ROOSTCHAT_EVENT_BUFFER",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(Self {
            user_id,
            command_buffer,
            event_buffer,
        })
    }
}

fn parse_optional_usize<F>(
    key: &'static str,
    default: usize,
    lookup: &mut F,
) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value,
        reason: "must be a non-negative integer".to_owned(),
    })
}

/// Configuration parsing failure naming the offending variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue { key, value, reason } => {
                write!(f, "invalid value '{value}' for {key}: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(values: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = SmokeConfig::from_lookup(lookup(&[])).expect("defaults should parse");
        assert_eq!(config.user_id, DEFAULT_USER_ID);
        assert_eq!(config.command_buffer, DEFAULT_COMMAND_BUFFER);
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
    }

    #[test]
    fn overrides_are_trimmed_and_parsed() {
        let config = SmokeConfig::from_lookup(lookup(&[
            ("ROOSTCHAT_USER", " alice@example.org "),
            ("ROOSTCHAT_COMMAND_BUFFER", "4"),
        ]))
        .expect("overrides should parse");
        assert_eq!(config.user_id, "alice@example.org");
        assert_eq!(config.command_buffer, 4);
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
    }

    #[test]
    fn zero_buffers_are_rejected_with_the_key_name() {
        let err = SmokeConfig::from_lookup(lookup(&[("ROOSTCHAT_EVENT_BUFFER", "0")]))
            .expect_err("zero buffer should be rejected");
        assert!(err.to_string().contains("ROOSTCHAT_EVENT_BUFFER"));
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let err = SmokeConfig::from_lookup(lookup(&[("ROOSTCHAT_COMMAND_BUFFER", "many")]))
            .expect_err("garbage should be rejected");
        assert!(err.to_string().contains("many"));
    }
}
