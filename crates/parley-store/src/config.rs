use std::time::Duration;

use parley_types::UserId;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v2";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Client settings, read from `PARLEY_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub user_id: UserId,
    pub poll_interval: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let api_url = non_empty("PARLEY_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid { var: "PARLEY_API_URL", value: api_url });
        }

        let user_id = non_empty("PARLEY_USER_ID").ok_or(ConfigError::Missing("PARLEY_USER_ID"))?;
        let user_id: UserId = user_id
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var: "PARLEY_USER_ID", value: user_id })?;

        let poll_interval = match non_empty("PARLEY_POLL_INTERVAL_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "PARLEY_POLL_INTERVAL_SECS",
                        value: raw,
                    });
                }
            },
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        Ok(Self {
            api_url,
            token: non_empty("PARLEY_TOKEN"),
            user_id,
            poll_interval: Duration::from_secs(poll_interval),
        })
    }
}
