//! Gateway configuration with validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Defaults applied by gateway overloads that omit buffer size or timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Update buffer size for subscription queries (default: 32)
    pub default_update_buffer_size: usize,
    /// Scatter-gather deadline (default: 5s)
    #[serde(with = "duration_serde")]
    pub default_scatter_gather_timeout: Duration,
    /// Largest update buffer a caller may request (default: 16384)
    pub max_update_buffer_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_update_buffer_size: crate::DEFAULT_UPDATE_BUFFER_SIZE,
            default_scatter_gather_timeout: crate::DEFAULT_SCATTER_GATHER_TIMEOUT,
            max_update_buffer_size: crate::MAX_UPDATE_BUFFER_SIZE,
        }
    }
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QG_UPDATE_BUFFER_SIZE`: default update buffer size (default: 32)
    /// - `QG_SCATTER_GATHER_TIMEOUT_MS`: scatter-gather deadline in milliseconds (default: 5000)
    /// - `QG_MAX_UPDATE_BUFFER_SIZE`: largest accepted update buffer (default: 16384)
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_update_buffer_size: env_or(
                "QG_UPDATE_BUFFER_SIZE",
                defaults.default_update_buffer_size,
            ),
            default_scatter_gather_timeout: Duration::from_millis(env_or(
                "QG_SCATTER_GATHER_TIMEOUT_MS",
                defaults.default_scatter_gather_timeout.as_millis() as u64,
            )),
            max_update_buffer_size: env_or(
                "QG_MAX_UPDATE_BUFFER_SIZE",
                defaults.max_update_buffer_size,
            ),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_update_buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize(
                "default_update_buffer_size cannot be 0".into(),
            ));
        }

        if self.max_update_buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize(
                "max_update_buffer_size cannot be 0".into(),
            ));
        }

        if self.max_update_buffer_size > crate::UPDATE_BUFFER_SIZE_LIMIT {
            return Err(ConfigError::InvalidBufferSize(format!(
                "max_update_buffer_size {} exceeds limit {}",
                self.max_update_buffer_size,
                crate::UPDATE_BUFFER_SIZE_LIMIT
            )));
        }

        if self.default_update_buffer_size > self.max_update_buffer_size {
            return Err(ConfigError::InvalidBufferSize(format!(
                "default_update_buffer_size {} exceeds max_update_buffer_size {}",
                self.default_update_buffer_size, self.max_update_buffer_size
            )));
        }

        if self.default_scatter_gather_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "default_scatter_gather_timeout cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Clamp a requested update buffer size into `1..=max_update_buffer_size`.
    #[must_use]
    pub fn clamp_update_buffer_size(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_update_buffer_size.max(1))
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid buffer size
    #[error("invalid buffer size: {0}")]
    InvalidBufferSize(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Durations serialize as `"<n>ms"`; plain numbers, `s` and `m` suffixes are
/// accepted on input.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            // plain milliseconds
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid duration format")
        }
    }
}
