//! Server configuration parsed from environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_CLIENT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_MAX_STROKE_POINTS: usize = 10_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Limits applied to the shared canvas history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasLimits {
    /// Maximum committed strokes kept; oldest are evicted first. `None` is unbounded.
    pub history_limit: Option<usize>,
    /// Strokes with more points than this are rejected as malformed.
    pub max_stroke_points: usize,
}

impl Default for CanvasLimits {
    fn default() -> Self {
        Self { history_limit: None, max_stroke_points: DEFAULT_MAX_STROKE_POINTS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub client_channel_capacity: usize,
    pub limits: CanvasLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            client_channel_capacity: DEFAULT_CLIENT_CHANNEL_CAPACITY,
            limits: CanvasLimits::default(),
        }
    }
}

impl Config {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `HOST`: default `0.0.0.0`
    /// - `PORT`: default 3001
    /// - `CLIENT_CHANNEL_CAPACITY`: default 256
    /// - `HISTORY_LIMIT`: unbounded when absent
    /// - `MAX_STROKE_POINTS`: default 10000
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is present but unparseable,
    /// or if `CLIENT_CHANNEL_CAPACITY` or `HISTORY_LIMIT` is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let client_channel_capacity = env_parse("CLIENT_CHANNEL_CAPACITY")?.unwrap_or(defaults.client_channel_capacity);
        if client_channel_capacity == 0 {
            return Err(ConfigError::Invalid { var: "CLIENT_CHANNEL_CAPACITY", value: "0".into() });
        }

        let history_limit: Option<usize> = env_parse("HISTORY_LIMIT")?;
        if history_limit == Some(0) {
            return Err(ConfigError::Invalid { var: "HISTORY_LIMIT", value: "0".into() });
        }

        Ok(Self {
            host: env_parse("HOST")?.unwrap_or(defaults.host),
            port: env_parse("PORT")?.unwrap_or(defaults.port),
            client_channel_capacity,
            limits: CanvasLimits {
                history_limit,
                max_stroke_points: env_parse("MAX_STROKE_POINTS")?.unwrap_or(defaults.limits.max_stroke_points),
            },
        })
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = std::env::var(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { var, value: raw.clone() })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
