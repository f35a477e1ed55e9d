//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `OUTBOX_POLL_MS` — relay polling interval (default: `1000`)
/// - `SAGA_SWEEP_SECS` — staleness sweep interval (default: `60`)
/// - `SAGA_STALE_SECS` — idle time before a saga counts as stuck (default: `600`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub outbox_poll_interval: Duration,
    pub saga_sweep_interval: Duration,
    pub saga_stale_threshold: Duration,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            outbox_poll_interval: Duration::from_millis(env_u64("OUTBOX_POLL_MS", 1000)),
            saga_sweep_interval: Duration::from_secs(env_u64("SAGA_SWEEP_SECS", 60)),
            saga_stale_threshold: Duration::from_secs(env_u64("SAGA_STALE_SECS", 600)),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            outbox_poll_interval: Duration::from_millis(1000),
            saga_sweep_interval: Duration::from_secs(60),
            saga_stale_threshold: Duration::from_secs(600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.outbox_poll_interval, Duration::from_millis(1000));
        assert_eq!(config.saga_stale_threshold, Duration::from_secs(600));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
