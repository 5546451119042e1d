//! Server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), with the same defaults the protocol
//! documents: port 8000, socket path `/`, 30 second heartbeat interval.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level server configuration.
///
/// Construct directly for embedding, or load once at startup via
/// [`ServerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port the gateway listens on.
    pub port: u16,

    /// URL path of the socket endpoint, e.g. `/api/socket` serves
    /// `ws://host:port/api/socket`.
    pub path: String,

    /// Interval between heartbeat probes. The acknowledgement deadline
    /// and the disconnect grace window are fixed by the protocol and are
    /// not configurable.
    pub heartbeat_interval: Duration,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the documented defaults when a variable is not set
    /// or does not parse. Calls `dotenvy::dotenv().ok()` to optionally
    /// load a `.env` file. Recognized keys: `PORT`, `SOCKET_PATH`,
    /// `HEARTBEAT_INTERVAL_MS`.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let port = parse_env("PORT", 8000);
        let path = std::env::var("SOCKET_PATH").unwrap_or_else(|_| "/".to_string());
        let heartbeat_interval = Duration::from_millis(parse_env("HEARTBEAT_INTERVAL_MS", 30_000));

        Self {
            port,
            path,
            heartbeat_interval,
        }
    }

    /// Returns the wildcard socket address the gateway binds to.
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            path: "/".to_string(),
            heartbeat_interval: Duration::from_millis(30_000),
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.path, "/");
        assert_eq!(config.heartbeat_interval, Duration::from_millis(30_000));
    }

    #[test]
    fn listen_addr_uses_configured_port() {
        let config = ServerConfig {
            port: 9123,
            ..ServerConfig::default()
        };
        assert_eq!(config.listen_addr().port(), 9123);
    }
}
