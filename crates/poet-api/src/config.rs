//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `POET_CALL_TIMEOUT_SECS` | `120` |
//! | `POET_SESSION_IDLE_SECS` | `3600` |
//! | `POET_MAX_SESSIONS` | `1024` |
//! | `POET_MAX_UPLOAD_BYTES` | `10485760` |
//! | `ALLOWED_ORIGINS` | `http://localhost:3000,http://127.0.0.1:3000` |
//!
//! Unparseable or zero values fall back to the default with a warning.

use std::str::FromStr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::warn;

use poet_core::defaults;

/// Default CORS origins when `ALLOWED_ORIGINS` is unset or empty.
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for each analyze/generate call.
    pub call_timeout: Duration,
    /// Sessions untouched for this long are dropped.
    pub session_idle: Duration,
    pub max_sessions: usize,
    pub max_upload_bytes: usize,
    /// Raw comma-separated origin list.
    pub allowed_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            call_timeout: Duration::from_secs(defaults::CALL_TIMEOUT_SECS),
            session_idle: Duration::from_secs(defaults::SESSION_IDLE_SECS),
            max_sessions: defaults::MAX_SESSIONS,
            max_upload_bytes: defaults::MAX_UPLOAD_BYTES,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let base = Self::default();

        Self {
            host: get("HOST").unwrap_or(base.host),
            port: parse_or(&get, "PORT", base.port),
            call_timeout: Duration::from_secs(parse_positive(
                &get,
                defaults::ENV_CALL_TIMEOUT_SECS,
                defaults::CALL_TIMEOUT_SECS,
            )),
            session_idle: Duration::from_secs(parse_positive(
                &get,
                defaults::ENV_SESSION_IDLE_SECS,
                defaults::SESSION_IDLE_SECS,
            )),
            max_sessions: parse_positive(&get, defaults::ENV_MAX_SESSIONS, base.max_sessions),
            max_upload_bytes: parse_positive(
                &get,
                defaults::ENV_MAX_UPLOAD_BYTES,
                base.max_upload_bytes,
            ),
            allowed_origins: get("ALLOWED_ORIGINS").unwrap_or(base.allowed_origins),
        }
    }

    /// `host:port` for logs; IPv6 literals are bracketed.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Bind the listener, resolving `host` as a name or an IPv4/IPv6 literal.
    pub async fn bind(&self) -> std::io::Result<TcpListener> {
        TcpListener::bind((self.host.as_str(), self.port)).await
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match get(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(
                variable = name,
                value = %raw,
                default = %default,
                "Invalid configuration value, using default"
            );
            default
        }),
    }
}

fn parse_positive<T>(get: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T
where
    T: FromStr + Copy + Default + PartialEq + std::fmt::Display,
{
    let value = parse_or(get, name, default);
    if value == T::default() {
        warn!(variable = name, default = %default, "Value must be positive, using default");
        return default;
    }
    value
}
