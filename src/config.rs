//! Server settings read from the environment.
//!
//! - `HOST`: bind address (default `127.0.0.1`)
//! - `PORT`: bind port (default `8080`)
//! - `DIRECTORY_FILE`: JSON directory snapshot to load at startup
//! - `PREVIEW_TTL_SECS`: drop previews older than this; unset keeps them
//! - `LOG_LEVEL`: default log filter when `RUST_LOG` is unset (default `info`)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub directory_file: Option<PathBuf>,
    pub preview_ttl: Option<Duration>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
            directory_file: None,
            preview_ttl: None,
            log_level: "info".to_string(),
        }
    }
}

fn parsed<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get("HOST") {
            config.host = parsed("HOST", raw)?;
        }
        if let Some(raw) = get("PORT") {
            config.port = parsed("PORT", raw)?;
        }
        config.directory_file = get("DIRECTORY_FILE").map(PathBuf::from);
        if let Some(raw) = get("PREVIEW_TTL_SECS") {
            let secs: u64 = parsed("PREVIEW_TTL_SECS", raw)?;
            config.preview_ttl = Some(Duration::from_secs(secs));
        }
        if let Some(raw) = get("LOG_LEVEL") {
            config.log_level = raw.trim().to_string();
        }
        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
