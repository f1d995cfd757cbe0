//! Client configuration and endpoint derivation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::conn::ConnectionConfig;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(5);
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported server scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),
    #[error("invalid server url: {0}")]
    Parse(#[from] url::ParseError),
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base HTTP(S) URL of the backend; channel and fallback endpoints are
    /// derived from it.
    pub server: Url,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Transcript location.
    pub log_path: PathBuf,
    /// Language preference location.
    pub lang_path: PathBuf,
}

impl ChatConfig {
    /// Channel endpoint: same host, path `/ws`, `ws`/`wss` mirroring the
    /// page scheme.
    pub fn ws_url(&self) -> Result<Url, ConfigError> {
        let scheme = match self.server.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        let mut url = self.server.clone();
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::UnsupportedScheme(self.server.scheme().to_string()))?;
        url.set_path("/ws");
        url.set_query(None);
        Ok(url)
    }

    /// Fallback endpoint: `POST <server>/api/chat`.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        Ok(self.server.join("/api/chat")?)
    }

    pub fn connection(&self) -> Result<ConnectionConfig, ConfigError> {
        Ok(ConnectionConfig {
            ws_url: self.ws_url()?,
            http_url: self.api_url()?,
            backoff_base: self.backoff_base,
            backoff_cap: self.backoff_cap,
        })
    }
}

/// Per-user state directory for the transcript, language preference, and
/// log file.
pub fn default_state_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nibot-chat")
}
