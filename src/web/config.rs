//! Read API settings.

use crate::error::{Result, SystemError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Listener and query defaults for the read API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// `host:port` the listener binds
    pub listen: String,
    /// Send permissive CORS headers so a dashboard on another origin can poll
    pub enable_cors: bool,
    /// Window used when a request names none, in seconds
    pub default_window_secs: u64,
    /// Row cap used when a request names none
    pub default_row_cap: usize,
    /// Upper bound on any requested row cap
    pub max_row_cap: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self::listen_on("0.0.0.0", crate::DEFAULT_WEB_PORT)
    }
}

impl WebConfig {
    /// Listen on `host:port` with the default query settings.
    pub fn listen_on(host: &str, port: u16) -> Self {
        Self {
            listen: format!("{}:{}", host, port),
            enable_cors: true,
            default_window_secs: 3600,
            default_row_cap: crate::DEFAULT_ROW_CAP,
            max_row_cap: 86_400,
        }
    }

    pub fn with_cors(mut self, enable_cors: bool) -> Self {
        self.enable_cors = enable_cors;
        self
    }

    /// Set the window and row cap used when a request omits them.
    pub fn with_window(mut self, window_secs: u64, row_cap: usize) -> Self {
        self.default_window_secs = window_secs;
        self.default_row_cap = row_cap;
        self
    }

    pub fn with_max_row_cap(mut self, max: usize) -> Self {
        self.max_row_cap = max;
        self
    }

    /// Parsed listener address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            SystemError::config_invalid(format!("bad listen address '{}': {}", self.listen, e))
        })
    }

    /// Window and row cap for a request, defaults filled in and the cap enforced.
    pub fn resolve_window(&self, secs: Option<u64>, limit: Option<usize>) -> (Duration, usize) {
        let secs = secs.unwrap_or(self.default_window_secs);
        let limit = limit.unwrap_or(self.default_row_cap).min(self.max_row_cap);
        (Duration::from_secs(secs), limit)
    }
}
