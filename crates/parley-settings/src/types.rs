//! Settings types.
//!
//! Every section deserializes with `#[serde(default)]`, so a settings file
//! only needs the keys it overrides.

use std::time::Duration;

use parley_core::backoff::ReconnectPolicy;
use parley_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Remote endpoints.
    pub server: ServerSettings,
    /// Conversation defaults.
    pub chat: ChatSettings,
    /// Timeouts, heartbeat, and reconnect policy.
    pub transport: TransportSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Remote endpoints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Agent API base URL (`http` or `https`).
    pub base_url: String,
    /// Path of the streamed-reply endpoint.
    pub stream_path: String,
    /// Path of the socket endpoint; `{thread_id}` is substituted.
    pub socket_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8888".to_string(),
            stream_path: "/api/chat/stream".to_string(),
            socket_path: "/ws/chat/{thread_id}".to_string(),
        }
    }
}

/// Conversation defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatSettings {
    /// Thread to join.
    pub thread_id: String,
    /// Source reported for locally composed messages.
    pub source: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            thread_id: "default_session".to_string(),
            source: "user".to_string(),
        }
    }
}

/// Transport timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Connect timeout for HTTP requests and socket handshakes.
    pub connect_timeout_ms: u64,
    /// A streamed reply silent for this long is treated as lost.
    pub idle_timeout_ms: u64,
    /// Socket heartbeat interval.
    pub heartbeat_interval_ms: u64,
    /// Delay before the first reconnect attempt.
    pub reconnect_base_delay_ms: u64,
    /// Consecutive failed reconnects before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            connect_timeout_ms: 30_000,
            idle_timeout_ms: 90_000,
            heartbeat_interval_ms: 30_000,
            reconnect_base_delay_ms: policy.base_delay_ms,
            max_reconnect_attempts: policy.max_attempts,
        }
    }
}

impl TransportSettings {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Idle timeout as a `Duration`.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reconnect policy built from these settings.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: self.reconnect_base_delay_ms,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ── Derived endpoints ───────────────────────────────────────────────────────

impl ClientSettings {
    /// Full URL of the streamed-reply endpoint.
    pub fn stream_url(&self) -> Result<String> {
        let base = self.base_url()?;
        Ok(join_path(base, &self.server.stream_path))
    }

    /// Full socket URL for `thread_id`, with `http(s)` mapped to `ws(s)`.
    pub fn socket_url(&self, thread_id: &str) -> Result<String> {
        let base = self.base_url()?;
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        let path = self.server.socket_path.replace("{thread_id}", thread_id);
        Ok(join_path(&ws_base, &path))
    }

    fn base_url(&self) -> Result<&str> {
        let base = self.server.base_url.trim().trim_end_matches('/');
        let valid = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| base.starts_with(scheme) && base.len() > scheme.len());
        if valid {
            Ok(base)
        } else {
            Err(SettingsError::InvalidValue(format!(
                "server.baseUrl must be an http(s) or ws(s) URL, got {:?}",
                self.server.base_url
            )))
        }
    }
}

fn join_path(base: &str, path: &str) -> String {
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
