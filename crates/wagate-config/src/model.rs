// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Wagate gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Defaults mirror the documented operational
//! parameters (20 msgs/min bucket, 5-attempt reconnect cap, 3-retry
//! webhook policy).

use serde::{Deserialize, Serialize};

/// Top-level Wagate configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WagateConfig {
    /// HTTP/WebSocket edge settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend and session auth directory settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound queue rate limiting.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Supervised reconnection backoff.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Webhook delivery pipeline.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// HTTP/WebSocket edge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS allow-list anchor for the dashboard. `None` allows any origin.
    #[serde(default)]
    pub frontend_url: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_url: None,
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3300
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory for the WhatsApp client's file-backed auth material.
    /// Created on startup if missing.
    #[serde(default = "default_session_storage_path")]
    pub session_storage_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            session_storage_path: default_session_storage_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    "wagate.db".to_string()
}

fn default_session_storage_path() -> String {
    "sessions".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Outbound queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Token bucket capacity per session, refilled evenly over a minute.
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,

    /// Pause between consecutive sends on one session, in seconds.
    #[serde(default = "default_delay_between_messages_secs")]
    pub delay_between_messages_secs: u64,

    /// Attempts per queued item before it is recorded as failed.
    #[serde(default = "default_queue_max_attempts")]
    pub max_attempts: u32,

    /// Pause after a failed attempt before the worker continues, in seconds.
    #[serde(default = "default_failure_delay_secs")]
    pub failure_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: default_messages_per_minute(),
            delay_between_messages_secs: default_delay_between_messages_secs(),
            max_attempts: default_queue_max_attempts(),
            failure_delay_secs: default_failure_delay_secs(),
        }
    }
}

fn default_messages_per_minute() -> u32 {
    20
}

fn default_delay_between_messages_secs() -> u64 {
    3
}

fn default_queue_max_attempts() -> u32 {
    3
}

fn default_failure_delay_secs() -> u64 {
    5
}

/// Supervised reconnection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Reconnection attempts before the session is parked in `error`.
    #[serde(default = "default_reconnect_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay, in seconds.
    #[serde(default = "default_reconnect_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Backoff ceiling, in seconds.
    #[serde(default = "default_reconnect_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Fixed delay after an upstream rate-limit disconnect, in seconds.
    #[serde(default = "default_rate_limit_delay_secs")]
    pub rate_limit_delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_reconnect_max_attempts(),
            base_delay_secs: default_reconnect_base_delay_secs(),
            max_delay_secs: default_reconnect_max_delay_secs(),
            rate_limit_delay_secs: default_rate_limit_delay_secs(),
        }
    }
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_secs() -> u64 {
    5
}

fn default_reconnect_max_delay_secs() -> u64 {
    300
}

fn default_rate_limit_delay_secs() -> u64 {
    900
}

/// Webhook delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Per-request timeout, in seconds.
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the initial attempt.
    #[serde(default = "default_webhook_max_retries")]
    pub max_retries: u32,

    /// Base retry delay, doubled per retry, in seconds.
    #[serde(default = "default_webhook_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Interval of the pending-CRM-sync backfill job, in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Optional HMAC-SHA256 secret; when set, envelopes carry an
    /// `X-Webhook-Signature` header over the raw body.
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout_secs(),
            max_retries: default_webhook_max_retries(),
            base_delay_secs: default_webhook_base_delay_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            secret: None,
        }
    }
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_webhook_max_retries() -> u32 {
    3
}

fn default_webhook_base_delay_secs() -> u64 {
    2
}

fn default_sync_interval_secs() -> u64 {
    300
}
