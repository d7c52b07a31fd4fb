// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./wagate.toml` > `~/.config/wagate/wagate.toml`
//! > `/etc/wagate/wagate.toml` with environment variable overrides via the
//! `WAGATE_` prefix, plus plain well-known names (`DATABASE_URL`, `PORT`,
//! `LOG_LEVEL`, `SESSION_STORAGE_PATH`, `FRONTEND_URL`, `WEBHOOK_SECRET`).

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::WagateConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wagate/wagate.toml` (system-wide)
/// 3. `~/.config/wagate/wagate.toml` (user XDG config)
/// 4. `./wagate.toml` (local directory)
/// 5. `WAGATE_*` environment variables
/// 6. Plain well-known environment names
pub fn load_config() -> Result<WagateConfig, figment::Error> {
    base_figment()
        .merge(Toml::file("/etc/wagate/wagate.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("wagate/wagate.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("wagate.toml"))
        .merge(env_provider())
        .merge(plain_env_provider())
        .extract()
}

/// Load configuration from inline TOML only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<WagateConfig, figment::Error> {
    base_figment().merge(Toml::string(toml_content)).extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WagateConfig, figment::Error> {
    base_figment()
        .merge(Toml::file(path))
        .merge(env_provider())
        .merge(plain_env_provider())
        .extract()
}

fn base_figment() -> Figment {
    Figment::new().merge(Serialized::defaults(WagateConfig::default()))
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `WAGATE_STORAGE_DATABASE_PATH` must map
/// to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("WAGATE_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("reconnect_", "reconnect.", 1)
            .replacen("webhook_", "webhook.", 1);
        mapped.into()
    })
}

/// Map the well-known plain environment names onto config keys.
fn plain_env_provider() -> Env {
    Env::raw()
        .only(&[
            "DATABASE_URL",
            "SESSION_STORAGE_PATH",
            "FRONTEND_URL",
            "LOG_LEVEL",
            "PORT",
            "WEBHOOK_SECRET",
        ])
        .map(|key| match key.as_str() {
            "database_url" => "storage.database_path".into(),
            "session_storage_path" => "storage.session_storage_path".into(),
            "frontend_url" => "server.frontend_url".into(),
            "log_level" => "server.log_level".into(),
            "port" => "server.port".into(),
            "webhook_secret" => "webhook.secret".into(),
            other => other.into(),
        })
}
