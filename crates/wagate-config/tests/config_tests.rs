// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration loading and defaults.

use wagate_config::{load_config_from_str, WagateConfig};

#[test]
fn defaults_match_documented_operational_parameters() {
    let config = WagateConfig::default();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.log_level, "info");

    assert_eq!(config.queue.messages_per_minute, 20);
    assert_eq!(config.queue.delay_between_messages_secs, 3);
    assert_eq!(config.queue.max_attempts, 3);
    assert_eq!(config.queue.failure_delay_secs, 5);

    assert_eq!(config.reconnect.max_attempts, 5);
    assert_eq!(config.reconnect.base_delay_secs, 5);
    assert_eq!(config.reconnect.max_delay_secs, 300);
    assert_eq!(config.reconnect.rate_limit_delay_secs, 900);

    assert_eq!(config.webhook.timeout_secs, 10);
    assert_eq!(config.webhook.max_retries, 3);
    assert_eq!(config.webhook.base_delay_secs, 2);
    assert!(config.webhook.secret.is_none());
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").unwrap();
    assert_eq!(config.storage.database_path, "wagate.db");
    assert_eq!(config.storage.session_storage_path, "sessions");
    assert!(config.storage.wal_mode);
}

#[test]
fn toml_overrides_selected_sections() {
    let config = load_config_from_str(
        r#"
        [server]
        host = "0.0.0.0"
        port = 8080

        [storage]
        database_path = "/var/lib/wagate/gateway.db"

        [webhook]
        secret = "s3cret"
        max_retries = 5
        "#,
    )
    .unwrap();

    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.storage.database_path, "/var/lib/wagate/gateway.db");
    assert_eq!(config.webhook.secret.as_deref(), Some("s3cret"));
    assert_eq!(config.webhook.max_retries, 5);
    // Untouched sections keep their defaults.
    assert_eq!(config.queue.messages_per_minute, 20);
}

#[test]
fn unknown_keys_are_rejected() {
    let result = load_config_from_str(
        r#"
        [server]
        hosst = "typo"
        "#,
    );
    assert!(result.is_err(), "unknown key should fail extraction");
}

#[test]
fn unknown_sections_are_rejected() {
    let result = load_config_from_str(
        r#"
        [telemetry]
        enabled = true
        "#,
    );
    assert!(result.is_err(), "unknown section should fail extraction");
}

#[test]
fn partial_queue_section_keeps_other_defaults() {
    let config = load_config_from_str(
        r#"
        [queue]
        messages_per_minute = 5
        "#,
    )
    .unwrap();
    assert_eq!(config.queue.messages_per_minute, 5);
    assert_eq!(config.queue.delay_between_messages_secs, 3);
}
