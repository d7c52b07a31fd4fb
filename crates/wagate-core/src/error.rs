// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Wagate gateway.

use thiserror::Error;

/// The primary error type used across all Wagate crates.
#[derive(Debug, Error)]
pub enum WagateError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed session ids, phone numbers, or missing required fields.
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or invalid bearer token, or organization not found.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Advisory account or message cap exceeded.
    #[error("{kind} limit reached: {current}/{limit}")]
    LimitExceeded {
        kind: LimitKind,
        current: u64,
        limit: u64,
    },

    /// Send attempted while the session is not connected.
    #[error("session {session_id} is not connected")]
    NotConnected { session_id: String },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// WhatsApp client errors (socket failure, protocol error, send rejection).
    #[error("client error: {message}")]
    Client {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Webhook delivery errors (HTTP failure, non-2xx response).
    #[error("webhook error: {message}")]
    Webhook {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Which advisory cap was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Account,
    Message,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::Account => write!(f, "account"),
            LimitKind::Message => write!(f, "message"),
        }
    }
}

impl WagateError {
    /// Whether the error is eligible for retry with backoff.
    ///
    /// Transient errors (network timeouts, webhook delivery failures, storage
    /// contention) are retried locally by components up to their configured
    /// caps. Everything else is terminal for the current operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WagateError::Timeout { .. }
                | WagateError::Webhook { .. }
                | WagateError::Storage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_exceeded_formats_current_and_limit() {
        let err = WagateError::LimitExceeded {
            kind: LimitKind::Account,
            current: 1,
            limit: 1,
        };
        assert_eq!(err.to_string(), "account limit reached: 1/1");
    }

    #[test]
    fn not_connected_names_the_session() {
        let err = WagateError::NotConnected {
            session_id: "s1".into(),
        };
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn transient_classification() {
        assert!(WagateError::Timeout {
            duration: std::time::Duration::from_secs(10)
        }
        .is_transient());
        assert!(WagateError::Webhook {
            message: "502 from upstream".into(),
            source: None,
        }
        .is_transient());
        assert!(!WagateError::Validation("bad id".into()).is_transient());
        assert!(!WagateError::NotConnected {
            session_id: "s1".into()
        }
        .is_transient());
    }
}
