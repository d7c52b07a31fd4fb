// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`WagateError`] to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use wagate_core::{LimitKind, WagateError};

/// Error body returned by the API edge.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// Wrapper giving [`WagateError`] an HTTP status mapping.
#[derive(Debug)]
pub struct ApiError(pub WagateError);

impl From<WagateError> for ApiError {
    fn from(err: WagateError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self.0 {
            WagateError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: msg.clone(),
                    current: None,
                    limit: None,
                },
            ),
            WagateError::Auth(msg) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: msg.clone(),
                    current: None,
                    limit: None,
                },
            ),
            WagateError::LimitExceeded {
                kind,
                current,
                limit,
            } => {
                let (status, label) = match kind {
                    LimitKind::Account => (StatusCode::FORBIDDEN, "Account limit reached"),
                    LimitKind::Message => {
                        (StatusCode::TOO_MANY_REQUESTS, "Message limit reached")
                    }
                };
                (
                    status,
                    ErrorBody {
                        error: label.to_string(),
                        current: Some(*current),
                        limit: Some(*limit),
                    },
                )
            }
            WagateError::NotConnected { session_id } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: format!("session {session_id} is not connected"),
                    current: None,
                    limit: None,
                },
            ),
            other => {
                error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        error: "internal server error".to_string(),
                        current: None,
                        limit: None,
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
