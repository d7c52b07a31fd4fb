// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token authentication for the API edge.
//!
//! `Authorization: Bearer <api_token>` is resolved against the
//! organization table; the matched [`Organization`] rides the request as
//! an extension. Unknown and missing tokens are rejected uniformly so the
//! edge does not leak which tokens exist.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use wagate_core::{Organization, UsageKind, WagateError};

use crate::error::ApiError;
use crate::server::GatewayState;

/// The authenticated tenant, injected into request extensions.
#[derive(Clone)]
pub struct OrgContext(pub Organization);

impl std::fmt::Debug for OrgContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The api_token must never appear in logs.
        f.debug_struct("OrgContext")
            .field("org_id", &self.0.id)
            .finish()
    }
}

/// Middleware resolving the bearer token to an organization.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError(WagateError::Auth("missing bearer token".into())))?;

    let org = state
        .store
        .get_organization_by_token(token)
        .await?
        .ok_or_else(|| ApiError(WagateError::Auth("invalid bearer token".into())))?;

    // Advisory API-call metering; never blocks the request.
    let store = state.store.clone();
    let org_id = org.id.clone();
    tokio::spawn(async move {
        if let Err(e) = store.increment_usage(&org_id, UsageKind::ApiCall).await {
            debug!(org_id = org_id.as_str(), error = %e, "api call metering failed");
        }
    });

    request.extensions_mut().insert(OrgContext(org));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagate_core::SubscriptionTier;

    #[test]
    fn debug_output_hides_the_token() {
        let ctx = OrgContext(Organization {
            id: "org-1".into(),
            name: "Acme".into(),
            owner_id: "owner".into(),
            tier: SubscriptionTier::Free,
            max_accounts: 1,
            max_messages_per_month: 100,
            webhook_url: None,
            crm_api_key: None,
            crm_location_id: None,
            api_token: "super-secret-token".into(),
            created_at: "2026-08-01T00:00:00.000Z".into(),
        });
        let debug = format!("{ctx:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("org-1"));
    }
}
