// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Advisory tier-limit checks.
//!
//! Both checks reject at the edge only; they never police established
//! sessions mid-send.

use std::sync::Arc;

use wagate_core::{LimitKind, Organization, SessionStore, WagateError};

/// Rejects a session create once the org's non-error session count has
/// reached its account cap.
pub async fn check_account_limit(
    store: &Arc<dyn SessionStore>,
    org: &Organization,
) -> Result<(), WagateError> {
    let current = store.count_active_sessions(&org.id).await?;
    if current >= org.max_accounts {
        return Err(WagateError::LimitExceeded {
            kind: LimitKind::Account,
            current,
            limit: org.max_accounts,
        });
    }
    Ok(())
}

/// Rejects a send once the org's current-month message total (sent plus
/// received) has reached its monthly cap.
pub async fn check_message_limit(
    store: &Arc<dyn SessionStore>,
    org: &Organization,
) -> Result<(), WagateError> {
    let usage = store.month_usage(&org.id).await?;
    let current = usage.messages_sent + usage.messages_received;
    if current >= org.max_messages_per_month {
        return Err(WagateError::LimitExceeded {
            kind: LimitKind::Message,
            current,
            limit: org.max_messages_per_month,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wagate_core::{OrganizationInput, SubscriptionTier, UsageKind};
    use wagate_test_utils::MemoryStore;

    async fn setup(max_accounts: u64, max_messages: u64) -> (Arc<dyn SessionStore>, Organization) {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let org = store
            .create_organization(OrganizationInput {
                name: "Acme".into(),
                owner_id: "owner".into(),
                tier: SubscriptionTier::Free,
                max_accounts,
                max_messages_per_month: max_messages,
                webhook_url: None,
                crm_api_key: None,
                crm_location_id: None,
            })
            .await
            .unwrap();
        (store, org)
    }

    #[tokio::test]
    async fn account_limit_rejects_at_cap() {
        let (store, org) = setup(1, 100).await;
        assert!(check_account_limit(&store, &org).await.is_ok());

        store.create_session("s1", &org.id).await.unwrap();
        let result = check_account_limit(&store, &org).await;
        match result {
            Err(WagateError::LimitExceeded {
                kind: LimitKind::Account,
                current,
                limit,
            }) => {
                assert_eq!(current, 1);
                assert_eq!(limit, 1);
            }
            other => panic!("expected account limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn errored_sessions_free_their_slot() {
        let (store, org) = setup(1, 100).await;
        store.create_session("s1", &org.id).await.unwrap();
        store
            .update_session_status(
                "s1",
                wagate_core::SessionStatus::Error,
                None,
                Some("max retries"),
            )
            .await
            .unwrap();
        assert!(check_account_limit(&store, &org).await.is_ok());
    }

    #[tokio::test]
    async fn message_limit_counts_both_directions() {
        let (store, org) = setup(5, 3).await;
        store
            .increment_usage(&org.id, UsageKind::MessageSent)
            .await
            .unwrap();
        store
            .increment_usage(&org.id, UsageKind::MessageReceived)
            .await
            .unwrap();
        assert!(check_message_limit(&store, &org).await.is_ok());

        store
            .increment_usage(&org.id, UsageKind::MessageReceived)
            .await
            .unwrap();
        let result = check_message_limit(&store, &org).await;
        assert!(matches!(
            result,
            Err(WagateError::LimitExceeded {
                kind: LimitKind::Message,
                current: 3,
                limit: 3,
            })
        ));
    }
}
