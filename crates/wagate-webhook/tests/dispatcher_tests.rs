// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for webhook delivery against a wiremock endpoint.
//!
//! Retry delays are configured to zero so the full retry tail runs in
//! real time without slowing the suite.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wagate_config::model::WebhookConfig;
use wagate_core::{
    MessageDirection, MessageInput, MessageStatus, Organization, OrganizationInput, SessionStore,
    SubscriptionTier, WebhookStatus,
};
use wagate_test_utils::MemoryStore;
use wagate_webhook::{sync_pending_messages, WebhookDispatcher};

fn test_config() -> WebhookConfig {
    WebhookConfig {
        timeout_secs: 5,
        max_retries: 3,
        base_delay_secs: 0,
        sync_interval_secs: 300,
        secret: None,
    }
}

async fn seed_org(store: &MemoryStore, webhook_url: Option<String>) -> Organization {
    store
        .create_organization(OrganizationInput {
            name: "Acme".into(),
            owner_id: "owner".into(),
            tier: SubscriptionTier::Pro,
            max_accounts: 5,
            max_messages_per_month: 10_000,
            webhook_url,
            crm_api_key: Some("crm-key".into()),
            crm_location_id: Some("loc-1".into()),
        })
        .await
        .unwrap()
}

async fn seed_inbound(
    store: &MemoryStore,
    org_id: &str,
    message_id: &str,
) -> wagate_core::MessageRecord {
    store.create_session("s1", org_id).await.ok();
    store
        .save_message(MessageInput {
            session_id: "s1".into(),
            org_id: org_id.into(),
            message_id: message_id.into(),
            direction: MessageDirection::Inbound,
            from_number: "5551234567@s.whatsapp.net".into(),
            to_number: "5559990000@s.whatsapp.net".into(),
            message_type: "text".into(),
            content: r#"{"text":"hi"}"#.into(),
            status: MessageStatus::Delivered,
            is_group_message: false,
            group_jid: None,
            timestamp: "2026-08-01T10:00:00.000Z".into(),
        })
        .await
        .unwrap()
}

/// Polls until the condition holds or two seconds elapse.
async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn successful_delivery_marks_synced_with_crm_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/in"))
        .and(header("Content-Type", "application/json"))
        .and(header("Authorization", "Bearer crm-key"))
        .and(header("X-Location-Id", "loc-1"))
        .and(body_partial_json(serde_json::json!({
            "type": "whatsapp_message",
            "data": { "from": "+5551234567", "message": "hi", "messageId": "m1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "crm-9"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let org = seed_org(&store, Some(format!("{}/in", server.uri()))).await;
    let message = seed_inbound(&store, &org.id, "m1").await;

    let dispatcher =
        WebhookDispatcher::new(store.clone(), test_config(), CancellationToken::new()).unwrap();
    dispatcher.dispatch(message.clone()).await;

    let synced = store.get_message(&message.id).await.unwrap().unwrap();
    assert!(synced.synced_to_crm);
    assert_eq!(synced.crm_message_id.as_deref(), Some("crm-9"));

    let logs = store.list_webhook_logs(&message.id).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, WebhookStatus::Success);
    assert_eq!(logs[0].http_status, Some(200));
    assert_eq!(logs[0].retry_count, 0);
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let server = MockServer::start().await;
    // First two attempts fail, the third lands.
    Mock::given(method("POST"))
        .and(path("/in"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/in"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let org = seed_org(&store, Some(format!("{}/in", server.uri()))).await;
    let message = seed_inbound(&store, &org.id, "m1").await;

    let dispatcher =
        WebhookDispatcher::new(store.clone(), test_config(), CancellationToken::new()).unwrap();
    dispatcher.dispatch(message.clone()).await;

    let store_for_wait = store.clone();
    let id = message.id.clone();
    wait_until(move || {
        let store = store_for_wait.clone();
        let id = id.clone();
        async move { store.get_message(&id).await.unwrap().unwrap().synced_to_crm }
    })
    .await;

    let logs = store.list_webhook_logs(&message.id).await.unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0].status, WebhookStatus::Failed);
    assert_eq!(logs[1].status, WebhookStatus::Failed);
    assert_eq!(logs[2].status, WebhookStatus::Success);
    assert_eq!(logs[2].retry_count, 2);

    // A 2xx with a non-JSON body still syncs, without a CRM id.
    let synced = store.get_message(&message.id).await.unwrap().unwrap();
    assert!(synced.crm_message_id.is_none());
}

#[tokio::test]
async fn exhausted_retries_fail_the_message() {
    let server = MockServer::start().await;
    // Initial attempt + 3 retries, all rejected.
    Mock::given(method("POST"))
        .and(path("/in"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream error"))
        .expect(4)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let org = seed_org(&store, Some(format!("{}/in", server.uri()))).await;
    let message = seed_inbound(&store, &org.id, "m1").await;

    let dispatcher =
        WebhookDispatcher::new(store.clone(), test_config(), CancellationToken::new()).unwrap();
    dispatcher.dispatch(message.clone()).await;

    let store_for_wait = store.clone();
    let id = message.id.clone();
    wait_until(move || {
        let store = store_for_wait.clone();
        let id = id.clone();
        async move {
            store.get_message(&id).await.unwrap().unwrap().status == MessageStatus::Failed
        }
    })
    .await;

    let logs = store.list_webhook_logs(&message.id).await.unwrap();
    assert_eq!(logs.len(), 4);
    assert!(logs.iter().all(|l| l.status == WebhookStatus::Failed));
    assert_eq!(logs[3].retry_count, 3);

    let failed = store.get_message(&message.id).await.unwrap().unwrap();
    assert!(!failed.synced_to_crm);
    assert_eq!(failed.status, MessageStatus::Failed);
}

#[tokio::test]
async fn org_without_webhook_url_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let org = seed_org(&store, None).await;
    let message = seed_inbound(&store, &org.id, "m1").await;

    let dispatcher =
        WebhookDispatcher::new(store.clone(), test_config(), CancellationToken::new()).unwrap();
    dispatcher.dispatch(message.clone()).await;

    let logs = store.list_webhook_logs(&message.id).await.unwrap();
    assert!(logs.is_empty());
    // Stays pending for a later-configured webhook to pick up via backfill.
    let record = store.get_message(&message.id).await.unwrap().unwrap();
    assert!(!record.synced_to_crm);
    assert_ne!(record.status, MessageStatus::Failed);
}

#[tokio::test]
async fn signature_header_is_sent_when_secret_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/in"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let org = seed_org(&store, Some(format!("{}/in", server.uri()))).await;
    let message = seed_inbound(&store, &org.id, "m1").await;

    let config = WebhookConfig {
        secret: Some("hook-secret".into()),
        ..test_config()
    };
    let dispatcher =
        WebhookDispatcher::new(store.clone(), config, CancellationToken::new()).unwrap();
    dispatcher.dispatch(message).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let signature = requests[0]
        .headers
        .get("X-Webhook-Signature")
        .expect("signature header present")
        .to_str()
        .unwrap();
    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn backfill_delivers_pending_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/in"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let org = seed_org(&store, Some(format!("{}/in", server.uri()))).await;
    let m1 = seed_inbound(&store, &org.id, "m1").await;
    let m2 = seed_inbound(&store, &org.id, "m2").await;

    let dispatcher =
        WebhookDispatcher::new(store.clone(), test_config(), CancellationToken::new()).unwrap();

    let store_dyn: Arc<dyn SessionStore> = store.clone();
    sync_pending_messages(&dispatcher, &store_dyn).await;

    for id in [&m1.id, &m2.id] {
        let record = store.get_message(id).await.unwrap().unwrap();
        assert!(record.synced_to_crm, "message {id} backfilled");
    }

    // A second pass finds nothing pending and POSTs nothing new.
    let before = server.received_requests().await.unwrap().len();
    sync_pending_messages(&dispatcher, &store_dyn).await;
    let after = server.received_requests().await.unwrap().len();
    assert_eq!(before, after);
}
