// SPDX-FileCopyrightText: 2026 Wagate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the outbound queue: FIFO order, rate limiting,
//! retry accounting, and teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use wagate_config::model::{QueueConfig, ReconnectConfig};
use wagate_core::traits::events::NullSink;
use wagate_core::{
    MessageDirection, OrganizationInput, SessionStore, SubscriptionTier, WaEvent, WagateError,
};
use wagate_queue::OutboundQueue;
use wagate_session::SessionSupervisor;
use wagate_test_utils::{MemoryStore, MockConnector};

struct Fixture {
    store: Arc<MemoryStore>,
    connector: Arc<MockConnector>,
    supervisor: Arc<SessionSupervisor>,
    queue: Arc<OutboundQueue>,
    org_id: String,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let connector = Arc::new(MockConnector::new());
    let cancel = CancellationToken::new();

    let org = store
        .create_organization(OrganizationInput {
            name: "Acme".into(),
            owner_id: "owner".into(),
            tier: SubscriptionTier::Pro,
            max_accounts: 10,
            max_messages_per_month: 100_000,
            webhook_url: None,
            crm_api_key: None,
            crm_location_id: None,
        })
        .await
        .unwrap();

    let supervisor = SessionSupervisor::new(
        store.clone(),
        connector.clone(),
        Arc::new(NullSink),
        ReconnectConfig::default(),
        None,
        cancel.clone(),
    );

    let queue = OutboundQueue::new(
        supervisor.clone(),
        store.clone(),
        QueueConfig::default(),
        cancel,
    );

    Fixture {
        store,
        connector,
        supervisor,
        queue,
        org_id: org.id,
    }
}

async fn connect_session(f: &Fixture, session_id: &str) {
    f.supervisor
        .create_session(session_id, &f.org_id)
        .await
        .unwrap();
    f.connector
        .emit(
            session_id,
            WaEvent::Open {
                phone_number: "5559990000".into(),
            },
        )
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test(start_paused = true)]
async fn sends_in_enqueue_order_with_pacing() {
    let f = fixture().await;
    connect_session(&f, "s1").await;

    for i in 0..3 {
        f.queue
            .enqueue("s1", &f.org_id, "5551234567", &format!("msg-{i}"), "text")
            .await
            .unwrap();
    }

    // 3 sends at 3s pacing finish within ~10s.
    tokio::time::sleep(Duration::from_secs(10)).await;

    let client = f.connector.client("s1").unwrap();
    let texts: Vec<String> = client.sent_messages().into_iter().map(|(_, t)| t).collect();
    assert_eq!(texts, vec!["msg-0", "msg-1", "msg-2"]);
    assert_eq!(f.queue.pending_count("s1").await, 0);

    // Each success persisted an outbound row and bumped usage.
    let usage = f.store.month_usage(&f.org_id).await.unwrap();
    assert_eq!(usage.messages_sent, 3);
}

#[tokio::test(start_paused = true)]
async fn twenty_five_messages_respect_the_per_minute_budget() {
    let f = fixture().await;
    connect_session(&f, "s1").await;

    let items: Vec<(String, String)> = (0..25)
        .map(|i| ("5551234567".to_string(), format!("bulk-{i}")))
        .collect();
    let queue_ids = f.queue.enqueue_bulk("s1", &f.org_id, &items).await.unwrap();
    assert_eq!(queue_ids.len(), 25);

    // First 20 dispatch within the first minute, one every ~3s.
    tokio::time::sleep(Duration::from_secs(59)).await;
    let client = f.connector.client("s1").unwrap();
    assert_eq!(client.sent_count(), 20);

    // The stragglers drain as tokens refill; all 25 done within ~80s.
    tokio::time::sleep(Duration::from_secs(21)).await;
    assert_eq!(client.sent_count(), 25);
    assert_eq!(f.queue.pending_count("s1").await, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_sends_requeue_then_drop_at_attempt_cap() {
    let f = fixture().await;
    connect_session(&f, "s1").await;

    let client = f.connector.client("s1").unwrap();
    client.set_fail_sends(true);

    f.queue
        .enqueue("s1", &f.org_id, "5551234567", "doomed", "text")
        .await
        .unwrap();

    // 3 attempts with 5s failure pauses; give it ample room.
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(f.queue.pending_count("s1").await, 0, "item dropped at cap");
    // No outbound row: messages are only created after a successful send.
    let usage = f.store.month_usage(&f.org_id).await.unwrap();
    assert_eq!(usage.messages_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_item_goes_to_tail_not_head() {
    let f = fixture().await;
    connect_session(&f, "s1").await;

    let client = f.connector.client("s1").unwrap();
    client.set_fail_sends(true);

    f.queue
        .enqueue("s1", &f.org_id, "5551234567", "first", "text")
        .await
        .unwrap();
    f.queue
        .enqueue("s1", &f.org_id, "5551234567", "second", "text")
        .await
        .unwrap();

    // Let exactly one failed attempt happen, then heal the client.
    tokio::time::sleep(Duration::from_secs(4)).await;
    client.set_fail_sends(false);
    tokio::time::sleep(Duration::from_secs(30)).await;

    let texts: Vec<String> = client.sent_messages().into_iter().map(|(_, t)| t).collect();
    assert_eq!(
        texts,
        vec!["second", "first"],
        "failed head re-appends at the tail"
    );
}

#[tokio::test(start_paused = true)]
async fn non_text_and_malformed_targets_are_rejected() {
    let f = fixture().await;
    connect_session(&f, "s1").await;

    let result = f
        .queue
        .enqueue("s1", &f.org_id, "5551234567", "pic", "image")
        .await;
    assert!(matches!(result, Err(WagateError::Validation(_))));

    let result = f
        .queue
        .enqueue("s1", &f.org_id, "not a number", "hi", "text")
        .await;
    assert!(matches!(result, Err(WagateError::Validation(_))));

    let result = f.queue.enqueue("s1", &f.org_id, "5551234567", "", "text").await;
    assert!(matches!(result, Err(WagateError::Validation(_))));
}

#[tokio::test(start_paused = true)]
async fn immediate_send_bypasses_queue_and_bucket() {
    let f = fixture().await;
    connect_session(&f, "s1").await;

    let record = f
        .queue
        .send_immediate("s1", &f.org_id, "5551234567", "urgent")
        .await
        .unwrap();

    assert_eq!(record.direction, MessageDirection::Outbound);
    assert_eq!(record.to_number, "5551234567@s.whatsapp.net");
    assert_eq!(record.from_number, "5559990000");

    let client = f.connector.client("s1").unwrap();
    assert_eq!(client.sent_count(), 1);

    let usage = f.store.month_usage(&f.org_id).await.unwrap();
    assert_eq!(usage.messages_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn immediate_send_fails_when_not_connected() {
    let f = fixture().await;
    f.supervisor.create_session("s1", &f.org_id).await.unwrap();

    let result = f
        .queue
        .send_immediate("s1", &f.org_id, "5551234567", "urgent")
        .await;
    assert!(matches!(result, Err(WagateError::NotConnected { .. })));
}

#[tokio::test(start_paused = true)]
async fn remove_session_cancels_the_worker() {
    let f = fixture().await;
    connect_session(&f, "s1").await;

    f.queue
        .enqueue("s1", &f.org_id, "5551234567", "one", "text")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    f.queue.remove_session("s1");
    f.queue
        .enqueue("s1", &f.org_id, "5551234567", "after-removal", "text")
        .await
        .unwrap();
    // A fresh worker serves the new queue; the old one is gone.
    tokio::time::sleep(Duration::from_secs(5)).await;

    let client = f.connector.client("s1").unwrap();
    let texts: Vec<String> = client.sent_messages().into_iter().map(|(_, t)| t).collect();
    assert!(texts.contains(&"after-removal".to_string()));
}
