mod common;

use chrono::{Duration, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

use common::{doctor, state};
use imaging_hub::conf::NotificationSettings;
use imaging_hub::modules::notification::models::{Category, NewNotification, Priority};
use imaging_hub::modules::notification::query::{ListParams, NotificationQuery};
use imaging_hub::modules::notification::NotificationError;
use imaging_hub::realtime::{ConnectionHandle, Outbound};

fn note(recipient: &str, title: &str) -> NewNotification {
    NewNotification::new(recipient, title, format!("{} message", title))
}

fn frames(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(Outbound::Text(text)) = rx.try_recv() {
        out.push(serde_json::from_str(&text).unwrap());
    }
    out
}

#[tokio::test]
async fn mark_all_read_clears_unread() {
    let (_, state) = state();
    let svc = &state.notifications;
    for i in 0..3 {
        svc.create(note("doc-b", &format!("n{}", i))).await.unwrap();
    }
    assert_eq!(svc.stats("doc-b").await.unwrap().unread, 3);

    assert_eq!(svc.mark_all_read(&doctor("doc-b")).await.unwrap(), 3);
    let stats = svc.stats("doc-b").await.unwrap();
    assert_eq!(stats.unread, 0);
    assert_eq!(stats.total, 3);

    // 无未读时也安全 / Safe with nothing unread
    assert_eq!(svc.mark_all_read(&doctor("doc-b")).await.unwrap(), 0);
    assert_eq!(svc.mark_all_read(&doctor("nobody")).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_requires_recipient() {
    let (_, state) = state();
    let svc = &state.notifications;
    let n = svc.create(note("doc-b", "shared")).await.unwrap();

    let err = svc.delete(&doctor("doc-a"), &n.id).await.unwrap_err();
    assert!(matches!(err, NotificationError::NotFound { .. }));
    assert_eq!(svc.stats("doc-b").await.unwrap().total, 1);

    svc.delete(&doctor("doc-b"), &n.id).await.unwrap();
    let page = svc.list("doc-b", &NotificationQuery::default()).await.unwrap();
    assert_eq!(page.total, 0);
    assert!(page.items.is_empty());

    let err = svc.delete(&doctor("doc-b"), &n.id).await.unwrap_err();
    assert!(matches!(err, NotificationError::NotFound { .. }));
}

#[tokio::test]
async fn lifecycle_events_reach_every_connection() {
    let (_, state) = state();
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    let registry = state.dispatcher.registry();
    registry.join("doc-b", ConnectionHandle::new("tab-1", tx1));
    registry.join("doc-b", ConnectionHandle::new("tab-2", tx2));

    let svc = &state.notifications;
    let n = svc.create(note("doc-b", "report ready")).await.unwrap();
    svc.mark_read(&doctor("doc-b"), &n.id).await.unwrap();
    svc.mark_all_read(&doctor("doc-b")).await.unwrap();
    svc.delete(&doctor("doc-b"), &n.id).await.unwrap();

    for rx in [&mut rx1, &mut rx2] {
        let got = frames(rx);
        let events: Vec<_> = got.iter().map(|f| f["event"].as_str().unwrap().to_string()).collect();
        assert_eq!(
            events,
            vec!["notification", "notification_read", "all_notifications_read", "notification_deleted"]
        );
        let seqs: Vec<_> = got.iter().map(|f| f["seq"].as_u64().unwrap()).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(got[1]["data"]["id"], n.id.as_str());
        assert_eq!(got[2]["data"]["count"], 0);
    }
}

#[tokio::test]
async fn closed_connection_does_not_block_others() {
    let (_, state) = state();
    let (tx_dead, rx_dead) = mpsc::unbounded_channel();
    let (tx_live, mut rx_live) = mpsc::unbounded_channel();
    let registry = state.dispatcher.registry();
    registry.join("doc-b", ConnectionHandle::new("dead", tx_dead));
    registry.join("doc-b", ConnectionHandle::new("live", tx_live));
    drop(rx_dead);

    state.notifications.create(note("doc-b", "hello")).await.unwrap();
    assert_eq!(frames(&mut rx_live).len(), 1);
    assert_eq!(registry.connections_of("doc-b"), 1);
}

#[tokio::test]
async fn pagination_filters_and_sort() {
    let (_, state) = state();
    let svc = &state.notifications;
    for i in 0..25 {
        let mut n = note("doc-b", &format!("routine {:02}", i));
        if i % 5 == 0 {
            n.priority = Priority::Urgent;
            n.category = Category::Medical;
            n.title = format!("urgent MRI {:02}", i);
        }
        svc.create(n).await.unwrap();
    }
    svc.create(note("doc-c", "someone else")).await.unwrap();

    let settings = NotificationSettings::default();
    let query = ListParams {
        page: Some(2),
        per_page: Some(10),
        ..Default::default()
    }
    .into_query(&settings)
    .unwrap();
    let page = svc.list("doc-b", &query).await.unwrap();
    assert_eq!(page.total, 25);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items.len(), 10);
    assert!(page.items.iter().all(|n| n.recipient_id == "doc-b"));

    let query = ListParams {
        priority: Some("urgent".to_string()),
        search: Some("mri".to_string()),
        sort: Some("title:asc".to_string()),
        ..Default::default()
    }
    .into_query(&settings)
    .unwrap();
    let page = svc.list("doc-b", &query).await.unwrap();
    let titles: Vec<_> = page.items.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["urgent MRI 00", "urgent MRI 05", "urgent MRI 10", "urgent MRI 15", "urgent MRI 20"]
    );

    let stats = svc.stats("doc-b").await.unwrap();
    assert_eq!(stats.high_priority, 5);
    assert_eq!(stats.by_category.get(&Category::Medical), Some(&5));
    assert_eq!(stats.by_category.get(&Category::System), Some(&20));
}

#[tokio::test]
async fn expired_notifications_are_hidden_then_purged() {
    let (_, state) = state();
    let svc = &state.notifications;
    let mut stale = note("doc-b", "expired");
    stale.expires_at = Some(Utc::now() - Duration::minutes(1));
    svc.create(stale).await.unwrap();
    let mut fresh = note("doc-b", "fresh");
    fresh.expires_at = Some(Utc::now() + Duration::hours(1));
    fresh.action_required = true;
    svc.create(fresh).await.unwrap();

    let stats = svc.stats("doc-b").await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.action_required, 1);
    let page = svc.list("doc-b", &NotificationQuery::default()).await.unwrap();
    assert_eq!(page.items[0].title, "fresh");

    assert_eq!(svc.purge_expired().await.unwrap(), 1);
    assert_eq!(svc.purge_expired().await.unwrap(), 0);
}
