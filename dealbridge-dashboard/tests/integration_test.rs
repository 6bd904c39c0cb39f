//! Integration tests for the dashboard messaging surface.
//!
//! These drive the full loop over the in-memory backend: messages inserted
//! behind the scenes reach the live channel, move the unread signal, fire
//! notifications and callbacks, and go quiet after destroy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dealbridge_dashboard::{BadgeSink, DashboardMessages, NotificationSink};
use dealbridge_messaging::{
    BackendClient, Conversation, ConversationView, Filter, MemoryBackend, MessageBubble,
    MessagingService, RenderSurface,
};
use serde_json::json;
use tokio::time::timeout;

struct RecordingNotifications {
    received: Mutex<Vec<(String, String)>>,
}

impl NotificationSink for RecordingNotifications {
    fn notify(&self, title: &str, body: &str) {
        self.received
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

struct RecordingBadge {
    labels: Mutex<Vec<Option<String>>>,
}

impl BadgeSink for RecordingBadge {
    fn update(&self, _count: usize, label: Option<&str>) {
        self.labels.lock().unwrap().push(label.map(String::from));
    }
}

/// Render surface that swallows everything; the view tests in the core crate
/// cover rendering.
struct NullSurface;

impl RenderSurface for NullSurface {
    fn render_conversations(&self, _conversations: &[Conversation]) {}
    fn render_messages(&self, _partner_id: &str, _bubbles: &[MessageBubble]) {}
    fn set_read_marker(&self, _message_id: &str) {}
    fn set_composer_enabled(&self, _enabled: bool) {}
    fn clear_composer(&self) {}
    fn show_error(&self, _message: &str) {}
}

async fn seed_profile(backend: &MemoryBackend, profile_id: &str, user_id: &str) {
    backend
        .insert(
            "profiles",
            json!({
                "id": profile_id,
                "user_id": user_id,
                "first_name": "Test",
                "last_name": "User",
                "avatar_url": null,
                "company": null,
            }),
        )
        .await
        .unwrap();
}

async fn seed_message(backend: &MemoryBackend, from: &str, to: &str, content: &str) {
    backend
        .insert(
            "messages",
            json!({
                "sender_id": from,
                "recipient_id": to,
                "content": content,
                "subject": null,
                "match_id": null,
                "status": "sent",
                "created_at": chrono::Utc::now(),
                "read_at": null,
            }),
        )
        .await
        .unwrap();
}

/// Sign in as "me" and bring the dashboard up.
async fn start_dashboard() -> (Arc<MemoryBackend>, Arc<DashboardMessages>) {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in("auth-me");
    seed_profile(&backend, "me", "auth-me").await;
    seed_profile(&backend, "alice", "auth-alice").await;

    let service = Arc::new(MessagingService::new(backend.clone()));
    let dashboard = Arc::new(DashboardMessages::new(service));
    dashboard.init().await.unwrap();

    (backend, dashboard)
}

/// Wait until the unread signal reaches `expected`.
async fn wait_for_unread(dashboard: &DashboardMessages, expected: usize) {
    let mut rx = dashboard.unread().watch();
    let result = timeout(Duration::from_secs(2), async {
        loop {
            if *rx.borrow_and_update() == expected {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("unread signal closed");
            }
        }
    })
    .await;
    assert!(
        result.is_ok(),
        "timed out waiting for unread == {} (got {})",
        expected,
        dashboard.unread_count()
    );
}

#[tokio::test]
async fn incoming_message_raises_unread_and_notifies() {
    let (backend, dashboard) = start_dashboard().await;

    let notifications = Arc::new(RecordingNotifications {
        received: Mutex::new(Vec::new()),
    });
    dashboard.set_notifications(notifications.clone());

    let callback_hits = Arc::new(AtomicUsize::new(0));
    let hits = callback_hits.clone();
    dashboard.on_message_update(move |_event| {
        hits.fetch_add(1, Ordering::SeqCst);
    });

    seed_message(&backend, "alice", "me", "Is the coffee shop still available?").await;

    wait_for_unread(&dashboard, 1).await;
    assert_eq!(dashboard.unread_count(), 1);
    assert!(callback_hits.load(Ordering::SeqCst) >= 1);

    let received = notifications.received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, "New Message");
    assert!(received[0].1.contains("coffee shop"));

    dashboard.destroy().await;
}

#[tokio::test]
async fn read_update_event_drops_unread_without_reload() {
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in("auth-me");
    seed_profile(&backend, "me", "auth-me").await;
    seed_message(&backend, "alice", "me", "hello").await;

    let service = Arc::new(MessagingService::new(backend.clone()));
    let dashboard = Arc::new(DashboardMessages::new(service));
    dashboard.init().await.unwrap();

    // Startup refresh sees the pre-existing unread message.
    wait_for_unread(&dashboard, 1).await;

    // Another session marks it read; only the UPDATE event reaches us.
    backend
        .update(
            "messages",
            json!({"read_at": chrono::Utc::now(), "status": "read"}),
            vec![Filter::eq("recipient_id", "me")],
        )
        .await
        .unwrap();

    wait_for_unread(&dashboard, 0).await;

    dashboard.destroy().await;
}

#[tokio::test]
async fn opening_a_conversation_only_clears_that_partner() {
    let (backend, dashboard) = start_dashboard().await;
    seed_profile(&backend, "bob", "auth-bob").await;

    seed_message(&backend, "alice", "me", "from alice").await;
    seed_message(&backend, "bob", "me", "from bob").await;
    wait_for_unread(&dashboard, 2).await;

    let view = Arc::new(ConversationView::new(
        dashboard.service(),
        Arc::new(NullSurface),
    ));
    dashboard.set_view(view.clone());

    view.open_conversation("alice").await.unwrap();

    wait_for_unread(&dashboard, 1).await;

    let conversations = dashboard
        .service()
        .conversations(Default::default())
        .await
        .unwrap();
    let bob = conversations.iter().find(|c| c.partner_id == "bob").unwrap();
    assert_eq!(bob.unread_count, 1);

    dashboard.destroy().await;
}

#[tokio::test]
async fn destroy_silences_all_callbacks() {
    let (backend, dashboard) = start_dashboard().await;

    let callback_hits = Arc::new(AtomicUsize::new(0));
    let hits = callback_hits.clone();
    dashboard.on_message_update(move |_event| {
        hits.fetch_add(1, Ordering::SeqCst);
    });

    seed_message(&backend, "alice", "me", "before destroy").await;
    wait_for_unread(&dashboard, 1).await;
    let hits_before = callback_hits.load(Ordering::SeqCst);

    dashboard.destroy().await;
    dashboard.destroy().await; // idempotent

    seed_message(&backend, "alice", "me", "after destroy").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(callback_hits.load(Ordering::SeqCst), hits_before);
    // The unread signal kept its last value; nothing refreshed it.
    assert_eq!(dashboard.unread_count(), 1);
}

#[tokio::test]
async fn badge_sinks_observe_the_capped_label() {
    let (backend, dashboard) = start_dashboard().await;

    let badge = Arc::new(RecordingBadge {
        labels: Mutex::new(Vec::new()),
    });
    dashboard.unread().add_sink(badge.clone());

    for i in 0..120 {
        seed_message(&backend, "alice", "me", &format!("bulk {}", i)).await;
    }
    wait_for_unread(&dashboard, 120).await;

    // Give the observer task a beat to drain.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let labels = badge.labels.lock().unwrap();
    assert_eq!(labels.last().unwrap().as_deref(), Some("99+"));

    dashboard.destroy().await;
}

#[tokio::test]
async fn panicking_callback_does_not_stop_dispatch() {
    let (backend, dashboard) = start_dashboard().await;

    dashboard.on_message_update(|_event| panic!("misbehaving observer"));

    let callback_hits = Arc::new(AtomicUsize::new(0));
    let hits = callback_hits.clone();
    dashboard.on_message_update(move |_event| {
        hits.fetch_add(1, Ordering::SeqCst);
    });

    seed_message(&backend, "alice", "me", "one").await;
    wait_for_unread(&dashboard, 1).await;
    seed_message(&backend, "alice", "me", "two").await;
    wait_for_unread(&dashboard, 2).await;

    assert!(callback_hits.load(Ordering::SeqCst) >= 2);

    dashboard.destroy().await;
}
