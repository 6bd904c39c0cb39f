use std::sync::Arc;

use dealbridge_dashboard::{BadgeSink, DashboardMessages, NotificationSink};
use dealbridge_messaging::{
    BackendClient, ConversationView, MemoryBackend, MessagingService, RenderSurface,
};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Badge sink standing in for a DOM location.
struct LogBadge {
    location: &'static str,
}

impl BadgeSink for LogBadge {
    fn update(&self, count: usize, label: Option<&str>) {
        match label {
            Some(label) => info!(location = self.location, count, %label, "badge updated"),
            None => info!(location = self.location, "badge hidden"),
        }
    }
}

struct LogNotifications;

impl NotificationSink for LogNotifications {
    fn notify(&self, title: &str, body: &str) {
        info!(%title, %body, "notification");
    }
}

/// Render surface standing in for the messages section of the dashboard.
struct LogSurface;

impl RenderSurface for LogSurface {
    fn render_conversations(&self, conversations: &[dealbridge_messaging::Conversation]) {
        for conversation in conversations {
            let (name, avatar) = match conversation.partner.as_ref() {
                Some(partner) => (partner.display_name(), partner.initials()),
                // Missing profile join: placeholder initials, id as the name.
                None => (conversation.partner_id.clone(), "U".to_string()),
            };
            info!(
                partner = %name,
                %avatar,
                unread = conversation.unread_count,
                last = %conversation.last_message.content,
                "conversation"
            );
        }
    }

    fn render_messages(&self, partner_id: &str, bubbles: &[dealbridge_messaging::MessageBubble]) {
        for bubble in bubbles {
            let side = if bubble.mine { "me" } else { partner_id };
            info!(from = side, at = %bubble.time_label, "  {}", bubble.message.content);
        }
    }

    fn set_read_marker(&self, message_id: &str) {
        info!(message_id, "read marker set");
    }

    fn set_composer_enabled(&self, enabled: bool) {
        info!(enabled, "composer state");
    }

    fn clear_composer(&self) {}

    fn show_error(&self, message: &str) {
        error!(%message, "toast");
    }
}

/// Seed a profile row for a demo user.
async fn seed_profile(backend: &MemoryBackend, profile_id: &str, user_id: &str, name: &str) {
    backend
        .insert(
            "profiles",
            json!({
                "id": profile_id,
                "user_id": user_id,
                "first_name": name,
                "last_name": "Demo",
                "avatar_url": null,
                "company": "Dealbridge Demo Co",
            }),
        )
        .await
        .expect("seed profile");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Demo bootstrap against the in-memory backend: one buyer signed in, one
    // seller messaging them from outside.
    let backend = Arc::new(MemoryBackend::new());
    backend.sign_in("auth-buyer");
    seed_profile(&backend, "buyer", "auth-buyer", "Blake").await;
    seed_profile(&backend, "seller", "auth-seller", "Sam").await;

    let service = Arc::new(MessagingService::new(backend.clone()));
    let dashboard = Arc::new(DashboardMessages::new(service.clone()));

    let surface = Arc::new(LogSurface);
    let view = Arc::new(ConversationView::new(service.clone(), surface));
    dashboard.set_view(view.clone());
    dashboard.set_notifications(Arc::new(LogNotifications));

    dashboard.unread().add_sink(Arc::new(LogBadge { location: "nav" }));
    dashboard.unread().add_sink(Arc::new(LogBadge { location: "kpi" }));

    dashboard.init().await.expect("messaging init");

    // The seller reaches out; the live channel picks it up.
    backend
        .insert(
            "messages",
            json!({
                "sender_id": "seller",
                "recipient_id": "buyer",
                "content": "Hi! Still interested in the bakery listing?",
                "subject": "Bakery listing",
                "match_id": null,
                "status": "sent",
                "created_at": chrono::Utc::now(),
                "read_at": null,
            }),
        )
        .await
        .expect("seller message");

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    info!(unread = dashboard.unread_count(), "after incoming message");

    // The buyer opens the thread and replies.
    view.open_conversation("seller").await.expect("open conversation");
    view.send_message("Yes, can we talk this week?").await;

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    info!(unread = dashboard.unread_count(), "after reading the thread");

    dashboard.destroy().await;
}
