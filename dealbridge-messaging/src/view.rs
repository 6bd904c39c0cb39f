//! Conversation view: drives the thread display and the send action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::error::MessagingError;
use crate::models::input::{ConversationQueryInput, MessagesQueryInput, SendMessageInput};
use crate::realtime::LiveEvent;
use crate::service::MessagingService;
use crate::surface::{MessageBubble, RenderSurface};

pub struct ConversationView {
    service: Arc<MessagingService>,
    surface: Arc<dyn RenderSurface>,
    current_partner: tokio::sync::Mutex<Option<String>>,
    /// Guards the composer against re-entrant sends.
    sending: AtomicBool,
}

impl ConversationView {
    pub fn new(service: Arc<MessagingService>, surface: Arc<dyn RenderSurface>) -> Self {
        Self {
            service,
            surface,
            current_partner: tokio::sync::Mutex::new(None),
            sending: AtomicBool::new(false),
        }
    }

    pub async fn current_partner(&self) -> Option<String> {
        self.current_partner.lock().await.clone()
    }

    /// Reload the conversation sidebar from the backend.
    pub async fn refresh_conversations(&self) -> Result<(), MessagingError> {
        let conversations = self
            .service
            .conversations(ConversationQueryInput::default())
            .await?;
        self.surface.render_conversations(&conversations);
        Ok(())
    }

    /// Open a thread: load its history, mark it read, refresh the sidebar so
    /// the unread indicator disappears.
    pub async fn open_conversation(&self, partner_id: &str) -> Result<(), MessagingError> {
        *self.current_partner.lock().await = Some(partner_id.to_string());

        self.load_messages(partner_id).await?;
        self.service.mark_conversation_read(partner_id).await?;
        self.refresh_conversations().await?;
        Ok(())
    }

    async fn load_messages(&self, partner_id: &str) -> Result<(), MessagingError> {
        let messages = self
            .service
            .conversation_messages(MessagesQueryInput::new(partner_id))
            .await?;

        let now = Utc::now();
        let bubbles: Vec<MessageBubble> = messages
            .into_iter()
            .map(|message| {
                // A bubble is mine when its sender is not the open partner.
                let mine = message.sender_id != partner_id;
                let time_label = format_time(message.created_at, now);
                MessageBubble {
                    message,
                    mine,
                    time_label,
                }
            })
            .collect();

        self.surface.render_messages(partner_id, &bubbles);
        Ok(())
    }

    /// Send the composer content to the open partner.
    ///
    /// Whitespace-only content and sends without an open thread are no-ops
    /// with no backend call. The composer is disabled for the duration and
    /// re-enabled whether the send succeeds or fails; failures surface as a
    /// toast rather than propagating.
    pub async fn send_message(&self, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }

        let partner_id = match self.current_partner.lock().await.clone() {
            Some(partner) => partner,
            None => return,
        };

        if self.sending.swap(true, Ordering::SeqCst) {
            warn!("send already in flight, ignoring");
            return;
        }
        self.surface.set_composer_enabled(false);

        let result = self
            .service
            .send_message(SendMessageInput {
                recipient_id: partner_id,
                content: content.to_string(),
                subject: None,
                match_id: None,
            })
            .await;

        self.surface.set_composer_enabled(true);
        self.sending.store(false, Ordering::SeqCst);

        match result {
            Ok(_) => {
                // The live echo renders the message; just reset the composer.
                self.surface.clear_composer();
            }
            Err(e) => {
                error!(error = %e, "failed to send message");
                self.surface.show_error("Failed to send message");
            }
        }
    }

    /// React to a classified live event.
    ///
    /// A new message reloads the sidebar; when it belongs to the open thread
    /// the history is reloaded too and, since the user is looking at it, the
    /// message is marked read immediately. An update patches the one read
    /// marker without any reload.
    pub async fn handle_live_event(&self, event: &LiveEvent) {
        match event {
            LiveEvent::NewMessage(message) => {
                if let Err(e) = self.refresh_conversations().await {
                    error!(error = %e, "failed to reload conversations");
                }

                let current = self.current_partner.lock().await.clone();
                let Some(partner_id) = current else { return };

                if message.sender_id == partner_id || message.recipient_id == partner_id {
                    if let Err(e) = self.load_messages(&partner_id).await {
                        error!(error = %e, "failed to reload open thread");
                    }
                    if message.recipient_id != partner_id {
                        if let Err(e) = self.service.mark_message_read(&message.id).await {
                            error!(error = %e, "failed to mark live message read");
                        }
                    }
                }
            }
            LiveEvent::MessageUpdated(message) => {
                if message.read_at.is_some() {
                    self.surface.set_read_marker(&message.id);
                }
            }
        }
    }
}

/// Compact timestamp label: time of day within 24h, weekday within a week,
/// short date beyond that.
pub fn format_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(at);
    if age.num_hours() < 24 {
        at.format("%H:%M").to_string()
    } else if age.num_days() < 7 {
        at.format("%a").to_string()
    } else {
        at.format("%b %d").to_string()
    }
}
