//! Rendering surface contract.
//!
//! The presentation layer (a DOM in the original deployment) is an external
//! collaborator: components push display state through this trait and never
//! touch rendering machinery directly.

use crate::models::{Conversation, Message};

/// One rendered message bubble.
#[derive(Debug, Clone)]
pub struct MessageBubble {
    pub message: Message,
    /// Whether this bubble belongs to the current user's side of the thread.
    pub mine: bool,
    /// Human-friendly timestamp label ("14:05", "Tue", "Jun 01").
    pub time_label: String,
}

pub trait RenderSurface: Send + Sync {
    /// Replace the conversation sidebar contents.
    fn render_conversations(&self, conversations: &[Conversation]);

    /// Replace the open thread's message area, oldest first.
    fn render_messages(&self, partner_id: &str, bubbles: &[MessageBubble]);

    /// Flip the read marker on one already-rendered bubble, without a reload.
    fn set_read_marker(&self, message_id: &str);

    /// Enable or disable the composer input/button pair.
    fn set_composer_enabled(&self, enabled: bool);

    /// Clear the composer after a successful send.
    fn clear_composer(&self);

    /// Surface a user-facing failure (toast in the original deployment).
    fn show_error(&self, message: &str);
}
