use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profile::Profile;

/// Delivery state of a message row. The only client-driven transition is
/// `Sent`/`Delivered` -> `Read`, performed together with setting `read_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub subject: Option<String>,
    pub match_id: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    /// Joined sender profile, when the backend query included it.
    pub sender: Option<Profile>,
    /// Joined recipient profile, when the backend query included it.
    pub recipient: Option<Profile>,
}

impl Message {
    /// The other party of a message from the current user's point of view.
    pub fn partner_id(&self, me: &str) -> &str {
        if self.sender_id == me {
            &self.recipient_id
        } else {
            &self.sender_id
        }
    }

    /// Joined profile of the other party, if the query carried it.
    pub fn partner_profile(&self, me: &str) -> Option<&Profile> {
        if self.sender_id == me {
            self.recipient.as_ref()
        } else {
            self.sender.as_ref()
        }
    }

    /// True when this message counts toward the current user's unread total.
    pub fn is_unread_for(&self, me: &str) -> bool {
        self.recipient_id == me && self.read_at.is_none()
    }
}
