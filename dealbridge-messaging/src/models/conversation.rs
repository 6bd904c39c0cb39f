use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::message::Message;
use super::profile::Profile;

/// A per-partner view over the flat message list. Never persisted: recomputed
/// wholesale from the backend rows on every load, including `unread_count`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub partner_id: String,
    pub partner: Option<Profile>,
    pub last_message: Message,
    pub unread_count: usize,
    pub messages: Vec<Message>,
}

/// Group a flat, newest-first message list into one conversation per partner.
///
/// The first message seen for a partner fixes `last_message`, so the caller
/// must supply rows ordered descending by `created_at`. Messages are appended
/// in received order; `unread_count` counts rows addressed to `me` that have
/// no read timestamp. Missing profile joins leave `partner` as `None` rather
/// than failing; rendering falls back to placeholder initials.
pub fn aggregate_conversations(messages: Vec<Message>, me: &str) -> Vec<Conversation> {
    let mut order: Vec<String> = Vec::new();
    let mut by_partner: HashMap<String, Conversation> = HashMap::new();

    for message in messages {
        let partner_id = message.partner_id(me).to_string();

        let conversation = by_partner.entry(partner_id.clone()).or_insert_with(|| {
            order.push(partner_id.clone());
            Conversation {
                partner_id: partner_id.clone(),
                partner: message.partner_profile(me).cloned(),
                last_message: message.clone(),
                unread_count: 0,
                messages: Vec::new(),
            }
        });

        if message.is_unread_for(me) {
            conversation.unread_count += 1;
        }
        conversation.messages.push(message);
    }

    // First-seen partner order, deterministic for a newest-first input.
    order
        .into_iter()
        .filter_map(|id| by_partner.remove(&id))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::message::MessageStatus;

    const ME: &str = "me";

    fn msg(id: &str, sender: &str, recipient: &str, read: bool, minute: u32) -> Message {
        Message {
            id: id.to_string(),
            sender_id: sender.to_string(),
            recipient_id: recipient.to_string(),
            content: format!("message {}", id),
            subject: None,
            match_id: None,
            status: if read { MessageStatus::Read } else { MessageStatus::Sent },
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap(),
            read_at: read.then(|| Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 30).unwrap()),
            sender: None,
            recipient: None,
        }
    }

    #[test]
    fn single_inbound_unread_message() {
        let conversations = aggregate_conversations(vec![msg("1", "a", ME, false, 0)], ME);

        assert_eq!(conversations.len(), 1);
        let conversation = &conversations[0];
        assert_eq!(conversation.partner_id, "a");
        assert_eq!(conversation.unread_count, 1);
        assert_eq!(conversation.last_message.id, "1");
        assert_eq!(conversation.messages.len(), 1);
    }

    #[test]
    fn unread_count_matches_definition() {
        // Newest first: two unread from a, one read from a, one sent by me to a,
        // and one unread from b.
        let messages = vec![
            msg("5", "b", ME, false, 5),
            msg("4", "a", ME, false, 4),
            msg("3", ME, "a", false, 3),
            msg("2", "a", ME, false, 2),
            msg("1", "a", ME, true, 1),
        ];

        let conversations = aggregate_conversations(messages, ME);
        assert_eq!(conversations.len(), 2);

        let b = conversations.iter().find(|c| c.partner_id == "b").unwrap();
        assert_eq!(b.unread_count, 1);

        let a = conversations.iter().find(|c| c.partner_id == "a").unwrap();
        // Outbound and already-read rows never count.
        assert_eq!(a.unread_count, 2);
        assert_eq!(a.messages.len(), 4);
    }

    #[test]
    fn last_message_is_first_seen_per_partner() {
        let messages = vec![
            msg("9", "a", ME, false, 9),
            msg("8", ME, "a", false, 8),
            msg("7", "a", ME, true, 7),
        ];

        let conversations = aggregate_conversations(messages, ME);
        assert_eq!(conversations[0].last_message.id, "9");
    }

    #[test]
    fn outbound_only_conversation_has_zero_unread() {
        let conversations = aggregate_conversations(vec![msg("1", ME, "a", false, 0)], ME);

        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].partner_id, "a");
        assert_eq!(conversations[0].unread_count, 0);
    }

    #[test]
    fn partner_order_follows_first_sight() {
        let messages = vec![
            msg("3", "c", ME, false, 3),
            msg("2", "a", ME, false, 2),
            msg("1", "b", ME, false, 1),
        ];

        let partners: Vec<_> = aggregate_conversations(messages, ME)
            .into_iter()
            .map(|c| c.partner_id)
            .collect();
        assert_eq!(partners, vec!["c", "a", "b"]);
    }

    #[test]
    fn missing_profile_join_degrades_to_none() {
        let conversations = aggregate_conversations(vec![msg("1", "a", ME, false, 0)], ME);
        assert!(conversations[0].partner.is_none());
    }

    #[test]
    fn empty_input_yields_no_conversations() {
        assert!(aggregate_conversations(Vec::new(), ME).is_empty());
    }
}
