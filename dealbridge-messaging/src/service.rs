//! Messaging operations against the backend: sending, conversation loading,
//! read transitions, unread totals, search.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::backend::{BackendClient, Filter, TableQuery};
use crate::error::MessagingError;
use crate::models::input::{
    ConversationQueryInput, MessagesQueryInput, SearchInput, SendMessageInput, ValidateExt,
};
use crate::models::{aggregate_conversations, Conversation, Message, Profile};

const MESSAGES_TABLE: &str = "messages";
const PROFILES_TABLE: &str = "profiles";

/// Embed clause joining sender and recipient profile refs onto message rows.
const MESSAGE_WITH_PROFILES: &str = "*, \
     sender:profiles!sender_id(id,first_name,last_name,avatar_url,company), \
     recipient:profiles!recipient_id(id,first_name,last_name,avatar_url,company)";

/// The messaging core service. One instance per signed-in session,
/// constructed at bootstrap and injected into the components that need it.
pub struct MessagingService {
    backend: Arc<dyn BackendClient>,
    /// The current user's profile id, resolved once by `init`.
    me: OnceLock<String>,
}

impl MessagingService {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self {
            backend,
            me: OnceLock::new(),
        }
    }

    pub fn backend(&self) -> Arc<dyn BackendClient> {
        self.backend.clone()
    }

    /// Resolve the signed-in user's profile and remember its id. Safe to call
    /// again; the first successful resolution wins.
    pub async fn init(&self) -> Result<Profile, MessagingError> {
        let user = self
            .backend
            .auth_user()
            .await?
            .ok_or(MessagingError::NotAuthenticated)?;

        let profile = self
            .profile(&user.id)
            .await?
            .ok_or_else(|| MessagingError::ProfileNotFound(user.id.clone()))?;

        let _ = self.me.set(profile.id.clone());
        info!(profile_id = %profile.id, "messaging service initialized");
        Ok(profile)
    }

    /// The current user's profile id; errors until `init` has succeeded.
    pub fn profile_id(&self) -> Result<&str, MessagingError> {
        self.me
            .get()
            .map(String::as_str)
            .ok_or(MessagingError::NotAuthenticated)
    }

    /// Fetch a profile by auth user id. Missing rows are `None`, not errors.
    pub async fn profile(&self, user_id: &str) -> Result<Option<Profile>, MessagingError> {
        let rows = self
            .backend
            .select(
                TableQuery::table(PROFILES_TABLE)
                    .select_columns("id,first_name,last_name,avatar_url,company")
                    .filter(Filter::eq("user_id", user_id))
                    .limit(1),
            )
            .await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Insert a new message addressed to `recipient_id`, returning the stored
    /// row. Input is validated before any backend call is made.
    pub async fn send_message(&self, input: SendMessageInput) -> Result<Message, MessagingError> {
        input.validate_input()?;
        let me = self.profile_id()?;

        let row = json!({
            "sender_id": me,
            "recipient_id": input.recipient_id,
            "content": input.content,
            "subject": input.subject,
            "match_id": input.match_id,
            "status": "sent",
            "created_at": Utc::now(),
        });

        let stored = self.backend.insert(MESSAGES_TABLE, row).await?;
        let message: Message = serde_json::from_value(stored)?;
        info!(message_id = %message.id, recipient = %message.recipient_id, "message sent");
        Ok(message)
    }

    /// Load the newest messages involving the current user and group them
    /// into per-partner conversations. Unread counts are recomputed from the
    /// rows on every call; nothing is cached between loads.
    pub async fn conversations(
        &self,
        input: ConversationQueryInput,
    ) -> Result<Vec<Conversation>, MessagingError> {
        input.validate_input()?;
        let me = self.profile_id()?.to_string();

        let rows = self
            .backend
            .select(
                TableQuery::table(MESSAGES_TABLE)
                    .select_columns(MESSAGE_WITH_PROFILES)
                    .filter(Filter::Or(vec![
                        vec![Filter::eq("sender_id", &me)],
                        vec![Filter::eq("recipient_id", &me)],
                    ]))
                    .order_desc("created_at")
                    .limit(input.limit),
            )
            .await?;

        let messages = decode_messages(rows);
        Ok(aggregate_conversations(messages, &me))
    }

    /// Load one conversation's history, oldest first.
    pub async fn conversation_messages(
        &self,
        input: MessagesQueryInput,
    ) -> Result<Vec<Message>, MessagingError> {
        input.validate_input()?;
        let me = self.profile_id()?.to_string();
        let partner = input.partner_id;

        let rows = self
            .backend
            .select(
                TableQuery::table(MESSAGES_TABLE)
                    .select_columns(MESSAGE_WITH_PROFILES)
                    .filter(Filter::Or(vec![
                        vec![
                            Filter::eq("sender_id", &me),
                            Filter::eq("recipient_id", &partner),
                        ],
                        vec![
                            Filter::eq("sender_id", &partner),
                            Filter::eq("recipient_id", &me),
                        ],
                    ]))
                    .order_asc("created_at")
                    .limit(input.limit),
            )
            .await?;

        Ok(decode_messages(rows))
    }

    /// Mark a single message read.
    pub async fn mark_message_read(&self, message_id: &str) -> Result<(), MessagingError> {
        self.backend
            .update(
                MESSAGES_TABLE,
                read_patch(),
                vec![Filter::eq("id", message_id)],
            )
            .await?;
        Ok(())
    }

    /// Mark every unread message from `partner_id` to the current user as
    /// read. Idempotent: the null-read_at filter means re-marking an already
    /// read conversation patches nothing.
    pub async fn mark_conversation_read(&self, partner_id: &str) -> Result<(), MessagingError> {
        let me = self.profile_id()?;

        let updated = self
            .backend
            .update(
                MESSAGES_TABLE,
                read_patch(),
                vec![
                    Filter::eq("sender_id", partner_id),
                    Filter::eq("recipient_id", me),
                    Filter::is_null("read_at"),
                ],
            )
            .await?;
        debug!(partner = %partner_id, rows = updated.len(), "conversation marked read");
        Ok(())
    }

    /// Total unread messages for the current user. A signed-out session
    /// reports zero rather than failing.
    pub async fn unread_count(&self) -> Result<usize, MessagingError> {
        let me = match self.profile_id() {
            Ok(me) => me,
            Err(MessagingError::NotAuthenticated) => return Ok(0),
            Err(e) => return Err(e),
        };

        self.backend
            .count(
                TableQuery::table(MESSAGES_TABLE)
                    .filter(Filter::eq("recipient_id", me))
                    .filter(Filter::is_null("read_at")),
            )
            .await
    }

    /// Case-insensitive content search over the user's messages, newest
    /// first.
    pub async fn search_messages(&self, input: SearchInput) -> Result<Vec<Message>, MessagingError> {
        input.validate_input()?;
        let me = self.profile_id()?.to_string();

        let rows = self
            .backend
            .select(
                TableQuery::table(MESSAGES_TABLE)
                    .select_columns(MESSAGE_WITH_PROFILES)
                    .filter(Filter::Or(vec![
                        vec![Filter::eq("sender_id", &me)],
                        vec![Filter::eq("recipient_id", &me)],
                    ]))
                    .filter(Filter::ilike("content", input.query))
                    .order_desc("created_at")
                    .limit(input.limit),
            )
            .await?;

        Ok(decode_messages(rows))
    }
}

fn read_patch() -> Value {
    json!({
        "read_at": Utc::now(),
        "status": "read",
    })
}

/// Decode backend rows, dropping any that fail to parse. A malformed row is
/// logged and skipped so one bad record cannot blank the whole view.
fn decode_messages(rows: Vec<Value>) -> Vec<Message> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<Message>(row) {
            Ok(message) => Some(message),
            Err(e) => {
                error!(error = %e, "skipping undecodable message row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    async fn service_for(user: &str) -> (Arc<MemoryBackend>, MessagingService) {
        let backend = Arc::new(MemoryBackend::new());
        backend.sign_in(format!("auth-{}", user));
        backend
            .insert(
                PROFILES_TABLE,
                json!({
                    "id": user,
                    "user_id": format!("auth-{}", user),
                    "first_name": "Test",
                    "last_name": "User",
                    "avatar_url": null,
                    "company": "Dealbridge",
                }),
            )
            .await
            .unwrap();

        let service = MessagingService::new(backend.clone());
        service.init().await.unwrap();
        (backend, service)
    }

    fn send(recipient: &str, content: &str) -> SendMessageInput {
        SendMessageInput {
            recipient_id: recipient.to_string(),
            content: content.to_string(),
            subject: None,
            match_id: None,
        }
    }

    async fn seed_inbound(backend: &MemoryBackend, id: &str, from: &str, to: &str, at: &str) {
        backend
            .insert(
                MESSAGES_TABLE,
                json!({
                    "id": id,
                    "sender_id": from,
                    "recipient_id": to,
                    "content": format!("message {}", id),
                    "subject": null,
                    "match_id": null,
                    "status": "sent",
                    "created_at": at,
                    "read_at": null,
                }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn init_fails_without_auth() {
        let backend = Arc::new(MemoryBackend::new());
        let service = MessagingService::new(backend);
        assert!(matches!(
            service.init().await,
            Err(MessagingError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn init_fails_without_profile_row() {
        let backend = Arc::new(MemoryBackend::new());
        backend.sign_in("auth-ghost");
        let service = MessagingService::new(backend);
        assert!(matches!(
            service.init().await,
            Err(MessagingError::ProfileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn send_message_stores_a_sent_row() {
        let (_backend, service) = service_for("me").await;

        let message = service.send_message(send("partner", "hello there")).await.unwrap();
        assert_eq!(message.sender_id, "me");
        assert_eq!(message.recipient_id, "partner");
        assert_eq!(message.status, crate::models::MessageStatus::Sent);
        assert!(message.read_at.is_none());
        assert!(!message.id.is_empty());
    }

    #[tokio::test]
    async fn blank_send_is_rejected_before_any_backend_call() {
        let (backend, service) = service_for("me").await;

        let result = service.send_message(send("partner", "   ")).await;
        assert!(matches!(result, Err(MessagingError::InvalidInput(_))));

        let rows = backend
            .select(TableQuery::table(MESSAGES_TABLE))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn conversations_group_and_count_unread() {
        let (backend, service) = service_for("me").await;
        seed_inbound(&backend, "m1", "alice", "me", "2025-06-01T10:00:00Z").await;
        seed_inbound(&backend, "m2", "alice", "me", "2025-06-01T11:00:00Z").await;
        seed_inbound(&backend, "m3", "bob", "me", "2025-06-01T12:00:00Z").await;
        seed_inbound(&backend, "m4", "me", "alice", "2025-06-01T13:00:00Z").await;

        let conversations = service
            .conversations(ConversationQueryInput::default())
            .await
            .unwrap();

        assert_eq!(conversations.len(), 2);
        // Newest-first input: alice's last message is the one I sent.
        assert_eq!(conversations[0].partner_id, "alice");
        assert_eq!(conversations[0].last_message.id, "m4");
        assert_eq!(conversations[0].unread_count, 2);
        assert_eq!(conversations[1].partner_id, "bob");
        assert_eq!(conversations[1].unread_count, 1);
    }

    #[tokio::test]
    async fn conversation_messages_come_back_oldest_first() {
        let (backend, service) = service_for("me").await;
        seed_inbound(&backend, "m2", "alice", "me", "2025-06-01T11:00:00Z").await;
        seed_inbound(&backend, "m1", "me", "alice", "2025-06-01T10:00:00Z").await;
        seed_inbound(&backend, "other", "bob", "me", "2025-06-01T09:00:00Z").await;

        let messages = service
            .conversation_messages(MessagesQueryInput::new("alice"))
            .await
            .unwrap();

        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn mark_conversation_read_zeroes_one_partner_only() {
        let (backend, service) = service_for("me").await;
        seed_inbound(&backend, "m1", "alice", "me", "2025-06-01T10:00:00Z").await;
        seed_inbound(&backend, "m2", "alice", "me", "2025-06-01T11:00:00Z").await;
        seed_inbound(&backend, "m3", "bob", "me", "2025-06-01T12:00:00Z").await;

        assert_eq!(service.unread_count().await.unwrap(), 3);

        service.mark_conversation_read("alice").await.unwrap();

        let conversations = service
            .conversations(ConversationQueryInput::default())
            .await
            .unwrap();
        let alice = conversations.iter().find(|c| c.partner_id == "alice").unwrap();
        let bob = conversations.iter().find(|c| c.partner_id == "bob").unwrap();
        assert_eq!(alice.unread_count, 0);
        assert_eq!(bob.unread_count, 1);
        assert_eq!(service.unread_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_conversation_read_is_idempotent() {
        let (backend, service) = service_for("me").await;
        seed_inbound(&backend, "m1", "alice", "me", "2025-06-01T10:00:00Z").await;

        service.mark_conversation_read("alice").await.unwrap();
        service.mark_conversation_read("alice").await.unwrap();
        assert_eq!(service.unread_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unread_count_is_zero_when_signed_out() {
        let backend = Arc::new(MemoryBackend::new());
        let service = MessagingService::new(backend);
        assert_eq!(service.unread_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_matches_content_case_insensitively() {
        let (backend, service) = service_for("me").await;
        seed_inbound(&backend, "m1", "alice", "me", "2025-06-01T10:00:00Z").await;
        backend
            .insert(
                MESSAGES_TABLE,
                json!({
                    "id": "m2",
                    "sender_id": "alice",
                    "recipient_id": "me",
                    "content": "Interested in the Bakery listing",
                    "subject": null,
                    "match_id": null,
                    "status": "sent",
                    "created_at": "2025-06-01T11:00:00Z",
                    "read_at": null,
                }),
            )
            .await
            .unwrap();

        let hits = service.search_messages(SearchInput::new("bakery")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m2");
    }
}
