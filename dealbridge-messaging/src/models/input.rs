//! Input DTOs with garde validation for the messaging service.
//!
//! These structs validate caller-supplied data before any backend call is
//! made.

use garde::Validate;
use serde::Deserialize;

use crate::error::MessagingError;

/// Validation constants
const MAX_USER_ID_LENGTH: usize = 128;
const MAX_MESSAGE_LENGTH: usize = 10_000;
const MAX_SUBJECT_LENGTH: usize = 200;
const MAX_SEARCH_QUERY_LENGTH: usize = 200;

/// Custom validation rejecting whitespace-only content.
fn validate_not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        Err(garde::Error::new("Content cannot be blank"))
    } else {
        Ok(())
    }
}

/// Input for sending a message
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SendMessageInput {
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub recipient_id: String,
    #[garde(length(min = 1, max = MAX_MESSAGE_LENGTH), custom(validate_not_blank))]
    pub content: String,
    #[garde(inner(length(max = MAX_SUBJECT_LENGTH)))]
    pub subject: Option<String>,
    #[garde(inner(length(max = MAX_USER_ID_LENGTH)))]
    pub match_id: Option<String>,
}

/// Input for loading the conversation list
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct ConversationQueryInput {
    #[garde(range(min = 1, max = 1000))]
    pub limit: usize,
}

impl Default for ConversationQueryInput {
    fn default() -> Self {
        Self { limit: 20 }
    }
}

/// Input for loading one conversation's message history
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct MessagesQueryInput {
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub partner_id: String,
    #[garde(range(min = 1, max = 1000))]
    pub limit: usize,
}

impl MessagesQueryInput {
    pub fn new(partner_id: impl Into<String>) -> Self {
        Self {
            partner_id: partner_id.into(),
            limit: 50,
        }
    }
}

/// Input for searching message content
#[derive(Debug, Deserialize, Validate)]
#[garde(context(()))]
pub struct SearchInput {
    #[garde(length(min = 1, max = MAX_SEARCH_QUERY_LENGTH))]
    pub query: String,
    #[garde(range(min = 1, max = 1000))]
    pub limit: usize,
}

impl SearchInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 20,
        }
    }
}

/// Helper trait converting garde validation errors into the crate error type
pub trait ValidateExt {
    fn validate_input(&self) -> Result<(), MessagingError>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> Result<(), MessagingError> {
        self.validate()
            .map_err(|e| MessagingError::InvalidInput(e.to_string()))
    }
}
