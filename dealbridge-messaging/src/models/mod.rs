pub mod conversation;
pub mod input;
pub mod message;
pub mod profile;

pub use conversation::{aggregate_conversations, Conversation};
pub use message::{Message, MessageStatus};
pub use profile::{AuthUser, Profile};
