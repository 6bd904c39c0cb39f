//! Real-time messaging core for the Dealbridge marketplace.
//!
//! The backend (tables, auth, realtime push) is a third-party service
//! consumed through [`backend::BackendClient`]; the rendering layer is an
//! external collaborator behind [`surface::RenderSurface`]. Everything in
//! between lives here: conversation aggregation, the live-update listener,
//! the send flow.

pub mod backend;
pub mod error;
pub mod models;
pub mod realtime;
pub mod service;
pub mod signal;
pub mod surface;
pub mod view;

pub use backend::{
    BackendClient, ChangeEvent, ChannelSpec, Filter, MemoryBackend, RemoteBackend, RowChange,
    TableQuery,
};
pub use error::MessagingError;
pub use models::{Conversation, Message, MessageStatus, Profile};
pub use realtime::{LiveEvent, LiveUpdates};
pub use service::MessagingService;
pub use signal::Signal;
pub use surface::{MessageBubble, RenderSurface};
pub use view::ConversationView;
