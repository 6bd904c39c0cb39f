use thiserror::Error;

/// Errors produced by the messaging core.
///
/// Nothing here is fatal to the application: polling paths log and keep the
/// previous state, while user-action paths surface the message as a toast.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("backend request failed: {0}")]
    Backend(String),

    #[error("user is not authenticated")]
    NotAuthenticated,

    #[error("profile not found for user {0}")]
    ProfileNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to decode backend row: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("realtime channel unavailable: {0}")]
    Channel(String),
}

impl From<reqwest::Error> for MessagingError {
    fn from(err: reqwest::Error) -> Self {
        MessagingError::Backend(err.to_string())
    }
}
