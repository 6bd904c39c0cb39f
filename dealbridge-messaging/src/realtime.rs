//! Live update listener.
//!
//! Owns at most one realtime subscription, scoped to messages addressed to
//! the current user, and fans classified events out to observers over a
//! broadcast channel. Teardown is explicit and idempotent: after
//! `unsubscribe_all` returns, no further event reaches any observer.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{
    BackendClient, ChangeEvent, ChannelSpec, Filter, RowChange, SubscriptionHandle,
};
use crate::error::MessagingError;
use crate::models::Message;

const MESSAGES_TABLE: &str = "messages";
const EVENT_BUFFER: usize = 64;

/// A classified row change on the user's message stream.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// An inserted row: a message just arrived for the current user.
    NewMessage(Message),
    /// An updated row, typically the unread -> read transition.
    MessageUpdated(Message),
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    pump: JoinHandle<()>,
}

pub struct LiveUpdates {
    backend: Arc<dyn BackendClient>,
    events_tx: broadcast::Sender<LiveEvent>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl LiveUpdates {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            backend,
            events_tx,
            active: Mutex::new(None),
        }
    }

    /// Open the per-user subscription if none is live. Calling this again
    /// while subscribed is a no-op, so duplicate callback delivery cannot
    /// happen; after `unsubscribe_all` it opens a fresh channel.
    pub async fn ensure_subscribed(&self, profile_id: &str) -> Result<(), MessagingError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!("realtime subscription already live, keeping it");
            return Ok(());
        }

        let subscription = self
            .backend
            .subscribe(ChannelSpec::filtered(
                MESSAGES_TABLE,
                Filter::eq("recipient_id", profile_id),
            ))
            .await?;

        let handle = subscription.handle.clone();
        let events_tx = self.events_tx.clone();
        let mut events = subscription.events;

        let pump = tokio::spawn(async move {
            while let Some(change) = events.recv().await {
                if let Some(event) = classify(change) {
                    // No receivers is fine; observers may attach later.
                    let _ = events_tx.send(event);
                }
            }
            debug!("realtime pump finished");
        });

        *active = Some(ActiveSubscription { handle, pump });
        info!(profile_id, "subscribed to live message updates");
        Ok(())
    }

    pub async fn is_subscribed(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Observe classified events. Each receiver sees every event from the
    /// moment it subscribes.
    pub fn events(&self) -> broadcast::Receiver<LiveEvent> {
        self.events_tx.subscribe()
    }

    /// Tear down the subscription. Idempotent; once this returns, no further
    /// backend event is delivered to any observer.
    pub async fn unsubscribe_all(&self) {
        let mut active = self.active.lock().await;
        if let Some(subscription) = active.take() {
            subscription.handle.close();
            subscription.pump.abort();
            info!("unsubscribed from live message updates");
        }
    }
}

/// INSERT becomes a new-message event, UPDATE a read-state patch; DELETE and
/// undecodable rows are dropped with a log line, never an error.
fn classify(change: RowChange) -> Option<LiveEvent> {
    let event = change.event;
    let message: Message = match serde_json::from_value(change.new) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, ?event, "dropping undecodable live row");
            return None;
        }
    };

    match event {
        ChangeEvent::Insert => Some(LiveEvent::NewMessage(message)),
        ChangeEvent::Update => Some(LiveEvent::MessageUpdated(message)),
        ChangeEvent::Delete => None,
    }
}
