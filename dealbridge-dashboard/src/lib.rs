//! Dashboard shell integration for Dealbridge real-time messaging.
//!
//! Wires the messaging core into dashboard widgets: the unread badge
//! locations, new-message notifications, and the conversation view. All
//! services are constructed once at bootstrap and injected; nothing global.

pub mod unread;

pub use unread::{format_badge, BadgeSink, UnreadCounter};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use dealbridge_messaging::{ConversationView, LiveEvent, LiveUpdates, MessagingService, Profile};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const NOTIFICATION_PREVIEW_CHARS: usize = 100;

/// Receives new-message notifications (system toasts in the original
/// deployment).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Notification body: content truncated to a preview length.
pub fn message_preview(content: &str) -> String {
    if content.chars().count() <= NOTIFICATION_PREVIEW_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(NOTIFICATION_PREVIEW_CHARS).collect();
        format!("{}...", cut)
    }
}

type UpdateCallback = Box<dyn Fn(&LiveEvent) + Send + Sync>;

/// The messaging surface the dashboard shell talks to.
///
/// `init` resolves the user, opens the live subscription and starts unread
/// monitoring; `destroy` tears all of it down and is safe to call twice.
pub struct DashboardMessages {
    service: Arc<MessagingService>,
    live: Arc<LiveUpdates>,
    unread: Arc<UnreadCounter>,
    view: Mutex<Option<Arc<ConversationView>>>,
    notifications: Mutex<Option<Arc<dyn NotificationSink>>>,
    callbacks: Mutex<Vec<UpdateCallback>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl DashboardMessages {
    pub fn new(service: Arc<MessagingService>) -> Self {
        let live = Arc::new(LiveUpdates::new(service.backend()));
        let unread = Arc::new(UnreadCounter::new(service.clone()));
        Self {
            service,
            live,
            unread,
            view: Mutex::new(None),
            notifications: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
            dispatch: Mutex::new(None),
        }
    }

    pub fn service(&self) -> Arc<MessagingService> {
        self.service.clone()
    }

    pub fn unread(&self) -> Arc<UnreadCounter> {
        self.unread.clone()
    }

    /// Attach the conversation view driven by live events.
    pub fn set_view(&self, view: Arc<ConversationView>) {
        *self.view.lock().unwrap() = Some(view);
    }

    /// Attach the notification sink for new-message alerts.
    pub fn set_notifications(&self, sink: Arc<dyn NotificationSink>) {
        *self.notifications.lock().unwrap() = Some(sink);
    }

    /// Register an observer for every live event. Observer panics are
    /// contained; they never stop the dispatch loop.
    pub fn on_message_update<F>(&self, callback: F)
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.callbacks.lock().unwrap().push(Box::new(callback));
    }

    /// Current unread total as last fetched.
    pub fn unread_count(&self) -> usize {
        self.unread.count()
    }

    /// Initialize messaging for the signed-in user: resolve the profile,
    /// open the live subscription, start unread monitoring and the event
    /// dispatch loop.
    pub async fn init(self: &Arc<Self>) -> Result<Profile, dealbridge_messaging::MessagingError> {
        let profile = self.service.init().await?;
        self.live.ensure_subscribed(&profile.id).await?;
        self.unread.start();

        let mut dispatch = self.dispatch.lock().unwrap();
        if dispatch.is_none() {
            *dispatch = Some(self.spawn_dispatch());
        }

        info!(profile_id = %profile.id, "dashboard messaging initialized");
        Ok(profile)
    }

    fn spawn_dispatch(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        let mut events = self.live.events();
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "live event dispatch lagged, refreshing count");
                        this.unread.refresh().await;
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                this.handle_event(&event).await;
            }
        })
    }

    async fn handle_event(&self, event: &LiveEvent) {
        // Any change to the user's messages can move the unread total.
        self.unread.refresh().await;

        if let LiveEvent::NewMessage(message) = event {
            if let Some(sink) = self.notifications.lock().unwrap().clone() {
                sink.notify("New Message", &message_preview(&message.content));
            }
        }

        let view = self.view.lock().unwrap().clone();
        if let Some(view) = view {
            view.handle_live_event(event).await;
        }

        let callbacks = self.callbacks.lock().unwrap();
        for callback in callbacks.iter() {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!("message update callback panicked");
            }
        }
    }

    /// Tear everything down: live subscription, dispatch loop, unread
    /// poller. Idempotent; callers are expected to invoke this on
    /// navigation away.
    pub async fn destroy(&self) {
        self.live.unsubscribe_all().await;
        if let Some(task) = self.dispatch.lock().unwrap().take() {
            task.abort();
        }
        self.unread.stop();
        info!("dashboard messaging destroyed");
    }
}
