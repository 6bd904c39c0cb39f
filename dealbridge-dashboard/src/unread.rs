//! Unread message counter.
//!
//! Holds the user's total-unread count in a reactive signal. Badge sinks
//! (the nav item, KPI cards) observe the signal; they are never mutated
//! directly by the refresh paths. Refresh happens once at start, on a fixed
//! interval as fallback, and immediately after live events.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dealbridge_messaging::{MessagingService, Signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// A location that displays the unread badge. `label` is `None` when the
/// badge should be hidden (zero unread).
pub trait BadgeSink: Send + Sync {
    fn update(&self, count: usize, label: Option<&str>);
}

/// Badge text: hidden at zero, capped display above 99.
pub fn format_badge(count: usize) -> Option<String> {
    match count {
        0 => None,
        c if c > 99 => Some("99+".to_string()),
        c => Some(c.to_string()),
    }
}

pub struct UnreadCounter {
    service: Arc<MessagingService>,
    count: Signal<usize>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UnreadCounter {
    pub fn new(service: Arc<MessagingService>) -> Self {
        Self {
            service,
            count: Signal::new(0),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The last successfully fetched total.
    pub fn count(&self) -> usize {
        self.count.get()
    }

    pub fn watch(&self) -> watch::Receiver<usize> {
        self.count.watch()
    }

    /// Attach a badge location. It immediately receives the current value and
    /// every change after that.
    pub fn add_sink(&self, sink: Arc<dyn BadgeSink>) {
        let handle = self.count.observe(move |count| {
            sink.update(*count, format_badge(*count).as_deref());
        });
        self.tasks.lock().unwrap().push(handle);
    }

    /// Re-query the backend total. A failed fetch logs and keeps the previous
    /// value on display; it never kills the caller's loop.
    pub async fn refresh(&self) {
        match self.service.unread_count().await {
            Ok(count) => {
                debug!(count, "unread count refreshed");
                self.count.set(count);
            }
            Err(e) => {
                warn!(error = %e, "unread refresh failed, keeping previous count");
            }
        }
    }

    /// Start the fallback poller: one refresh now, then one per interval.
    pub fn start(self: &Arc<Self>) {
        let counter = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                // First tick fires immediately: the startup refresh.
                ticker.tick().await;
                counter.refresh().await;
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    /// Stop the poller and detach all sinks. Idempotent.
    pub fn stop(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}
