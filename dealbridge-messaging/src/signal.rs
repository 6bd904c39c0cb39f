//! Minimal reactive value store.
//!
//! Components publish state (unread totals, conversation lists) through a
//! `Signal`; presentation sinks observe it instead of being mutated ad hoc
//! from every code path that changes the value.

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct Signal<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Store a new value and wake observers. Works with or without active
    /// observers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    pub fn watch(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Spawn an observer task: called once with the current value, then on
    /// every change. The returned handle aborts the observer.
    pub fn observe<F>(&self, mut f: F) -> JoinHandle<()>
    where
        F: FnMut(&T) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        tokio::spawn(async move {
            f(&rx.borrow_and_update().clone());
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                f(&value);
            }
        })
    }
}
