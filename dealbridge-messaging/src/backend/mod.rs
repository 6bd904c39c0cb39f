//! Generic backend client interface.
//!
//! The messaging core consumes a vendor backend (relational tables, auth,
//! realtime push) through this trait. Rows cross the boundary as the vendor's
//! JSON representations, unchanged; the service layer deserializes them.

mod memory;
mod remote;

pub use memory::MemoryBackend;
pub use remote::{RemoteBackend, RemoteConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use crate::error::MessagingError;
use crate::models::AuthUser;

/// Row filter. Top-level filters on a query are conjoined.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// column = value
    Eq(String, String),
    /// column IS NULL
    IsNull(String),
    /// case-insensitive substring match on column
    Ilike(String, String),
    /// column IN (values)
    In(String, Vec<String>),
    /// disjunction of conjunction groups: (a AND b) OR (c AND d)
    Or(Vec<Vec<Filter>>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Filter::IsNull(column.into())
    }

    pub fn ilike(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Filter::Ilike(column.into(), needle.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Query builder for `select`/`count` against a named table.
#[derive(Debug, Clone)]
pub struct TableQuery {
    pub table: String,
    /// Column/embed clause, vendor syntax. `None` means all columns. Backends
    /// without join support ignore it; consumers must tolerate missing joins.
    pub select: Option<String>,
    pub filters: Vec<Filter>,
    pub order: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl TableQuery {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            select: None,
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn select_columns(mut self, clause: impl Into<String>) -> Self {
        self.select = Some(clause.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order = Some((column.into(), Direction::Ascending));
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some((column.into(), Direction::Descending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Kind of row change delivered on a realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

/// A realtime row-change payload, shaped like the vendor's wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    #[serde(rename = "eventType")]
    pub event: ChangeEvent,
    #[serde(default)]
    pub new: Value,
    #[serde(default)]
    pub old: Value,
}

/// What to watch on a realtime channel: one table, optionally narrowed by a
/// single equality filter (e.g. `recipient_id = eq.<user>`).
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub table: String,
    pub filter: Option<Filter>,
}

impl ChannelSpec {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: name.into(),
            filter: None,
        }
    }

    pub fn filtered(name: impl Into<String>, filter: Filter) -> Self {
        Self {
            table: name.into(),
            filter: Some(filter),
        }
    }

    /// True when a change row passes this spec's filter.
    pub fn matches(&self, row: &Value) -> bool {
        match &self.filter {
            Some(filter) => row_matches(row, filter),
            None => true,
        }
    }
}

/// Control handle for an open subscription, cloneable independently of the
/// event receiver so callers can tear the channel down from another task.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: String,
    shutdown: broadcast::Sender<()>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stop delivery. Safe to call more than once.
    pub fn close(&self) {
        let _ = self.shutdown.send(());
    }
}

/// An open realtime subscription: a control handle plus the event stream.
/// Dropping the receiver (or closing the handle) severs delivery.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<RowChange>,
}

impl Subscription {
    pub fn new(id: impl Into<String>) -> (Self, mpsc::UnboundedSender<RowChange>, broadcast::Receiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let subscription = Self {
            handle: SubscriptionHandle {
                id: id.into(),
                shutdown: shutdown_tx,
            },
            events: rx,
        };
        (subscription, tx, shutdown_rx)
    }
}

/// The vendor backend as the messaging core sees it.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn select(&self, query: TableQuery) -> Result<Vec<Value>, MessagingError>;

    async fn count(&self, query: TableQuery) -> Result<usize, MessagingError>;

    /// Insert one row, returning the stored representation.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, MessagingError>;

    /// Patch all rows matching the filters, returning the updated rows.
    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: Vec<Filter>,
    ) -> Result<Vec<Value>, MessagingError>;

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<(), MessagingError>;

    /// The authenticated user, or `None` when nobody is signed in.
    async fn auth_user(&self) -> Result<Option<AuthUser>, MessagingError>;

    /// Open a realtime channel delivering row changes matching the spec.
    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, MessagingError>;
}

/// Evaluate a filter against a JSON row. Used by the in-memory backend and by
/// channel specs; scalar comparisons go through the column's string form.
pub(crate) fn row_matches(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(column, expected) => column_text(row, column)
            .map(|v| v == *expected)
            .unwrap_or(false),
        Filter::IsNull(column) => match row.get(column) {
            None | Some(Value::Null) => true,
            Some(_) => false,
        },
        Filter::Ilike(column, needle) => column_text(row, column)
            .map(|v| v.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
        Filter::In(column, values) => column_text(row, column)
            .map(|v| values.contains(&v))
            .unwrap_or(false),
        Filter::Or(groups) => groups
            .iter()
            .any(|group| group.iter().all(|f| row_matches(row, f))),
    }
}

fn column_text(row: &Value, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
