//! In-process backend used by tests and the demo binary.
//!
//! Tables are JSON rows kept in insertion order; realtime channels fan row
//! changes out to subscribers through a registry of unbounded senders, with
//! closed channels swept on publish.

use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    row_matches, BackendClient, ChangeEvent, ChannelSpec, Direction, Filter, RowChange,
    Subscription, TableQuery,
};
use crate::error::MessagingError;
use crate::models::AuthUser;

pub struct MemoryBackend {
    tables: DashMap<String, Vec<Value>>,
    /// subscription id -> (spec, sender)
    subscribers: DashMap<String, (ChannelSpec, mpsc::UnboundedSender<RowChange>)>,
    auth: Mutex<Option<AuthUser>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            subscribers: DashMap::new(),
            auth: Mutex::new(None),
        }
    }

    /// Set the authenticated principal. `None` simulates a signed-out client.
    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.auth.lock().unwrap() = Some(AuthUser { id: user_id.into() });
    }

    pub fn sign_out(&self) {
        *self.auth.lock().unwrap() = None;
    }

    /// Number of live subscriptions, after sweeping closed ones.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.retain(|_, (_, tx)| !tx.is_closed());
        self.subscribers.len()
    }

    fn publish(&self, table: &str, change: RowChange) {
        // Sweep subscribers whose receiver side is gone, then deliver.
        self.subscribers.retain(|_, (_, tx)| !tx.is_closed());
        for entry in self.subscribers.iter() {
            let (spec, tx) = entry.value();
            if spec.table == table && spec.matches(&change.new) {
                let _ = tx.send(change.clone());
            }
        }
    }

    fn rows_matching(&self, table: &str, filters: &[Filter]) -> Vec<Value> {
        self.tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|f| row_matches(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendClient for MemoryBackend {
    async fn select(&self, query: TableQuery) -> Result<Vec<Value>, MessagingError> {
        let mut rows = self.rows_matching(&query.table, &query.filters);

        if let Some((column, direction)) = &query.order {
            rows.sort_by(|a, b| {
                let left = sort_key(a, column);
                let right = sort_key(b, column);
                match direction {
                    Direction::Ascending => left.cmp(&right),
                    Direction::Descending => right.cmp(&left),
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn count(&self, query: TableQuery) -> Result<usize, MessagingError> {
        Ok(self.rows_matching(&query.table, &query.filters).len())
    }

    async fn insert(&self, table: &str, mut row: Value) -> Result<Value, MessagingError> {
        if row.get("id").map_or(true, Value::is_null) {
            row["id"] = json!(uuid::Uuid::new_v4().to_string());
        }

        self.tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        debug!(table, id = %row["id"], "memory backend stored row");

        self.publish(
            table,
            RowChange {
                event: ChangeEvent::Insert,
                new: row.clone(),
                old: Value::Null,
            },
        );
        Ok(row)
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: Vec<Filter>,
    ) -> Result<Vec<Value>, MessagingError> {
        let patch_map = patch
            .as_object()
            .ok_or_else(|| MessagingError::Backend("update patch must be an object".to_string()))?
            .clone();

        let mut updated = Vec::new();
        if let Some(mut rows) = self.tables.get_mut(table) {
            for row in rows.iter_mut() {
                if filters.iter().all(|f| row_matches(row, f)) {
                    let old = row.clone();
                    if let Some(object) = row.as_object_mut() {
                        for (key, value) in &patch_map {
                            object.insert(key.clone(), value.clone());
                        }
                    }
                    updated.push((old, row.clone()));
                }
            }
        }

        let results: Vec<Value> = updated.iter().map(|(_, new)| new.clone()).collect();
        for (old, new) in updated {
            self.publish(
                table,
                RowChange {
                    event: ChangeEvent::Update,
                    new,
                    old,
                },
            );
        }
        Ok(results)
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<(), MessagingError> {
        if let Some(mut rows) = self.tables.get_mut(table) {
            rows.retain(|row| !filters.iter().all(|f| row_matches(row, f)));
        }
        Ok(())
    }

    async fn auth_user(&self) -> Result<Option<AuthUser>, MessagingError> {
        Ok(self.auth.lock().unwrap().clone())
    }

    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, MessagingError> {
        let id = uuid::Uuid::new_v4().to_string();
        let (subscription, tx, _shutdown) = Subscription::new(id.clone());
        self.subscribers.insert(id, (spec, tx));
        Ok(subscription)
    }
}

fn sort_key(row: &Value, column: &str) -> String {
    match row.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
