//! Vendor-shaped remote backend: a PostgREST-style HTTP surface for table
//! access plus a persistent realtime websocket for row-change push.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsFrame};
use tracing::{debug, error, info, warn};

use async_trait::async_trait;

use super::{
    BackendClient, ChannelSpec, Direction, Filter, RowChange, Subscription, TableQuery,
};
use crate::error::MessagingError;
use crate::models::AuthUser;

/// Backend URL: checked at compile time via env!, falls back to runtime env
/// var, then default
const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";
const RECONNECT_DELAY_SECS: u64 = 3;

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub realtime_url: String,
    pub api_key: String,
    pub access_token: Option<String>,
}

impl RemoteConfig {
    /// Priority: build-time env -> runtime env -> default
    pub fn from_env() -> Self {
        let build_time_url = option_env!("DEALBRIDGE_BACKEND_URL");
        let runtime_url = std::env::var("DEALBRIDGE_BACKEND_URL").ok();

        let base_url = build_time_url
            .map(String::from)
            .or(runtime_url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let realtime_url = std::env::var("DEALBRIDGE_REALTIME_URL").unwrap_or_else(|_| {
            base_url
                .replacen("http://", "ws://", 1)
                .replacen("https://", "wss://", 1)
                + "/realtime/v1"
        });

        info!(url = %base_url, realtime = %realtime_url, "Using backend URLs");

        Self {
            base_url,
            realtime_url,
            api_key: std::env::var("DEALBRIDGE_API_KEY").unwrap_or_default(),
            access_token: std::env::var("DEALBRIDGE_ACCESS_TOKEN").ok(),
        }
    }
}

pub struct RemoteBackend {
    config: RemoteConfig,
    http: reqwest::Client,
}

impl RemoteBackend {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(RemoteConfig::from_env())
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, table)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("apikey", &self.config.api_key);
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Render a filter as PostgREST query parameters.
fn filter_params(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.clone(), format!("eq.{}", value)),
        Filter::IsNull(column) => (column.clone(), "is.null".to_string()),
        Filter::Ilike(column, needle) => (column.clone(), format!("ilike.*{}*", needle)),
        Filter::In(column, values) => (column.clone(), format!("in.({})", values.join(","))),
        Filter::Or(groups) => {
            let rendered: Vec<String> = groups
                .iter()
                .map(|group| {
                    let terms: Vec<String> = group.iter().map(filter_term).collect();
                    if terms.len() == 1 {
                        terms.into_iter().next().unwrap()
                    } else {
                        format!("and({})", terms.join(","))
                    }
                })
                .collect();
            ("or".to_string(), format!("({})", rendered.join(",")))
        }
    }
}

/// Render a filter as a PostgREST boolean-logic term (used inside or=()).
fn filter_term(filter: &Filter) -> String {
    match filter {
        Filter::Eq(column, value) => format!("{}.eq.{}", column, value),
        Filter::IsNull(column) => format!("{}.is.null", column),
        Filter::Ilike(column, needle) => format!("{}.ilike.*{}*", column, needle),
        Filter::In(column, values) => format!("{}.in.({})", column, values.join(",")),
        Filter::Or(groups) => {
            let rendered: Vec<String> = groups
                .iter()
                .map(|group| {
                    let terms: Vec<String> = group.iter().map(filter_term).collect();
                    format!("and({})", terms.join(","))
                })
                .collect();
            format!("or({})", rendered.join(","))
        }
    }
}

fn query_params(query: &TableQuery) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = query.filters.iter().map(filter_params).collect();
    if let Some(select) = &query.select {
        params.push(("select".to_string(), select.clone()));
    }
    if let Some((column, direction)) = &query.order {
        let dir = match direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        params.push(("order".to_string(), format!("{}.{}", column, dir)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

#[async_trait]
impl BackendClient for RemoteBackend {
    async fn select(&self, query: TableQuery) -> Result<Vec<Value>, MessagingError> {
        let response = self
            .authorize(self.http.get(self.rest_url(&query.table)))
            .query(&query_params(&query))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn count(&self, query: TableQuery) -> Result<usize, MessagingError> {
        let response = self
            .authorize(self.http.get(self.rest_url(&query.table)))
            .query(&query_params(&query))
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .send()
            .await?
            .error_for_status()?;

        // Content-Range: 0-0/42; the total follows the slash.
        let total = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit('/').next())
            .and_then(|v| v.parse::<usize>().ok());

        total.ok_or_else(|| MessagingError::Backend("missing count in content-range".to_string()))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, MessagingError> {
        let response = self
            .authorize(self.http.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?
            .error_for_status()?;

        let mut rows: Vec<Value> = response.json().await?;
        rows.pop()
            .ok_or_else(|| MessagingError::Backend("insert returned no representation".to_string()))
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: Vec<Filter>,
    ) -> Result<Vec<Value>, MessagingError> {
        let params: Vec<(String, String)> = filters.iter().map(filter_params).collect();
        let response = self
            .authorize(self.http.patch(self.rest_url(table)))
            .query(&params)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<(), MessagingError> {
        let params: Vec<(String, String)> = filters.iter().map(filter_params).collect();
        self.authorize(self.http.delete(self.rest_url(table)))
            .query(&params)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn auth_user(&self) -> Result<Option<AuthUser>, MessagingError> {
        if self.config.access_token.is_none() {
            return Ok(None);
        }

        let response = self
            .authorize(
                self.http
                    .get(format!("{}/auth/v1/user", self.config.base_url)),
            )
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let user: AuthUser = response.error_for_status()?.json().await?;
        Ok(Some(user))
    }

    async fn subscribe(&self, spec: ChannelSpec) -> Result<Subscription, MessagingError> {
        let channel_filter = match &spec.filter {
            Some(Filter::Eq(column, value)) => Some(format!("{}=eq.{}", column, value)),
            Some(other) => {
                return Err(MessagingError::Channel(format!(
                    "unsupported channel filter: {:?}",
                    other
                )))
            }
            None => None,
        };

        let id = uuid::Uuid::new_v4().to_string();
        let (subscription, tx, mut shutdown_rx) = Subscription::new(id.clone());
        let url = self.config.realtime_url.clone();
        let topic = spec.table.clone();
        let spec = spec.clone();

        tokio::spawn(async move {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!(%topic, "Shutdown signal received, stopping reconnection");
                    break;
                }

                info!(url = %url, %topic, "Connecting to realtime channel");

                match connect_async(&url).await {
                    Ok((ws_stream, _)) => {
                        let (mut ws_write, mut ws_read) = ws_stream.split();

                        let join = RealtimeFrame::Subscribe {
                            topic: topic.clone(),
                            filter: channel_filter.clone(),
                        };
                        let join_json = match serde_json::to_string(&join) {
                            Ok(json) => json,
                            Err(e) => {
                                error!(error = %e, "Failed to serialize subscribe frame");
                                break;
                            }
                        };
                        if ws_write.send(WsFrame::Text(join_json.into())).await.is_err() {
                            error!("Failed to send subscribe frame");
                            tokio::time::sleep(std::time::Duration::from_secs(
                                RECONNECT_DELAY_SECS,
                            ))
                            .await;
                            continue;
                        }

                        let mut reconnect = true;
                        loop {
                            tokio::select! {
                                _ = shutdown_rx.recv() => {
                                    info!(%topic, "Closing realtime channel");
                                    let _ = ws_write.send(WsFrame::Close(None)).await;
                                    reconnect = false;
                                    break;
                                }
                                frame = ws_read.next() => {
                                    match frame {
                                        Some(Ok(WsFrame::Text(text))) => {
                                            debug!(preview = %&text[..100.min(text.len())], "Realtime frame");
                                            match serde_json::from_str::<RealtimeFrame>(&text) {
                                                Ok(RealtimeFrame::Change { topic: t, payload })
                                                    if t == topic && spec.matches(&payload.new) =>
                                                {
                                                    if tx.send(payload).is_err() {
                                                        // Receiver gone: nobody is listening anymore.
                                                        reconnect = false;
                                                        break;
                                                    }
                                                }
                                                Ok(RealtimeFrame::Error { message }) => {
                                                    warn!(%message, "Realtime channel error frame");
                                                }
                                                Ok(_) => {}
                                                Err(e) => {
                                                    warn!(error = %e, "Unparseable realtime frame");
                                                }
                                            }
                                        }
                                        Some(Ok(WsFrame::Close(_))) | None => {
                                            info!(%topic, "Realtime server closed connection");
                                            break;
                                        }
                                        Some(Err(e)) => {
                                            error!(error = %e, "Realtime websocket error");
                                            break;
                                        }
                                        _ => {}
                                    }
                                }
                            }
                        }

                        if !reconnect {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, url = %url, "Failed to connect to realtime channel");
                    }
                }

                debug!("Reconnecting in {} seconds", RECONNECT_DELAY_SECS);
                tokio::time::sleep(std::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
            }
        });

        Ok(subscription)
    }
}

/// Frames exchanged with the realtime endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum RealtimeFrame {
    #[serde(rename = "subscribe")]
    Subscribe {
        topic: String,
        filter: Option<String>,
    },
    #[serde(rename = "ack")]
    Ack { topic: String },
    #[serde(rename = "change")]
    Change { topic: String, payload: RowChange },
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "error")]
    Error { message: String },
}
