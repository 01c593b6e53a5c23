//! # Remote Transport
//!
//! The two capabilities the sync engine needs from the remote service,
//! and a REST implementation of them.
//!
//! ## Capability Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       RemoteTransport                                   │
//! │                                                                         │
//! │  apply_operations(batch)                                               │
//! │  ───────────────────────                                               │
//! │  • Batch is in device_seq order                                        │
//! │  • Remote de-duplicates on entry id, so a retry after an ambiguous     │
//! │    failure is safe                                                     │
//! │                                                                         │
//! │  fetch_changed_since(table, watermark, excluding_device)               │
//! │  ──────────────────────────────────────────────────────                │
//! │  • All rows changed after the watermark, however many pages            │
//! │  • Rows written by excluding_device are left out                       │
//! │  • Re-delivery is fine: merging is idempotent                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows come back as raw JSON so the merge engine can decode and apply
//! each one independently.
//!
//! ## REST Mapping
//! ```text
//! POST {url}/rest/v1/rpc/apply_sync_ops          body: {"ops": [WireOp, ...]}
//! GET  {url}/rest/v1/{table}?select=*
//!          &{updated_at|created_at}=gt.{watermark}
//!          &device_id=neq.{device}
//!          &order={col}.asc,id.asc&limit={PAGE_SIZE}&offset={n}
//! headers: apikey: {key}, Authorization: Bearer {key}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use ts_rs::TS;
use url::Url;

use sapos_core::{OpType, OperationLogEntry, SyncTable};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Longest remote error body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// Rows requested per page. Matches the default row cap of a PostgREST
/// deployment, so a full page means there may be more.
pub const PAGE_SIZE: usize = 1000;

// =============================================================================
// Transport Trait
// =============================================================================

/// What the orchestrator requires from the remote service.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Submits pending entries for server-side application.
    async fn apply_operations(&self, batch: &[OperationLogEntry]) -> SyncResult<()>;

    /// Returns every row of `table` changed after `watermark` that did
    /// not originate from `excluding_device`.
    async fn fetch_changed_since(
        &self,
        table: SyncTable,
        watermark: DateTime<Utc>,
        excluding_device: &str,
    ) -> SyncResult<Vec<Value>>;
}

// =============================================================================
// Wire Types
// =============================================================================

/// One operation as the remote receives it. Local bookkeeping (`synced`,
/// `synced_at`) stays on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WireOp {
    pub id: String,
    pub op_type: OpType,
    pub table_name: SyncTable,
    pub record_id: String,
    #[ts(type = "unknown")]
    pub payload: Value,
    pub device_id: String,
    pub device_seq: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl From<&OperationLogEntry> for WireOp {
    fn from(entry: &OperationLogEntry) -> Self {
        WireOp {
            id: entry.id.clone(),
            op_type: entry.op_type,
            table_name: entry.table_name,
            record_id: entry.record_id.clone(),
            payload: entry.payload.clone(),
            device_id: entry.device_id.clone(),
            device_seq: entry.device_seq,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApplyOpsRequest {
    ops: Vec<WireOp>,
}

/// Column a table's watermark filter applies to. Items are mutable, so
/// they are filtered on their last change rather than their creation.
pub fn watermark_column(table: SyncTable) -> &'static str {
    match table {
        SyncTable::Items => "updated_at",
        SyncTable::Sales | SyncTable::StockMovements => "created_at",
    }
}

// =============================================================================
// REST Transport
// =============================================================================

/// [`RemoteTransport`] over a PostgREST-style HTTP API.
#[derive(Debug, Clone)]
pub struct RestTransport {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl RestTransport {
    /// Creates a transport for `base_url`. `timeout` bounds each request.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> SyncResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "Remote URL must start with http:// or https://, got: {}",
                base_url
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(RestTransport {
            client,
            base_url,
            api_key,
        })
    }

    /// Creates a transport from the `[remote]` config section.
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let url = config
            .remote_url()
            .ok_or_else(|| SyncError::InvalidConfig("remote.url is required".into()))?;

        Self::new(url, config.remote.api_key.clone(), config.request_timeout())
    }

    /// The base URL, always ending in `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the batched-apply RPC.
    pub fn rpc_url(&self) -> SyncResult<Url> {
        Ok(self.base_url.join("rest/v1/rpc/apply_sync_ops")?)
    }

    /// URL of one page of the filtered read for one table.
    ///
    /// Rows are ordered by the watermark column with `id` as tie-breaker
    /// so consecutive offsets never overlap or skip.
    pub fn table_url(
        &self,
        table: SyncTable,
        watermark: DateTime<Utc>,
        excluding_device: &str,
        offset: usize,
    ) -> SyncResult<Url> {
        let column = watermark_column(table);
        let mut url = self.base_url.join(&format!("rest/v1/{}", table.as_str()))?;

        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair(
                column,
                &format!("gt.{}", watermark.to_rfc3339_opts(SecondsFormat::Micros, true)),
            )
            .append_pair("device_id", &format!("neq.{}", excluding_device))
            .append_pair("order", &format!("{}.asc,id.asc", column))
            .append_pair("limit", &PAGE_SIZE.to_string())
            .append_pair("offset", &offset.to_string());

        Ok(url)
    }

    /// Returns `Ok` if the remote answered at all, whatever the status.
    pub async fn ping(&self) -> SyncResult<()> {
        let url = self.base_url.join("rest/v1/")?;
        let response = self.authorize(self.client.get(url)).send().await?;
        debug!(status = response.status().as_u16(), "Remote reachable");
        Ok(())
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteTransport for RestTransport {
    async fn apply_operations(&self, batch: &[OperationLogEntry]) -> SyncResult<()> {
        let body = ApplyOpsRequest {
            ops: batch.iter().map(WireOp::from).collect(),
        };

        let response = self
            .authorize(self.client.post(self.rpc_url()?))
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await?;

        debug!(count = batch.len(), "Remote applied operations");
        Ok(())
    }

    async fn fetch_changed_since(
        &self,
        table: SyncTable,
        watermark: DateTime<Utc>,
        excluding_device: &str,
    ) -> SyncResult<Vec<Value>> {
        let mut rows = Vec::new();

        loop {
            let url = self.table_url(table, watermark, excluding_device, rows.len())?;
            let response = self.authorize(self.client.get(url)).send().await?;
            let page: Vec<Value> = ensure_success(response).await?.json().await?;

            let page_len = page.len();
            rows.extend(page);
            debug!(%table, page = page_len, fetched = rows.len(), "Fetched page of remote changes");

            if page_len < PAGE_SIZE {
                break;
            }
        }

        debug!(%table, count = rows.len(), "Fetched remote changes");
        Ok(rows)
    }
}

/// Turns a non-2xx answer into [`SyncError::RemoteRejected`].
async fn ensure_success(response: Response) -> SyncResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| message.is_char_boundary(i))
            .unwrap_or(0);
        message.truncate(cut);
    }

    warn!(status = status.as_u16(), %message, "Remote rejected request");
    Err(SyncError::RemoteRejected {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn transport(url: &str) -> RestTransport {
        RestTransport::new(url, Some("anon".into()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_wire_op_leaves_out_local_bookkeeping() {
        let entry = OperationLogEntry {
            id: "op-1".into(),
            op_type: OpType::SaleInsert,
            table_name: SyncTable::Sales,
            record_id: "sale-1".into(),
            payload: json!({"id": "sale-1", "total_cents": 1200}),
            device_id: "till-a".into(),
            device_seq: 7,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
            synced: false,
            synced_at: None,
        };

        let wire = serde_json::to_value(WireOp::from(&entry)).unwrap();
        assert_eq!(wire["op_type"], "sale_insert");
        assert_eq!(wire["table_name"], "sales");
        assert_eq!(wire["device_seq"], 7);
        assert_eq!(wire["payload"]["total_cents"], 1200);
        assert!(wire.get("synced").is_none());
        assert!(wire.get("synced_at").is_none());
    }

    #[test]
    fn test_rpc_url_keeps_base_path() {
        let t = transport("https://pos.example.co.za/api");
        assert_eq!(t.base_url().as_str(), "https://pos.example.co.za/api/");
        assert_eq!(
            t.rpc_url().unwrap().as_str(),
            "https://pos.example.co.za/api/rest/v1/rpc/apply_sync_ops"
        );
    }

    #[test]
    fn test_table_url_filters() {
        let t = transport("http://localhost:54321");
        let watermark = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();

        let url = t.table_url(SyncTable::Items, watermark, "till-a", 0).unwrap();
        assert_eq!(url.path(), "/rest/v1/items");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("select".into(), "*".into())));
        assert!(pairs.contains(&(
            "updated_at".into(),
            "gt.2024-03-01T10:00:00.000000Z".into()
        )));
        assert!(pairs.contains(&("device_id".into(), "neq.till-a".into())));
        assert!(pairs.contains(&("order".into(), "updated_at.asc,id.asc".into())));
        assert!(pairs.contains(&("limit".into(), PAGE_SIZE.to_string())));
        assert!(pairs.contains(&("offset".into(), "0".into())));

        let url = t.table_url(SyncTable::StockMovements, watermark, "till-a", 2000).unwrap();
        assert_eq!(url.path(), "/rest/v1/stock_movements");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("order".into(), "created_at.asc,id.asc".into())));
        assert!(pairs.contains(&("offset".into(), "2000".into())));
    }

    /// Serves `total` rows in pages of at most [`PAGE_SIZE`], like a
    /// capped PostgREST table. Returns the address and the offsets asked for.
    async fn capped_remote(total: usize) -> (String, Arc<Mutex<Vec<usize>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&offsets);

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }

                let head = String::from_utf8_lossy(&request).into_owned();
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let url = Url::parse(&format!("http://localhost{target}")).unwrap();
                let offset: usize = url
                    .query_pairs()
                    .find(|(k, _)| k == "offset")
                    .map(|(_, v)| v.parse().unwrap())
                    .unwrap_or(0);
                seen.lock().unwrap().push(offset);

                let end = total.min(offset + PAGE_SIZE);
                let page: Vec<Value> = (offset..end)
                    .map(|n| json!({ "id": format!("row-{n}") }))
                    .collect();
                let body = serde_json::to_string(&page).unwrap();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (format!("http://{addr}"), offsets)
    }

    #[tokio::test]
    async fn test_fetch_pages_past_the_row_cap() {
        let (url, offsets) = capped_remote(2500).await;
        let t = transport(&url);
        let watermark = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let rows = t
            .fetch_changed_since(SyncTable::Sales, watermark, "till-a")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2500);
        assert_eq!(rows[0]["id"], "row-0");
        assert_eq!(rows[2499]["id"], "row-2499");
        assert_eq!(*offsets.lock().unwrap(), vec![0, 1000, 2000]);
    }

    #[tokio::test]
    async fn test_fetch_exact_page_asks_once_more() {
        let (url, offsets) = capped_remote(PAGE_SIZE).await;
        let t = transport(&url);
        let watermark = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let rows = t
            .fetch_changed_since(SyncTable::Items, watermark, "till-a")
            .await
            .unwrap();

        assert_eq!(rows.len(), PAGE_SIZE);
        assert_eq!(*offsets.lock().unwrap(), vec![0, PAGE_SIZE]);
    }

    #[test]
    fn test_rejects_non_http_url() {
        let err = RestTransport::new("ws://localhost", None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SyncError::InvalidUrl(_)));
    }

    #[test]
    fn test_from_config_requires_url() {
        let config = SyncConfig::default();
        assert!(matches!(
            RestTransport::from_config(&config),
            Err(SyncError::InvalidConfig(_))
        ));
    }
}
