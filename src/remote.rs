//! Remote order store client.
//!
//! Mirrors finalized orders to a document-style HTTP store. Each order is
//! written with `PUT {base}/{collection}/{order_id}`, so sending the same order
//! twice overwrites the same document instead of creating a duplicate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::order::Order;
use crate::sync::{SyncAgent, SyncOutcome};

/// Collection used when the configuration does not name one.
pub const DEFAULT_COLLECTION: &str = "orders";

/// Request timeout applied by the HTTP client itself.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the remote store URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
pub fn normalize_remote_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach remote store at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid remote store URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "API key is invalid or expired".to_string(),
        403 => "Device not authorized to write orders".to_string(),
        404 => "Remote store collection not found".to_string(),
        429 => "Remote store quota exceeded".to_string(),
        s if s >= 500 => format!("Remote store server error (HTTP {s})"),
        s => format!("Unexpected response from remote store (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The document written for an order: the order itself, flagged as synced on
/// the remote side, with the time it was pushed.
pub fn remote_document(order: &Order, pushed_at: DateTime<Utc>) -> Result<Value, String> {
    let mut doc = serde_json::to_value(order).map_err(|e| format!("Failed to encode order: {e}"))?;
    let Some(fields) = doc.as_object_mut() else {
        return Err("Order did not encode as a JSON object".into());
    };
    fields.insert("synced".into(), Value::Bool(true));
    fields.insert(
        "pushed_at".into(),
        Value::String(pushed_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Ok(doc)
}

#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
}

impl RemoteStore {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        let collection = collection.trim().trim_matches('/');
        Ok(Self {
            client,
            base_url: normalize_remote_url(base_url),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            collection: if collection.is_empty() {
                DEFAULT_COLLECTION.to_string()
            } else {
                collection.to_string()
            },
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn order_url(&self, order_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.collection, order_id)
    }

    /// Write one order document. Errors are human-readable reasons.
    pub async fn put_order(&self, order: &Order) -> Result<(), String> {
        let url = self.order_url(&order.id);
        let body = remote_document(order, Utc::now())?;

        let mut req = self
            .client
            .put(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("X-POS-API-Key", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();

        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            let detail = if let Ok(json) = serde_json::from_str::<Value>(&body_text) {
                json.get("error")
                    .or_else(|| json.get("message"))
                    .and_then(Value::as_str)
                    .map(|s| format!("{s} (HTTP {})", status.as_u16()))
                    .unwrap_or_else(|| status_error(status))
            } else if !body_text.trim().is_empty() {
                format!("{}: {}", status_error(status), body_text.trim())
            } else {
                status_error(status)
            };
            return Err(detail);
        }

        debug!(order_id = %order.id, status = status.as_u16(), "Remote store accepted order");
        Ok(())
    }
}

#[async_trait]
impl SyncAgent for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn push(&self, order: &Order) -> SyncOutcome {
        match self.put_order(order).await {
            Ok(()) => {
                info!(order_id = %order.id, "Order mirrored to remote store");
                SyncOutcome::Success
            }
            Err(reason) => {
                warn!(order_id = %order.id, reason = %reason, "Remote push failed");
                SyncOutcome::Failure(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{AddOnSelection, LineItem};
    use crate::order::Payment;
    use rust_decimal::Decimal;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn sample_order() -> Order {
        Order {
            id: "ORD-test1".into(),
            customer_name: "Ana".into(),
            items: vec![LineItem {
                product_id: 1,
                name: "Azulito".into(),
                unit_price: Decimal::from(35),
                quantity: 2,
                add_ons: AddOnSelection::none(),
            }],
            total: Decimal::from(70),
            is_gift: false,
            payment: Payment::Cash {
                tendered: Decimal::from(100),
                change: Decimal::from(30),
            },
            created_at: Utc::now(),
            seller: "Luis".into(),
            event_name: "Feria".into(),
            synced: false,
        }
    }

    /// Accept one connection, capture the request head, answer with `response`.
    async fn one_shot_server(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_normalize_remote_url() {
        assert_eq!(normalize_remote_url("example.com/"), "https://example.com");
        assert_eq!(normalize_remote_url("localhost:8080"), "http://localhost:8080");
        assert_eq!(
            normalize_remote_url("  http://10.0.0.2:9000/db// "),
            "http://10.0.0.2:9000/db"
        );
    }

    #[test]
    fn test_status_error_messages() {
        assert_eq!(status_error(StatusCode::UNAUTHORIZED), "API key is invalid or expired");
        assert!(status_error(StatusCode::BAD_GATEWAY).contains("HTTP 502"));
        assert!(status_error(StatusCode::IM_A_TEAPOT).contains("HTTP 418"));
    }

    #[test]
    fn test_order_url_uses_collection() {
        let store = RemoteStore::new("example.com/", None, "/ventas/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(store.order_url("ORD-1"), "https://example.com/ventas/ORD-1");

        let store = RemoteStore::new("example.com", None, "", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(store.order_url("ORD-1"), "https://example.com/orders/ORD-1");
    }

    #[test]
    fn test_remote_document_marks_synced() {
        let order = sample_order();
        let doc = remote_document(&order, Utc::now()).unwrap();
        assert_eq!(doc["id"], "ORD-test1");
        assert_eq!(doc["synced"], true);
        assert!(doc["pushed_at"].as_str().unwrap().ends_with('Z'));
        assert_eq!(doc["payment"]["method"], "cash");
    }

    #[tokio::test]
    async fn test_push_success_sends_put_with_key() {
        let (base, server) =
            one_shot_server("HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let store = RemoteStore::new(&base, Some("secret".into()), "orders", DEFAULT_TIMEOUT).unwrap();

        let outcome = store.push(&sample_order()).await;
        assert_eq!(outcome, SyncOutcome::Success);

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /orders/ORD-test1 HTTP/1.1"));
        assert!(request.to_ascii_lowercase().contains("x-pos-api-key: secret"));
        assert!(request.contains("\"synced\":true"));
    }

    #[tokio::test]
    async fn test_push_failure_reports_reason() {
        let (base, server) = one_shot_server(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let store = RemoteStore::new(&base, None, "orders", DEFAULT_TIMEOUT).unwrap();

        let outcome = store.push(&sample_order()).await;
        assert_eq!(
            outcome,
            SyncOutcome::Failure("Remote store server error (HTTP 503)".into())
        );
        server.await.unwrap();
    }
}
