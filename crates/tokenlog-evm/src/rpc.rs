//! HTTP JSON-RPC log source backed by `reqwest`.
//!
//! Only the two calls the fetcher needs are implemented: `eth_blockNumber`
//! and `eth_getLogs`. There is no retry; a failed call surfaces as
//! [`IndexerError::Rpc`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tokenlog_core::error::IndexerError;

use crate::source::{parse_hex_u64, LogFilter, LogSource, RawLog};

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The result value, or the node's error as [`IndexerError::Rpc`].
    pub fn into_result(self) -> Result<Value, IndexerError> {
        if let Some(err) = self.error {
            return Err(IndexerError::Rpc(format!(
                "JSON-RPC error {}: {}",
                err.code, err.message
            )));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// [`LogSource`] talking to an EVM node over HTTP.
pub struct HttpLogSource {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpLogSource {
    /// Create a client for `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| IndexerError::Rpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create with a 30 s request timeout.
    pub fn default_for(url: impl Into<String>) -> Result<Self, IndexerError> {
        Self::new(url, Duration::from_secs(30))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, IndexerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        tracing::debug!(id, method, url = %self.url, "rpc request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IndexerError::Rpc(format!("HTTP {status}: {body}")));
        }

        let result = resp
            .json::<JsonRpcResponse>()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?
            .into_result()?;
        serde_json::from_value(result)
            .map_err(|e| IndexerError::Rpc(format!("unexpected {method} result: {e}")))
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn block_number(&self) -> Result<u64, IndexerError> {
        let hex: String = self.call("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex)
            .ok_or_else(|| IndexerError::Rpc(format!("invalid block number: {hex}")))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, IndexerError> {
        self.call("eth_getLogs", vec![filter.to_json()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use tokenlog_core::types::BlockRange;

    /// Serve one HTTP request with a fixed JSON body; returns the base URL and
    /// a handle yielding the request body the server saw.
    async fn serve_once(status: &'static str, body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let request_body = loop {
                let n = sock.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let headers = text[..split].to_ascii_lowercase();
                    let len = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + len {
                        break text[split + 4..].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
            request_body
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn request_serialization() {
        let req = JsonRpcRequest::new(1, "eth_blockNumber", vec![]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"eth_blockNumber\""));
    }

    #[test]
    fn response_error_maps_to_rpc_error() {
        let resp: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "query returned more than 10000 results" }
        }))
        .unwrap();
        let err = resp.into_result().unwrap_err();
        assert!(matches!(err, IndexerError::Rpc(ref m) if m.contains("-32005")));
    }

    #[tokio::test]
    async fn block_number_over_http() {
        let (url, server) =
            serve_once("200 OK", json!({"jsonrpc":"2.0","id":1,"result":"0x13d6f34"}).to_string()).await;
        let source = HttpLogSource::default_for(url).unwrap();

        assert_eq!(source.block_number().await.unwrap(), 20_803_380);
        let seen = server.await.unwrap();
        assert!(seen.contains("eth_blockNumber"));
    }

    #[tokio::test]
    async fn get_logs_sends_filter_and_parses_logs() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [{
                "address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
                "data": "0x01",
                "blockNumber": "0x64",
                "transactionHash": "0xabc",
                "logIndex": "0x0",
                "removed": false
            }]
        })
        .to_string();
        let (url, server) = serve_once("200 OK", body).await;
        let source = HttpLogSource::default_for(url).unwrap();

        let filter = LogFilter::new(BlockRange { from: 100, to: 200 }, "0xtoken", vec![Some("0xsig".into())]);
        let logs = source.logs(&filter).await.unwrap();

        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number_u64(), Some(100));
        let seen: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(seen["method"], "eth_getLogs");
        assert_eq!(seen["params"][0]["fromBlock"], "0x64");
        assert_eq!(seen["params"][0]["toBlock"], "0xc8");
    }

    #[tokio::test]
    async fn http_error_status_is_rpc_error() {
        let (url, _server) = serve_once("503 Service Unavailable", "{}".to_string()).await;
        let source = HttpLogSource::default_for(url).unwrap();
        let err = source.block_number().await.unwrap_err();
        assert!(matches!(err, IndexerError::Rpc(ref m) if m.contains("503")));
    }
}
