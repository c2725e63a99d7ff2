//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::Context;
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Number of attempts for idempotent reads before giving up.
const READ_RETRIES: usize = 3;

/// Thin JSON-RPC client bound to a single endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: Url,
}

impl RpcClient {
    /// Create a client for `url` whose requests time out after `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, anyhow::Error> {
        let url = Url::parse(url).with_context(|| format!("Invalid RPC URL: {}", url))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, url })
    }

    /// The endpoint this client talks to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Make a JSON-RPC call and deserialize the result.
    ///
    /// # Arguments
    /// * `method` - The RPC method name
    /// * `params` - The method parameters
    ///
    /// # Returns
    /// The deserialized result, or an error if the request failed or returned an error response.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, anyhow::Error> {
        tracing::trace!(method, ?params, "Sending JSON-RPC request");

        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let result: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = result.get("error") {
            anyhow::bail!(
                "RPC error: {}",
                error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown")
            );
        }

        let result_value = result
            .get("result")
            .context("No result in response")?
            .clone();

        serde_json::from_value(result_value)
            .with_context(|| format!("Failed to deserialize {} result", method))
    }

    /// Same as [`RpcClient::call`], retried with exponential backoff.
    ///
    /// Only use this for reads: a retried write may be applied twice.
    pub async fn call_with_retry<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, anyhow::Error> {
        (|| self.call(method, params.clone()))
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_times(READ_RETRIES),
            )
            .notify(|err: &anyhow::Error, dur: Duration| {
                tracing::debug!(error = %err, method, retry_in = ?dur, "RPC read failed, retrying...");
            })
            .await
    }

    /// Query `eth_chainId`.
    pub async fn chain_id(&self) -> Result<u64, anyhow::Error> {
        let result: String = self.call_with_retry("eth_chainId", vec![]).await?;
        parse_quantity(&result)
    }

    /// Query `eth_blockNumber`.
    pub async fn block_number(&self) -> Result<u64, anyhow::Error> {
        let result: String = self.call_with_retry("eth_blockNumber", vec![]).await?;
        parse_quantity(&result)
    }
}

/// Parse a 0x-prefixed hex quantity into a u64.
pub fn parse_quantity(s: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {}", s))
}

/// Parse a 0x-prefixed hex quantity into a u128 (gas prices).
pub fn parse_quantity_u128(s: &str) -> Result<u128, anyhow::Error> {
    u128::from_str_radix(s.trim_start_matches("0x"), 16)
        .with_context(|| format!("Invalid hex quantity: {}", s))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
pub(crate) fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_quantity(&s).map_err(serde::de::Error::custom)
}

/// Why [`poll_until`] stopped without a value.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Repeatedly call `check_fn` until it yields a value.
///
/// `check_fn` returns `Ok(None)` while the awaited condition does not hold yet and
/// `Err` on a terminal failure, which stops polling immediately.
///
/// # Arguments
/// * `name` - What is being waited for (for logs)
/// * `timeout` - Maximum time to wait
/// * `interval` - Delay between two checks
/// * `cancel` - Token that aborts the wait when cancelled
pub async fn poll_until<T, F, Fut>(
    name: &str,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
    check_fn: F,
) -> Result<T, PollError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, anyhow::Error>>,
{
    let start = Instant::now();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        // A single check may hang on a slow endpoint, so it races the deadline too.
        let checked = tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => return Err(PollError::Timeout(timeout)),
            checked = check_fn() => checked?,
        };

        if let Some(value) = checked {
            return Ok(value);
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(PollError::Timeout(timeout));
        }

        tracing::trace!(waiting_for = %name, elapsed = ?elapsed, "Condition not met yet, polling again...");

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(interval.min(timeout - elapsed)) => {}
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    type Handler = dyn Fn(&str, &Value) -> Result<Value, String> + Send + Sync;
    type Calls = Arc<Mutex<Vec<(String, Value)>>>;

    /// In-process JSON-RPC endpoint answering each call from a closure.
    ///
    /// `Err(message)` from the closure is sent back as a JSON-RPC error.
    pub(crate) struct RpcStub {
        url: String,
        calls: Calls,
    }

    impl RpcStub {
        pub(crate) async fn spawn<H>(handler: H) -> Self
        where
            H: Fn(&str, &Value) -> Result<Value, String> + Send + Sync + 'static,
        {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let calls: Calls = Arc::default();
            let handler: Arc<Handler> = Arc::new(handler);

            let recorded = calls.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(serve(stream, handler.clone(), recorded.clone()));
                }
            });

            Self { url, calls }
        }

        pub(crate) fn client(&self) -> RpcClient {
            RpcClient::new(&self.url, Duration::from_secs(5)).unwrap()
        }

        /// Methods called so far, in order.
        pub(crate) fn methods(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(method, _)| method.clone())
                .collect()
        }

        /// Params of every call to `method`.
        pub(crate) fn params(&self, method: &str) -> Vec<Value> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(m, _)| m == method)
                .map(|(_, params)| params.clone())
                .collect()
        }
    }

    /// Serve keep-alive HTTP/1.1 requests on one connection.
    async fn serve(mut stream: TcpStream, handler: Arc<Handler>, calls: Calls) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let body = loop {
                if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                    let length = headers
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    let total = end + 4 + length;
                    if buf.len() >= total {
                        let body = buf[end + 4..total].to_vec();
                        buf.drain(..total);
                        break body;
                    }
                }
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            };

            let request: Value = serde_json::from_slice(&body).unwrap();
            let method = request["method"].as_str().unwrap_or_default().to_string();
            let params = request["params"].clone();
            calls.lock().unwrap().push((method.clone(), params.clone()));

            let response = match handler(&method, &params) {
                Ok(result) => json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }),
                Err(message) => json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "error": { "code": -32000, "message": message },
                }),
            };
            let response = response.to_string();
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
                response.len(),
                response
            );
            if stream.write_all(reply.as_bytes()).await.is_err() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_call_against_endpoint() {
        let stub = RpcStub::spawn(|method, _| match method {
            "eth_chainId" => Ok(json!("0x7a69")),
            "eth_blockNumber" => Ok(json!("0x10")),
            _ => Err("method not found".to_string()),
        })
        .await;
        let client = stub.client();

        assert_eq!(client.chain_id().await.unwrap(), 31337);
        assert_eq!(client.block_number().await.unwrap(), 16);

        let err = client.call::<String>("eth_syncing", vec![]).await.unwrap_err();
        assert!(err.to_string().contains("method not found"), "{err:#}");
        assert_eq!(stub.methods(), vec!["eth_chainId", "eth_blockNumber", "eth_syncing"]);
    }

    #[tokio::test]
    async fn test_reads_are_retried() {
        let attempts = AtomicUsize::new(0);
        let stub = RpcStub::spawn(move |_, _| {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("header not found".to_string())
            } else {
                Ok(json!("0x2a"))
            }
        })
        .await;

        assert_eq!(stub.client().block_number().await.unwrap(), 42);
        assert_eq!(stub.methods().len(), 3);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x7a69").unwrap(), 31337);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity_u128("0x3b9aca00").unwrap(), 1_000_000_000);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(RpcClient::new("not a url", Duration::from_secs(1)).is_err());
        let client = RpcClient::new("http://127.0.0.1:8545", Duration::from_secs(1)).unwrap();
        assert_eq!(client.url().as_str(), "http://127.0.0.1:8545/");
    }

    #[tokio::test]
    async fn test_poll_until_returns_value() {
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let value = poll_until(
            "counter",
            Duration::from_secs(5),
            Duration::from_millis(5),
            &cancel,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok((n >= 2).then_some(n)) }
            },
        )
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> = poll_until(
            "never",
            Duration::from_millis(30),
            Duration::from_millis(5),
            &cancel,
            || async { Ok(None) },
        )
        .await;

        assert!(matches!(result, Err(PollError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_poll_until_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<(), _> = poll_until(
            "never",
            Duration::from_secs(5),
            Duration::from_millis(5),
            &cancel,
            || async { Ok(None) },
        )
        .await;

        assert!(matches!(result, Err(PollError::Cancelled)));
    }

    #[tokio::test]
    async fn test_poll_until_propagates_terminal_error() {
        let cancel = CancellationToken::new();
        let result: Result<(), _> = poll_until(
            "reverted",
            Duration::from_secs(5),
            Duration::from_millis(5),
            &cancel,
            || async { Err(anyhow::anyhow!("transaction reverted")) },
        )
        .await;

        assert!(matches!(result, Err(PollError::Failed(_))));
    }

    #[tokio::test]
    async fn test_poll_until_bounds_a_hanging_check() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let result: Result<(), _> = poll_until(
            "hanging",
            Duration::from_millis(50),
            Duration::from_millis(5),
            &cancel,
            || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(None)
            },
        )
        .await;

        assert!(matches!(result, Err(PollError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_poll_until_cancels_a_hanging_check() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = poll_until(
            "hanging",
            Duration::from_secs(30),
            Duration::from_millis(5),
            &cancel,
            || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(None)
            },
        )
        .await;

        assert!(matches!(result, Err(PollError::Cancelled)));
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Block {
        #[serde(deserialize_with = "deserialize_u64_from_hex")]
        block_number: u64,
    }

    #[test]
    fn test_hex_field_from_owned_value() {
        // RpcClient::call decodes results from an owned serde_json::Value.
        let block: Block = serde_json::from_value(serde_json::json!({ "blockNumber": "0x5" })).unwrap();
        assert_eq!(block.block_number, 5);

        let invalid = serde_json::from_value::<Block>(serde_json::json!({ "blockNumber": "0xzz" }));
        assert!(invalid.is_err());
    }
}
