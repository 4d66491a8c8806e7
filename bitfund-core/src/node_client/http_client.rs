//! HTTP transport adapter for the node API.
//!
//! Endpoint paths default to the public node layout and can be overridden via
//! [`NodeRpcConfig::endpoints`].
#![forbid(unsafe_code)]

use super::{
    AccountBalances, AccountInfo, BroadcastResponse, NodeClient, NodeClientError, ReadOnlyRequest,
    ReadOnlyResponse, TxId, TxStatusResponse,
};
use crate::builder::ContractId;
use crate::clarity::ClarityValue;
use crate::signing::SignedTransaction;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::cmp;
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// HTTP binding configuration for node RPC calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRpcConfig {
    #[serde(alias = "api_url")]
    pub base_url: String,
    /// Sent as `x-api-key` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoints: super::NodeEndpoints,

    /// TCP/TLS connection timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    /// Total request timeout (includes connect, headers, body).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,

    /// Bounded retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl NodeRpcConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            endpoints: super::NodeEndpoints::default(),
            connect_timeout_ms: None,
            request_timeout_ms: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), NodeClientError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(NodeClientError::Config("node.api_url is empty".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NodeClientError::Config(format!(
                "node.api_url must be http(s): {url}"
            )));
        }
        for (name, path) in [
            ("broadcast", &self.endpoints.broadcast),
            ("tx_status", &self.endpoints.tx_status),
            ("balances", &self.endpoints.balances),
            ("account", &self.endpoints.account),
            ("read_only", &self.endpoints.read_only),
        ] {
            if path.trim().is_empty() {
                return Err(NodeClientError::Config(format!(
                    "node.endpoints.{name} is empty"
                )));
            }
        }
        Ok(())
    }
}

/// Retry configuration for transient errors only (timeouts, 5xx, connection reset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 2_000,
        }
    }
}

/// Async HTTP client implementing [`NodeClient`].
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    cfg: NodeRpcConfig,
    client: Client,
}

impl HttpNodeClient {
    pub fn new(cfg: NodeRpcConfig) -> Result<Self, NodeClientError> {
        cfg.validate()?;
        let request_timeout =
            Duration::from_millis(cfg.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS));
        let connect_timeout =
            Duration::from_millis(cfg.connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS));
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| NodeClientError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { cfg, client })
    }

    fn join_url(&self, path: &str) -> String {
        let base = self.cfg.base_url.trim().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{base}/{path}")
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self
            .cfg
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    fn is_transient_status(status: StatusCode) -> bool {
        status.is_server_error()
    }

    fn max_attempts(&self) -> u32 {
        cmp::max(1, self.cfg.retry.max_attempts)
    }

    fn jitter_ms(seed: u64, attempt: u32, max_jitter_ms: u64) -> u64 {
        if max_jitter_ms == 0 {
            return 0;
        }
        // xorshift64* over seed+attempt keeps retries reproducible per tx.
        let mut x = seed ^ (u64::from(attempt).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        x = x.wrapping_mul(0x2545_F491_4F6C_DD1D);
        x % (max_jitter_ms + 1)
    }

    fn backoff_delay_ms(&self, attempt: u32, seed: u64) -> u64 {
        // attempt is 1-based.
        let exp = attempt.saturating_sub(1);
        let mult = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        let base = self.cfg.retry.base_delay_ms.saturating_mul(mult);
        let capped = cmp::min(base, self.cfg.retry.max_delay_ms);
        let jitter_cap = capped / 2;
        capped.saturating_add(Self::jitter_ms(seed, attempt, jitter_cap))
    }

    fn is_transient_reqwest_error(err: &reqwest::Error) -> bool {
        if err.is_timeout() || err.is_connect() {
            return true;
        }
        let mut src = err.source();
        while let Some(e) = src {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                return matches!(
                    io.kind(),
                    std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::UnexpectedEof
                );
            }
            src = e.source();
        }
        false
    }

    fn seed_for(key: &str) -> u64 {
        let h = blake3::hash(key.as_bytes());
        let mut first = [0u8; 8];
        first.copy_from_slice(&h.as_bytes()[..8]);
        u64::from_be_bytes(first)
    }

    /// Send with bounded retries on transient failures.
    ///
    /// Non-transient non-2xx responses are returned for the caller to interpret.
    async fn send_with_retry_response(
        &self,
        op: &'static str,
        correlation: &str,
        make_req: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, NodeClientError> {
        self.send_with_retry(op, correlation, false, make_req).await
    }

    /// Like [`Self::send_with_retry_response`], but once retries are spent the
    /// last 5xx response is returned so its body can be read.
    async fn send_with_retry_keep_last(
        &self,
        op: &'static str,
        correlation: &str,
        make_req: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, NodeClientError> {
        self.send_with_retry(op, correlation, true, make_req).await
    }

    async fn send_with_retry(
        &self,
        op: &'static str,
        correlation: &str,
        keep_last: bool,
        make_req: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, NodeClientError> {
        let attempts = self.max_attempts();
        let seed = Self::seed_for(correlation);

        let mut last_err: Option<NodeClientError> = None;
        for attempt in 1..=attempts {
            debug!(op, attempt, attempts, tx_id = correlation, "node request");

            match self.auth(make_req()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !Self::is_transient_status(status) {
                        return Ok(resp);
                    }
                    if attempt < attempts {
                        let delay_ms = self.backoff_delay_ms(attempt, seed);
                        warn!(
                            op,
                            attempt,
                            attempts,
                            status = status.as_u16(),
                            delay_ms,
                            "transient node http status; retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        last_err = Some(NodeClientError::HttpStatus(status.as_u16()));
                        continue;
                    }
                    if keep_last {
                        return Ok(resp);
                    }
                    return Err(NodeClientError::RetryExhausted {
                        attempts,
                        last_error: Box::new(NodeClientError::HttpStatus(status.as_u16())),
                    });
                }
                Err(e) => {
                    let err = map_reqwest_send_error(&e);
                    let transient = matches!(err, NodeClientError::Timeout)
                        || Self::is_transient_reqwest_error(&e);
                    if attempt < attempts && transient {
                        let delay_ms = self.backoff_delay_ms(attempt, seed);
                        warn!(
                            op,
                            attempt,
                            attempts,
                            delay_ms,
                            error = %e,
                            "transient node transport error; retrying"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        last_err = Some(err);
                        continue;
                    }
                    if transient {
                        return Err(NodeClientError::RetryExhausted {
                            attempts,
                            last_error: Box::new(err),
                        });
                    }
                    return Err(err);
                }
            }
        }

        Err(NodeClientError::RetryExhausted {
            attempts,
            last_error: Box::new(
                last_err.unwrap_or_else(|| NodeClientError::Network("unknown error".to_string())),
            ),
        })
    }

    async fn decode_json<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
    ) -> Result<T, NodeClientError> {
        let body = resp.bytes().await.map_err(|e| map_reqwest_send_error(&e))?;
        serde_json::from_slice(&body).map_err(|e| NodeClientError::DecodeError(e.to_string()))
    }

    async fn json_404_none<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
    ) -> Result<Option<T>, NodeClientError> {
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(NodeClientError::HttpStatus(status.as_u16()));
        }
        Self::decode_json(resp).await.map(Some)
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn broadcast(&self, tx: &SignedTransaction) -> Result<TxId, NodeClientError> {
        let url = self.join_url(&self.cfg.endpoints.broadcast);
        let body = tx.to_bytes().to_vec();
        let local_id = tx.tx_id();

        // Re-sending identical signed bytes is idempotent on the node side.
        let resp = self
            .send_with_retry_keep_last("broadcast", local_id.as_str(), || {
                self.client
                    .post(url.clone())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(body.clone())
            })
            .await?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| map_reqwest_send_error(&e))?;

        if Self::is_transient_status(status) {
            // Retries are spent; a structured rejection still names the reason.
            let rejection = serde_json::from_str::<BroadcastResponse>(&text)
                .ok()
                .and_then(|parsed| parsed.rejection());
            return Err(match rejection {
                Some(reason) => NodeClientError::Rejected(reason),
                None => NodeClientError::RetryExhausted {
                    attempts: self.max_attempts(),
                    last_error: Box::new(NodeClientError::HttpStatus(status.as_u16())),
                },
            });
        }

        match serde_json::from_str::<BroadcastResponse>(&text) {
            Ok(parsed) if status.is_success() => parsed.into_result().map_err(NodeClientError::Rejected),
            Ok(parsed) => Err(NodeClientError::Rejected(match parsed.into_result() {
                Err(reason) => reason,
                Ok(_) => format!("http status {}", status.as_u16()),
            })),
            Err(_) if !status.is_success() => {
                let reason = text.trim();
                Err(NodeClientError::Rejected(if reason.is_empty() {
                    format!("http status {}", status.as_u16())
                } else {
                    reason.to_string()
                }))
            }
            Err(e) => Err(NodeClientError::DecodeError(e.to_string())),
        }
    }

    async fn transaction_status(
        &self,
        tx_id: &TxId,
    ) -> Result<Option<TxStatusResponse>, NodeClientError> {
        let path = self.cfg.endpoints.tx_status.replace("{txid}", tx_id.as_str());
        let url = self.join_url(&path);
        let resp = self
            .send_with_retry_response("tx_status", tx_id.as_str(), || self.client.get(url.clone()))
            .await?;
        Self::json_404_none(resp).await
    }

    async fn balances(&self, address: &str) -> Result<AccountBalances, NodeClientError> {
        let path = self.cfg.endpoints.balances.replace("{address}", address);
        let url = self.join_url(&path);
        let resp = self
            .send_with_retry_response("balances", address, || self.client.get(url.clone()))
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NodeClientError::HttpStatus(status.as_u16()));
        }
        Self::decode_json(resp).await
    }

    async fn account(&self, address: &str) -> Result<AccountInfo, NodeClientError> {
        let path = self.cfg.endpoints.account.replace("{address}", address);
        let url = self.join_url(&path);
        let resp = self
            .send_with_retry_response("account", address, || self.client.get(url.clone()))
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NodeClientError::HttpStatus(status.as_u16()));
        }
        Self::decode_json(resp).await
    }

    async fn call_read_only(
        &self,
        contract: &ContractId,
        function_name: &str,
        sender: &str,
        args: &[ClarityValue],
    ) -> Result<ClarityValue, NodeClientError> {
        let body = ReadOnlyRequest::new(sender, args)?;
        let path = self
            .cfg
            .endpoints
            .read_only
            .replace("{address}", &contract.address)
            .replace("{contract}", &contract.name)
            .replace("{function}", function_name);
        let url = self.join_url(&path);
        let correlation = format!("{contract}::{function_name}");
        let resp = self
            .send_with_retry_response("read_only", &correlation, || {
                self.client.post(url.clone()).json(&body)
            })
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(NodeClientError::HttpStatus(status.as_u16()));
        }
        Self::decode_json::<ReadOnlyResponse>(resp).await?.into_value()
    }
}

fn map_reqwest_send_error(err: &reqwest::Error) -> NodeClientError {
    if err.is_timeout() {
        return NodeClientError::Timeout;
    }
    NodeClientError::Network(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::BaseUnits;
    use crate::address::Network;
    use crate::builder::{ContractDeploy, TransactionPayload};
    use crate::signing::{Secp256k1Signer, TransactionSigner};
    use wiremock::matchers::{body_bytes, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> NodeRpcConfig {
        let mut cfg = NodeRpcConfig::new(base_url);
        cfg.request_timeout_ms = Some(1_000);
        cfg.retry = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        };
        cfg
    }

    const DEPLOYER: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";

    fn signed_tx() -> SignedTransaction {
        let signer =
            Secp256k1Signer::from_secret_hex(&format!("{}01", "44".repeat(32)), Network::Testnet)
                .unwrap();
        let payload = TransactionPayload::ContractDeploy(ContractDeploy {
            contract_name: "bitfund".to_string(),
            code_body: "(define-data-var n uint u0)".to_string(),
        });
        signer.sign(signer.prepare(payload, 1, 180)).unwrap()
    }

    #[test]
    fn retry_status_classification_only_retries_5xx() {
        assert!(HttpNodeClient::is_transient_status(
            StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(HttpNodeClient::is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!HttpNodeClient::is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!HttpNodeClient::is_transient_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn backoff_is_capped_and_deterministic() {
        let mut cfg = NodeRpcConfig::new("http://localhost:3999");
        cfg.retry = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        let client = HttpNodeClient::new(cfg).unwrap();
        for attempt in 1..=10 {
            let d = client.backoff_delay_ms(attempt, 42);
            assert!(d <= 1_500, "attempt {attempt}: {d}");
            assert_eq!(d, client.backoff_delay_ms(attempt, 42));
        }
        assert!(client.backoff_delay_ms(1, 42) >= 100);
    }

    #[test]
    fn config_rejects_bad_urls() {
        assert!(matches!(
            HttpNodeClient::new(NodeRpcConfig::new("  ")),
            Err(NodeClientError::Config(_))
        ));
        assert!(matches!(
            HttpNodeClient::new(NodeRpcConfig::new("ftp://node")),
            Err(NodeClientError::Config(_))
        ));
    }

    #[tokio::test]
    async fn broadcast_accepted_returns_txid() {
        let tx = signed_tx();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/transactions"))
            .and(header("content-type", "application/octet-stream"))
            .and(body_bytes(tx.to_bytes().to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"txid": "0xAA"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        let txid = client.broadcast(&tx).await.unwrap();
        assert_eq!(txid, TxId("0xaa".to_string()));
    }

    #[tokio::test]
    async fn broadcast_5xx_rejection_body_carries_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/transactions"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "transaction rejected",
                "reason": "ServerFailureDatabase"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = test_config(server.uri());
        cfg.retry.max_attempts = 1;
        let client = HttpNodeClient::new(cfg).unwrap();
        match client.broadcast(&signed_tx()).await.unwrap_err() {
            NodeClientError::Rejected(reason) => {
                assert_eq!(reason, "transaction rejected: ServerFailureDatabase")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_5xx_without_reason_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/transactions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .expect(3)
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        let err = client.broadcast(&signed_tx()).await.unwrap_err();
        assert!(matches!(
            err,
            NodeClientError::RetryExhausted { attempts: 3, ref last_error }
                if matches!(**last_error, NodeClientError::HttpStatus(503))
        ));
    }

    #[tokio::test]
    async fn broadcast_rejection_carries_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/transactions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "transaction rejected",
                "reason": "BadNonce"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        let err = client.broadcast(&signed_tx()).await.unwrap_err();
        match err {
            NodeClientError::Rejected(reason) => assert_eq!(reason, "transaction rejected: BadNonce"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_error_body_with_200_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/transactions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "ConflictingNonceInMempool"})),
            )
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        assert!(matches!(
            client.broadcast(&signed_tx()).await,
            Err(NodeClientError::Rejected(r)) if r == "ConflictingNonceInMempool"
        ));
    }

    #[tokio::test]
    async fn broadcast_retries_5xx_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/transactions"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/transactions"))
            .respond_with(ResponseTemplate::new(200).set_body_json("0xbb"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        assert_eq!(
            client.broadcast(&signed_tx()).await.unwrap(),
            TxId("0xbb".to_string())
        );
    }

    #[tokio::test]
    async fn tx_status_404_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/transactions/0x01"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        let resp = client
            .transaction_status(&TxId("0x01".to_string()))
            .await
            .unwrap();
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn tx_status_5xx_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/transactions/0x02"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        let err = client
            .transaction_status(&TxId("0x02".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(
            err,
            NodeClientError::RetryExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn tx_status_bad_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/transactions/0x03"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        assert!(matches!(
            client.transaction_status(&TxId("0x03".to_string())).await,
            Err(NodeClientError::DecodeError(_))
        ));
    }

    #[tokio::test]
    async fn account_nonce_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/v2/accounts/{DEPLOYER}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "balance": "0x0000000000000000000000e8d4a51000",
                "locked": "0x00000000000000000000000000000000",
                "nonce": 17
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        assert_eq!(client.account_nonce(DEPLOYER).await.unwrap(), 17);
    }

    #[tokio::test]
    async fn read_only_posts_hex_args_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/v2/contracts/call-read/{DEPLOYER}/bitfund/get-contribution"
            )))
            .and(body_json(serde_json::json!({
                "sender": DEPLOYER,
                "arguments": [
                    "0x0100000000000000000000000000000004",
                    "0x051a6d78de7b0625dfbfc16c3a8a5735f6dc3dc3f2ce"
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "okay": true,
                "result": "0x0a0c0000000106616d6f756e7401000000000000000000000000000001f4"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        let contract: ContractId = format!("{DEPLOYER}.bitfund").parse().unwrap();
        let v = client
            .call_read_only(
                &contract,
                "get-contribution",
                DEPLOYER,
                &[
                    ClarityValue::UInt(4),
                    ClarityValue::principal(DEPLOYER.parse().unwrap()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(v.to_string(), "(some (tuple (amount u500)))");
    }

    #[tokio::test]
    async fn read_only_failure_carries_cause() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!(
                "/v2/contracts/call-read/{DEPLOYER}/bitfund/get-contribution"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "okay": false,
                "cause": "Unchecked(NoSuchContract)"
            })))
            .mount(&server)
            .await;

        let client = HttpNodeClient::new(test_config(server.uri())).unwrap();
        let contract: ContractId = format!("{DEPLOYER}.bitfund").parse().unwrap();
        assert!(matches!(
            client
                .call_read_only(&contract, "get-contribution", DEPLOYER, &[])
                .await,
            Err(NodeClientError::ReadOnlyFailed(cause)) if cause == "Unchecked(NoSuchContract)"
        ));
    }

    #[tokio::test]
    async fn balances_send_api_key_and_decode() {
        let server = MockServer::start().await;
        let addr = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";
        Mock::given(method("GET"))
            .and(path(format!("/extended/v1/address/{addr}/balances")))
            .and(header("x-api-key", "k-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "fungible_tokens": {"a.b::sbtc": {"balance": "42"}}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let mut cfg = test_config(server.uri());
        cfg.api_key = Some("k-123".to_string());
        let client = HttpNodeClient::new(cfg).unwrap();
        assert_eq!(
            client.token_balance(addr, "a.b::sbtc").await.unwrap(),
            BaseUnits(42)
        );
        assert_eq!(
            client.token_balance(addr, "missing::x").await.unwrap(),
            BaseUnits::ZERO
        );
    }
}
