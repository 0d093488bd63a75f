//! Flashbots-compatible relay client
//!
//! Requests are JSON-RPC over HTTPS, authenticated by an `X-Flashbots-Signature`
//! header: `<auth address>:<EIP-191 signature of the hex keccak of the body>`.

use super::resolution::{wait_for_resolution, BundleResolution};
use super::{BundleReceipt, BundleRelay};
use crate::bundle::SignedBundle;
use crate::chain::ChainClient;
use crate::config::RelayConfig;
use crate::error::{BundlerError, BundlerResult};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use ethers::utils::keccak256;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SIGNATURE_HEADER: &str = "X-Flashbots-Signature";

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Relay client bound to one relay endpoint and one chain
pub struct FlashbotsRelay {
    http: reqwest::Client,
    url: String,
    /// Reputation key; never signs transactions
    auth: LocalWallet,
    chain: Arc<dyn ChainClient>,
    poll_interval: Duration,
}

impl FlashbotsRelay {
    /// Create a relay client; a throwaway auth key is generated if none is configured
    pub fn new(
        config: &RelayConfig,
        chain: Arc<dyn ChainClient>,
        poll_interval: Duration,
    ) -> BundlerResult<Self> {
        let auth = match config.auth_key() {
            Some(key) => key
                .parse::<LocalWallet>()
                .map_err(|e| BundlerError::Wallet(format!("Invalid relay auth key: {}", e)))?,
            None => LocalWallet::new(&mut ethers::core::rand::thread_rng()),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BundlerError::RelayTransport(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: config.url.clone(),
            auth,
            chain,
            poll_interval,
        })
    }

    pub fn auth_address(&self) -> Address {
        self.auth.address()
    }

    /// Build the signature header value for a request body
    pub async fn sign_request(&self, body: &[u8]) -> BundlerResult<String> {
        let digest = format!("0x{}", hex::encode(keccak256(body)));
        let signature = self
            .auth
            .sign_message(digest)
            .await
            .map_err(|e| BundlerError::Wallet(format!("Relay request signing failed: {}", e)))?;

        Ok(format!("{:?}:0x{}", self.auth.address(), signature))
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> BundlerResult<T> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let body = serde_json::to_vec(&payload)
            .map_err(|e| BundlerError::RelayTransport(format!("{}: {}", method, e)))?;
        let signature = self.sign_request(&body).await?;

        let response = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(
                SIGNATURE_HEADER,
                HeaderValue::from_str(&signature).map_err(|e| {
                    BundlerError::RelayTransport(format!("Signature header invalid: {}", e))
                })?,
            )
            .body(body)
            .send()
            .await
            .map_err(|e| BundlerError::RelayTransport(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BundlerError::RelayTransport(format!("{} body: {}", method, e)))?;
        debug!(method, status = %status, body = %text, "Relay response");

        if !status.is_success() {
            return Err(BundlerError::RelayTransport(format!(
                "{} rejected with HTTP {}: {}",
                method, status, text
            )));
        }

        parse_response(method, &text)
    }
}

#[async_trait]
impl BundleRelay for FlashbotsRelay {
    async fn send_bundle(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> BundlerResult<BundleReceipt> {
        let result: Value = self
            .rpc("eth_sendBundle", send_bundle_params(bundle, target_block))
            .await?;

        Ok(BundleReceipt {
            bundle_hash: result
                .get("bundleHash")
                .and_then(Value::as_str)
                .map(str::to_string),
            target_block,
        })
    }

    async fn simulate(&self, bundle: &SignedBundle, target_block: u64) -> BundlerResult<Value> {
        self.rpc("eth_callBundle", call_bundle_params(bundle, target_block))
            .await
    }

    async fn resolve(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> BundlerResult<BundleResolution> {
        wait_for_resolution(self.chain.as_ref(), bundle, target_block, self.poll_interval).await
    }

    async fn user_stats(&self, block_number: u64) -> BundlerResult<Value> {
        self.rpc("flashbots_getUserStats", json!([hex_block(block_number)]))
            .await
    }

    async fn user_stats_v2(&self, block_number: u64) -> BundlerResult<Value> {
        self.rpc(
            "flashbots_getUserStatsV2",
            json!([{ "blockNumber": hex_block(block_number) }]),
        )
        .await
    }
}

fn hex_block(number: u64) -> String {
    format!("0x{:x}", number)
}

fn send_bundle_params(bundle: &SignedBundle, target_block: u64) -> Value {
    json!([{
        "txs": bundle.raw_transactions(),
        "blockNumber": hex_block(target_block),
    }])
}

fn call_bundle_params(bundle: &SignedBundle, target_block: u64) -> Value {
    json!([{
        "txs": bundle.raw_transactions(),
        "blockNumber": hex_block(target_block),
        "stateBlockNumber": "latest",
    }])
}

fn parse_response<T: DeserializeOwned>(method: &str, text: &str) -> BundlerResult<T> {
    let response: JsonRpcResponse<T> = serde_json::from_str(text).map_err(|e| {
        BundlerError::RelayTransport(format!("{} returned malformed JSON: {}", method, e))
    })?;

    if let Some(error) = response.error {
        return Err(BundlerError::RelayTransport(format!(
            "{} error {}: {}",
            method, error.code, error.message
        )));
    }

    response
        .result
        .ok_or_else(|| BundlerError::RelayTransport(format!("{} returned no result", method)))
}

/// First reverted transaction in an `eth_callBundle` result, if any
pub(crate) fn simulation_error(result: &Value) -> Option<String> {
    result
        .get("results")
        .and_then(Value::as_array)?
        .iter()
        .enumerate()
        .find_map(|(index, tx)| {
            let error = tx.get("error").and_then(Value::as_str)?;
            let revert = tx.get("revert").and_then(Value::as_str).unwrap_or_default();
            Some(format!("transaction {} failed: {} {}", index, error, revert).trim_end().to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use crate::relay::resolution::tests::fake_bundle;
    use ethers::types::Signature;
    use std::str::FromStr;

    const AUTH_KEY: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

    fn relay(auth_key: &str) -> FlashbotsRelay {
        let config = RelayConfig {
            url: "https://relay-sepolia.flashbots.net".to_string(),
            auth_key: auth_key.to_string(),
            user_stats_v2: false,
            simulate: false,
            request_timeout_secs: 5,
        };
        FlashbotsRelay::new(&config, Arc::new(MockChainClient::new()), Duration::from_millis(1))
            .unwrap()
    }

    #[tokio::test]
    async fn test_signature_header_recovers_auth_address() {
        let relay = relay(AUTH_KEY);
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"eth_sendBundle","params":[]}"#;

        let header = relay.sign_request(body).await.unwrap();
        let (address, signature) = header.split_once(':').unwrap();

        assert_eq!(address, format!("{:?}", relay.auth_address()));
        let signature = Signature::from_str(signature.trim_start_matches("0x")).unwrap();
        let digest = format!("0x{}", hex::encode(keccak256(body)));
        assert_eq!(signature.recover(digest.as_str()).unwrap(), relay.auth_address());
    }

    #[test]
    fn test_random_auth_key_when_unconfigured() {
        let a = relay("");
        let b = relay("  ");
        assert_ne!(a.auth_address(), b.auth_address());
    }

    #[test]
    fn test_send_bundle_params_target_single_block() {
        let bundle = fake_bundle();
        let params = send_bundle_params(&bundle, 255);

        assert_eq!(params[0]["blockNumber"], "0xff");
        assert_eq!(params[0]["txs"], json!(["0xaa", "0xbb"]));
        assert!(params[0].get("maxBlock").is_none());
    }

    #[test]
    fn test_parse_response_surfaces_rpc_error() {
        let err = parse_response::<Value>(
            "eth_sendBundle",
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"bundle too large"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, BundlerError::RelayTransport(msg) if msg.contains("bundle too large")));
    }

    #[test]
    fn test_parse_response_rejects_garbage() {
        assert!(parse_response::<Value>("eth_sendBundle", "<html>").is_err());
        assert!(parse_response::<Value>("eth_sendBundle", r#"{"id":1}"#).is_err());
    }

    #[test]
    fn test_simulation_error_detection() {
        let ok = json!({"results": [{"txHash": "0x1"}, {"txHash": "0x2"}]});
        assert_eq!(simulation_error(&ok), None);

        let reverted = json!({"results": [
            {"txHash": "0x1"},
            {"txHash": "0x2", "error": "execution reverted", "revert": "Trading not open"}
        ]});
        let message = simulation_error(&reverted).unwrap();
        assert!(message.contains("transaction 1"));
        assert!(message.contains("Trading not open"));
    }
}
