//! Chain provider with multi-RPC support and automatic failover

use super::ChainClient;
use crate::config::NetworkConfig;
use crate::error::{BundlerError, BundlerResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Network configuration
    config: NetworkConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: NetworkConfig) -> BundlerResult<Self> {
        let mut http_providers = Vec::new();

        for url in config.rpc_urls.iter().filter(|u| !u.trim().is_empty()) {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(500));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(BundlerError::ChainQuery(format!(
                "No valid RPC providers for chain {}",
                config.chain_id
            )));
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.config.chain_id, next);
    }

    /// Verify the node reports the configured chain id
    pub async fn verify_chain_id(&self) -> BundlerResult<()> {
        let reported = self
            .http()
            .get_chainid()
            .await
            .map_err(|e| self.query_error("eth_chainId", e))?;

        if reported != U256::from(self.config.chain_id) {
            return Err(BundlerError::Config(format!(
                "RPC reports chain {} but {} ({}) is configured",
                reported, self.config.name, self.config.chain_id
            )));
        }
        Ok(())
    }

    fn query_error(&self, operation: &str, e: impl std::fmt::Display) -> BundlerError {
        BundlerError::ChainQuery(format!(
            "{} failed on chain {}: {}",
            operation, self.config.chain_id, e
        ))
    }

    /// Run `request` against each provider in turn, failing over on error
    async fn with_failover<'a, T, F, Fut>(&'a self, operation: &str, request: F) -> BundlerResult<T>
    where
        F: Fn(&'a Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for _ in 0..self.http_providers.len() {
            match request(self.http()).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(
                        "{} failed on chain {}: {}",
                        operation, self.config.chain_id, e
                    );
                    last_error = Some(e);
                    self.failover();
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no providers".to_string());
        Err(self.query_error(
            operation,
            format!("all {} providers failed, last: {}", self.http_providers.len(), reason),
        ))
    }
}

#[async_trait]
impl ChainClient for ChainProvider {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn block_number(&self) -> BundlerResult<u64> {
        let block = self
            .with_failover("eth_blockNumber", |p| p.get_block_number())
            .await?;
        Ok(block.as_u64())
    }

    async fn transaction_count(&self, address: Address) -> BundlerResult<u64> {
        let nonce = self
            .with_failover("eth_getTransactionCount", |p| {
                p.get_transaction_count(address, Some(BlockNumber::Latest.into()))
            })
            .await?;

        Ok(nonce.as_u64())
    }

    async fn call(&self, tx: &TypedTransaction) -> BundlerResult<Bytes> {
        self.with_failover("eth_call", |p| p.call(tx, None)).await
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> BundlerResult<U256> {
        self.with_failover("eth_estimateGas", |p| p.estimate_gas(tx, None))
            .await
    }

    async fn block_transaction_hashes(&self, number: u64) -> BundlerResult<Option<Vec<H256>>> {
        let block = self
            .with_failover("eth_getBlockByNumber", |p| p.get_block(number))
            .await?;

        Ok(block.map(|b| b.transactions))
    }

    // Not failed over: a rejected broadcast is reported as is
    async fn send_raw_transaction(&self, raw: Bytes) -> BundlerResult<H256> {
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| self.query_error("eth_sendRawTransaction", e))?;

        Ok(pending.tx_hash())
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> BundlerResult<TransactionReceipt> {
        self.with_failover("transaction receipt", |p| {
            PendingTransaction::new(tx_hash, p).confirmations(confirmations)
        })
        .await?
        .ok_or_else(|| BundlerError::ChainQuery(format!("Transaction {:?} was dropped", tx_hash)))
    }
}
