//! Chain module - node access for the single configured network
//!
//! This module provides:
//! - The `ChainClient` seam used by every flow (mocked in tests)
//! - An HTTP JSON-RPC implementation with failover across RPC URLs
//! - Typed call bindings for the bundler and token contracts

pub mod contracts;
pub mod provider;

pub use provider::ChainProvider;

use crate::error::BundlerResult;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};

/// Node operations needed by the bundle and batch flows
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain identifier this client is bound to
    fn chain_id(&self) -> u64;

    /// Current head block number
    async fn block_number(&self) -> BundlerResult<u64>;

    /// Number of transactions sent from `address` as of the latest block
    async fn transaction_count(&self, address: Address) -> BundlerResult<u64>;

    /// Execute a read-only call and return the raw return data
    async fn call(&self, tx: &TypedTransaction) -> BundlerResult<Bytes>;

    /// Estimate the gas required by `tx`
    async fn estimate_gas(&self, tx: &TypedTransaction) -> BundlerResult<U256>;

    /// Hashes of the transactions in block `number`, `None` if not produced yet
    async fn block_transaction_hashes(&self, number: u64) -> BundlerResult<Option<Vec<H256>>>;

    /// Broadcast a signed transaction through the public mempool
    async fn send_raw_transaction(&self, raw: Bytes) -> BundlerResult<H256>;

    /// Wait until `tx_hash` has `confirmations` confirmations
    async fn wait_for_receipt(
        &self,
        tx_hash: H256,
        confirmations: usize,
    ) -> BundlerResult<TransactionReceipt>;
}
