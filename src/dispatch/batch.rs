//! `sendBatch` dispatcher

use crate::chain::ChainClient;
use crate::error::{BundlerError, BundlerResult};
use crate::identity::IdentityRegistry;
use crate::tx::{ContractCall, GasPolicy, TransactionBuilder};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{TransactionRequest, H256, U256, U64};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a confirmed batch send
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    pub recipients: U256,
    pub total: U256,
    pub gas_limit: U256,
}

/// Sends `sendBatch(amount)` with `amount × recipients` attached
pub struct BatchDispatcher {
    chain: Arc<dyn ChainClient>,
    registry: Arc<IdentityRegistry>,
    builder: Arc<TransactionBuilder>,
    gas: GasPolicy,
    confirmations: usize,
}

impl BatchDispatcher {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        registry: Arc<IdentityRegistry>,
        builder: Arc<TransactionBuilder>,
        gas: GasPolicy,
        confirmations: usize,
    ) -> Self {
        Self {
            chain,
            registry,
            builder,
            gas,
            confirmations,
        }
    }

    /// Pay `amount` wei to every registered recipient in one public transaction
    pub async fn send_batch(&self, amount: U256) -> BundlerResult<BatchReceipt> {
        let result = self.dispatch(amount).await;
        match &result {
            Ok(_) => crate::metrics::record_batch_sent(),
            Err(_) => crate::metrics::record_batch_failed(),
        }
        result
    }

    async fn dispatch(&self, amount: U256) -> BundlerResult<BatchReceipt> {
        let recipients = self.builder.recipient_count().await?;
        let total = amount.checked_mul(recipients).ok_or_else(|| {
            BundlerError::Encoding(format!(
                "Batch total overflows: {} x {} recipients",
                amount, recipients
            ))
        })?;

        let call = ContractCall::SendBatch {
            amount,
            value: total,
        };
        let role = call.owner();
        let gas_price = self.gas.batch_gas_price();

        // Estimate before a nonce is allocated; a failed estimate sends nothing
        let probe: TypedTransaction = TransactionRequest::new()
            .from(self.registry.address(role))
            .to(self.builder.contracts().bundler)
            .data(call.encode()?)
            .value(total)
            .gas_price(gas_price)
            .chain_id(self.chain.chain_id())
            .into();
        let gas_limit = self.chain.estimate_gas(&probe).await?;

        let planned = self.builder.build(call).await?;
        let nonce = planned.nonce().unwrap_or_default().as_u64();
        let tx: TypedTransaction = planned.request.gas_price(gas_price).gas(gas_limit).into();

        let raw = match self.registry.sign(role, &tx).await {
            Ok(raw) => raw,
            Err(e) => {
                self.registry.release_nonce(role, nonce).await;
                return Err(e);
            }
        };

        let tx_hash = match self.chain.send_raw_transaction(raw).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(nonce, "Batch broadcast failed: {}", e);
                self.registry.release_nonce(role, nonce).await;
                return Err(e);
            }
        };
        info!(
            tx_hash = ?tx_hash,
            recipients = %recipients,
            total_wei = %total,
            gas_limit = %gas_limit,
            "Batch transaction broadcast"
        );

        let receipt = self
            .chain
            .wait_for_receipt(tx_hash, self.confirmations)
            .await?;

        if receipt.status == Some(U64::zero()) {
            let block = receipt
                .block_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(BundlerError::ChainQuery(format!(
                "sendBatch {:?} reverted in block {}",
                tx_hash, block
            )));
        }

        Ok(BatchReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            recipients,
            total,
            gas_limit,
        })
    }
}
