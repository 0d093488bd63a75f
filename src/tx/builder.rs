//! Builds unsigned transaction requests for the contract calls the flows make

use crate::chain::contracts::{
    DecimalsCall, DecimalsReturn, GetRecipientCountCall, GetRecipientCountReturn,
    OpenTradingCall, SendBatchCall, SwapAndDistributeCall,
};
use crate::chain::ChainClient;
use crate::error::{BundlerError, BundlerResult};
use crate::identity::{IdentityRegistry, IdentityRole};
use crate::tx::gas::GasPolicy;

use ethers::abi::{AbiDecode, AbiEncode};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use std::sync::Arc;
use tracing::debug;

/// Addresses of the two contracts the flows call
#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    pub bundler: Address,
    pub token: Address,
}

/// A logical contract operation
#[derive(Debug, Clone, PartialEq)]
pub enum ContractCall {
    /// `token.openTrading()`
    OpenTrading,
    /// `bundler.swapAndDistribute(maxTx, fee, token)` carrying `value` wei
    SwapAndDistribute {
        max_tx: U256,
        fee: U256,
        token: Address,
        value: U256,
    },
    /// `bundler.sendBatch(amount)` carrying `value` wei
    SendBatch { amount: U256, value: U256 },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            ContractCall::OpenTrading => "openTrading",
            ContractCall::SwapAndDistribute { .. } => "swapAndDistribute",
            ContractCall::SendBatch { .. } => "sendBatch",
        }
    }

    /// Identity that owns this call
    pub fn owner(&self) -> IdentityRole {
        match self {
            ContractCall::OpenTrading => IdentityRole::Token,
            ContractCall::SwapAndDistribute { .. } | ContractCall::SendBatch { .. } => {
                IdentityRole::Contract
            }
        }
    }

    fn value(&self) -> U256 {
        match self {
            ContractCall::OpenTrading => U256::zero(),
            ContractCall::SwapAndDistribute { value, .. } | ContractCall::SendBatch { value, .. } => {
                *value
            }
        }
    }

    /// ABI-encode the call data
    pub fn encode(&self) -> BundlerResult<Bytes> {
        let data = match self {
            ContractCall::OpenTrading => OpenTradingCall.encode(),
            ContractCall::SwapAndDistribute {
                max_tx, fee, token, ..
            } => {
                if token.is_zero() {
                    return Err(BundlerError::Encoding(
                        "swapAndDistribute token address is zero".to_string(),
                    ));
                }
                SwapAndDistributeCall {
                    max_tx: *max_tx,
                    fee: *fee,
                    token: *token,
                }
                .encode()
            }
            ContractCall::SendBatch { amount, .. } => {
                if amount.is_zero() {
                    return Err(BundlerError::Encoding(
                        "sendBatch amount must be positive".to_string(),
                    ));
                }
                SendBatchCall { amount: *amount }.encode()
            }
        };
        Ok(data.into())
    }
}

/// An unsigned request plus the identity that must sign it
#[derive(Debug, Clone)]
pub struct PlannedTransaction {
    pub role: IdentityRole,
    pub call: &'static str,
    pub request: TransactionRequest,
    /// Replaces the bundle-wide gas price for this request only
    pub gas_price_override: Option<U256>,
}

impl PlannedTransaction {
    pub fn nonce(&self) -> Option<U256> {
        self.request.nonce
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.request.chain_id.map(|id| id.as_u64())
    }

    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price_override = Some(gas_price);
        self
    }
}

/// Produces nonce-stamped transaction requests for contract calls
pub struct TransactionBuilder {
    chain: Arc<dyn ChainClient>,
    registry: Arc<IdentityRegistry>,
    contracts: ContractAddresses,
    gas: GasPolicy,
}

impl TransactionBuilder {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        registry: Arc<IdentityRegistry>,
        contracts: ContractAddresses,
        gas: GasPolicy,
    ) -> Self {
        Self {
            chain,
            registry,
            contracts,
            gas,
        }
    }

    pub fn contracts(&self) -> ContractAddresses {
        self.contracts
    }

    /// Token precision as reported by the token contract
    pub async fn token_decimals(&self) -> BundlerResult<u32> {
        let tx = self.read_call(self.contracts.token, DecimalsCall.encode());
        let raw = self.chain.call(&tx).await?;

        let decimals = DecimalsReturn::decode(raw.as_ref())
            .map_err(|e| BundlerError::ChainQuery(format!("Invalid decimals() response: {}", e)))?;
        Ok(decimals.0 as u32)
    }

    /// Number of batch recipients registered on the bundler contract
    pub async fn recipient_count(&self) -> BundlerResult<U256> {
        let tx = self.read_call(self.contracts.bundler, GetRecipientCountCall.encode());
        let raw = self.chain.call(&tx).await?;

        let count = GetRecipientCountReturn::decode(raw.as_ref()).map_err(|e| {
            BundlerError::ChainQuery(format!("Invalid getRecipientCount() response: {}", e))
        })?;
        Ok(count.0)
    }

    /// Build the request for `call`, allocating the owner's next nonce
    pub async fn build(&self, call: ContractCall) -> BundlerResult<PlannedTransaction> {
        let data = call.encode()?;
        let role = call.owner();

        let (to, gas_limit) = match call {
            ContractCall::OpenTrading => (self.contracts.token, Some(self.gas.open_trading_gas_limit)),
            ContractCall::SwapAndDistribute { .. } => {
                (self.contracts.bundler, Some(self.gas.swap_gas_limit))
            }
            // Estimated by the dispatcher
            ContractCall::SendBatch { .. } => (self.contracts.bundler, None),
        };

        let nonce = self.registry.nonce_for(role, self.chain.as_ref()).await?;

        let mut request = TransactionRequest::new()
            .from(self.registry.address(role))
            .to(to)
            .data(data)
            .value(call.value())
            .nonce(nonce)
            .chain_id(self.chain.chain_id());
        if let Some(gas_limit) = gas_limit {
            request = request.gas(gas_limit);
        }

        debug!(
            call = call.name(),
            identity = %role,
            nonce,
            to = ?to,
            "Built transaction request"
        );

        Ok(PlannedTransaction {
            role,
            call: call.name(),
            request,
            gas_price_override: None,
        })
    }

    fn read_call(&self, to: Address, data: Vec<u8>) -> TypedTransaction {
        TransactionRequest::new()
            .to(to)
            .data(data)
            .chain_id(self.chain.chain_id())
            .into()
    }
}
