//! Bundle data types

use crate::identity::IdentityRole;
use crate::tx::PlannedTransaction;

use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

/// One signed member of a bundle
#[derive(Debug, Clone)]
pub struct BundleTransaction {
    pub role: IdentityRole,
    pub signer: Address,
    pub nonce: u64,
    pub gas_price: U256,
    /// RLP-encoded signed transaction
    pub raw: Bytes,
    pub hash: H256,
}

impl BundleTransaction {
    pub fn new(
        role: IdentityRole,
        signer: Address,
        nonce: u64,
        gas_price: U256,
        raw: Bytes,
    ) -> Self {
        let hash = H256::from(keccak256(raw.as_ref()));
        Self {
            role,
            signer,
            nonce,
            gas_price,
            raw,
            hash,
        }
    }

    /// Hex form sent to the relay
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(self.raw.as_ref()))
    }
}

/// An ordered, signed bundle for a single chain
#[derive(Debug, Clone)]
pub struct SignedBundle {
    pub chain_id: u64,
    /// Signed members, in execution order
    pub transactions: Vec<BundleTransaction>,
    /// The unsigned requests, kept for re-pricing
    pub(crate) plan: Vec<PlannedTransaction>,
}

impl SignedBundle {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn raw_transactions(&self) -> Vec<String> {
        self.transactions.iter().map(|tx| tx.raw_hex()).collect()
    }

    pub fn hashes(&self) -> Vec<H256> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }

    /// Upper bound on what the bundle can cost in gas fees
    pub fn max_gas_cost(&self) -> U256 {
        self.plan
            .iter()
            .zip(&self.transactions)
            .map(|(planned, signed)| {
                crate::tx::GasPolicy::calculate_cost(
                    planned.request.gas.unwrap_or_default(),
                    signed.gas_price,
                )
            })
            .fold(U256::zero(), |acc, cost| acc + cost)
    }
}
