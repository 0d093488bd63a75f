//! Orders and signs planned transactions into a bundle

use super::types::{BundleTransaction, SignedBundle};
use crate::error::{BundlerError, BundlerResult};
use crate::identity::{IdentityRegistry, IdentityRole};
use crate::tx::{GasPolicy, PlannedTransaction};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Signs an ordered plan under the owning identities at a uniform legacy gas price
pub struct BundleAssembler {
    registry: Arc<IdentityRegistry>,
    gas: GasPolicy,
}

impl BundleAssembler {
    pub fn new(registry: Arc<IdentityRegistry>, gas: GasPolicy) -> Self {
        Self { registry, gas }
    }

    pub fn gas_policy(&self) -> &GasPolicy {
        &self.gas
    }

    /// Sign `plan` in the given order at the configured bundle gas price
    pub async fn assemble(&self, plan: Vec<PlannedTransaction>) -> BundlerResult<SignedBundle> {
        let bundle = self.sign_at(plan, self.gas.bundle_gas_price()).await?;

        info!(
            transactions = bundle.len(),
            chain_id = bundle.chain_id,
            max_gas_cost = %bundle.max_gas_cost(),
            "Bundle assembled"
        );
        Ok(bundle)
    }

    /// Re-sign an existing bundle at a new default gas price
    ///
    /// Per-request overrides still win; nonces and order are unchanged.
    pub async fn reprice(
        &self,
        bundle: &SignedBundle,
        gas_price: U256,
    ) -> BundlerResult<SignedBundle> {
        self.sign_at(bundle.plan.clone(), gas_price).await
    }

    async fn sign_at(
        &self,
        plan: Vec<PlannedTransaction>,
        default_gas_price: U256,
    ) -> BundlerResult<SignedBundle> {
        let chain_id = self.validate(&plan)?;

        let mut transactions = Vec::with_capacity(plan.len());
        for (index, planned) in plan.iter().enumerate() {
            let gas_price = planned.gas_price_override.unwrap_or(default_gas_price);
            let request = planned.request.clone().gas_price(gas_price);
            let tx = TypedTransaction::Legacy(request);

            let raw = self.registry.sign(planned.role, &tx).await.map_err(|e| {
                BundlerError::Assembly(format!(
                    "Failed to sign {} (position {}): {}",
                    planned.call, index, e
                ))
            })?;

            let nonce = planned.nonce().unwrap_or_default().as_u64();
            let signed = BundleTransaction::new(
                planned.role,
                self.registry.address(planned.role),
                nonce,
                gas_price,
                raw,
            );
            debug!(
                position = index,
                call = planned.call,
                identity = %planned.role,
                nonce,
                hash = ?signed.hash,
                "Signed bundle transaction"
            );
            transactions.push(signed);
        }

        Ok(SignedBundle {
            chain_id,
            transactions,
            plan,
        })
    }

    /// Check the plan can form a valid bundle; returns its chain id
    fn validate(&self, plan: &[PlannedTransaction]) -> BundlerResult<u64> {
        if plan.is_empty() {
            return Err(BundlerError::Assembly("Bundle is empty".to_string()));
        }

        let chain_id = self.registry.chain_id();
        let mut last_nonce: HashMap<IdentityRole, u64> = HashMap::new();

        for (index, planned) in plan.iter().enumerate() {
            match planned.chain_id() {
                Some(id) if id == chain_id => {}
                other => {
                    return Err(BundlerError::Assembly(format!(
                        "{} at position {} targets chain {:?}, bundle chain is {}",
                        planned.call, index, other, chain_id
                    )))
                }
            }

            let nonce = planned
                .nonce()
                .ok_or_else(|| {
                    BundlerError::Assembly(format!(
                        "{} at position {} has no nonce",
                        planned.call, index
                    ))
                })?
                .as_u64();

            if let Some(previous) = last_nonce.insert(planned.role, nonce) {
                if nonce != previous + 1 {
                    return Err(BundlerError::Assembly(format!(
                        "{} identity nonces must increase by one in bundle order: {} then {}",
                        planned.role, previous, nonce
                    )));
                }
            }
        }

        Ok(chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, BundleConfig};
    use crate::identity::tests::test_registry;
    use crate::tx::units::gwei;
    use ethers::types::{Address, Bytes, NameOrAddress, TransactionRequest};
    use ethers::utils::rlp::Rlp;

    const CHAIN_ID: u64 = 11155111;

    fn assembler() -> BundleAssembler {
        BundleAssembler::new(
            Arc::new(test_registry(CHAIN_ID)),
            GasPolicy::new(&BundleConfig::default(), &BatchConfig::default()),
        )
    }

    fn planned(role: IdentityRole, to: u8, nonce: u64, data: &[u8]) -> PlannedTransaction {
        PlannedTransaction {
            role,
            call: "test",
            request: TransactionRequest::new()
                .to(Address::repeat_byte(to))
                .data(Bytes::from(data.to_vec()))
                .value(0u64)
                .gas(100_000u64)
                .nonce(nonce)
                .chain_id(CHAIN_ID),
            gas_price_override: None,
        }
    }

    fn decode(raw: &Bytes) -> TypedTransaction {
        TypedTransaction::decode_signed(&Rlp::new(raw.as_ref())).unwrap().0
    }

    #[tokio::test]
    async fn test_order_is_preserved() {
        let plan = vec![
            planned(IdentityRole::Token, 0x94, 7, &[1]),
            planned(IdentityRole::Contract, 0xb7, 2, &[2]),
            planned(IdentityRole::Contract, 0xb7, 3, &[3]),
            planned(IdentityRole::Token, 0x11, 8, &[4]),
        ];

        let bundle = assembler().assemble(plan.clone()).await.unwrap();

        assert_eq!(bundle.len(), 4);
        for (signed, expected) in bundle.transactions.iter().zip(&plan) {
            let decoded = decode(&signed.raw);
            assert_eq!(decoded.to(), expected.request.to.as_ref());
            assert_eq!(decoded.data(), expected.request.data.as_ref());
            assert_eq!(decoded.nonce(), expected.request.nonce.as_ref());
            assert_eq!(decoded.gas_price(), Some(gwei(24)));
            assert_eq!(signed.role, expected.role);
        }
        assert_eq!(
            bundle.transactions[0].signer,
            test_registry(CHAIN_ID).address(IdentityRole::Token)
        );
    }

    #[tokio::test]
    async fn test_rejects_nonce_gap_for_same_identity() {
        let plan = vec![
            planned(IdentityRole::Contract, 0xb7, 2, &[]),
            planned(IdentityRole::Contract, 0xb7, 4, &[]),
        ];
        let err = assembler().assemble(plan).await.unwrap_err();
        assert!(matches!(err, BundlerError::Assembly(msg) if msg.contains("increase by one")));
    }

    #[tokio::test]
    async fn test_rejects_repeated_nonce() {
        let plan = vec![
            planned(IdentityRole::Token, 0x94, 5, &[]),
            planned(IdentityRole::Token, 0x94, 5, &[]),
        ];
        assert!(matches!(
            assembler().assemble(plan).await,
            Err(BundlerError::Assembly(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_empty_bundle() {
        assert!(matches!(
            assembler().assemble(Vec::new()).await,
            Err(BundlerError::Assembly(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_mixed_chains() {
        let mut foreign = planned(IdentityRole::Contract, 0xb7, 1, &[]);
        foreign.request = foreign.request.chain_id(1u64);
        let plan = vec![planned(IdentityRole::Token, 0x94, 0, &[]), foreign];

        assert!(matches!(
            assembler().assemble(plan).await,
            Err(BundlerError::Assembly(_))
        ));
    }

    #[tokio::test]
    async fn test_gas_price_override_is_kept() {
        let plan = vec![
            planned(IdentityRole::Token, 0x94, 0, &[]),
            planned(IdentityRole::Contract, 0xb7, 0, &[]).with_gas_price(gwei(50)),
        ];
        let bundle = assembler().assemble(plan).await.unwrap();

        assert_eq!(bundle.transactions[0].gas_price, gwei(24));
        assert_eq!(bundle.transactions[1].gas_price, gwei(50));
    }

    #[tokio::test]
    async fn test_reprice_keeps_nonces_and_order() {
        let assembler = assembler();
        let plan = vec![
            planned(IdentityRole::Token, 0x94, 0, &[1]),
            planned(IdentityRole::Contract, 0xb7, 9, &[2]),
        ];
        let bundle = assembler.assemble(plan).await.unwrap();
        let repriced = assembler.reprice(&bundle, gwei(30)).await.unwrap();

        assert_ne!(bundle.raw_transactions(), repriced.raw_transactions());
        for (a, b) in bundle.transactions.iter().zip(&repriced.transactions) {
            assert_eq!(a.nonce, b.nonce);
            assert_eq!(a.role, b.role);
            assert_eq!(b.gas_price, gwei(30));
        }
        assert_eq!(
            decode(&repriced.transactions[1].raw).to(),
            Some(&NameOrAddress::Address(Address::repeat_byte(0xb7)))
        );
    }
}
