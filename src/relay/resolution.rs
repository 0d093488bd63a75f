//! Bundle resolution for a single target block

use crate::bundle::SignedBundle;
use crate::chain::ChainClient;
use crate::error::BundlerResult;

use ethers::types::Address;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// What happened to a bundle at its target block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleResolution {
    /// Every bundled transaction is in the target block
    Included,
    /// The target block was produced without the bundle
    BlockPassedWithoutInclusion,
    /// `account` already used a nonce the bundle depends on
    AccountNonceTooHigh { account: Address },
}

impl BundleResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleResolution::Included => "included",
            BundleResolution::BlockPassedWithoutInclusion => "block_passed",
            BundleResolution::AccountNonceTooHigh { .. } => "nonce_too_high",
        }
    }
}

impl fmt::Display for BundleResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Poll the chain until `target_block` is produced and classify the bundle
///
/// While waiting, each signer's on-chain nonce is compared against the lowest
/// nonce it has in the bundle; once it has moved past, the bundle can never land.
pub async fn wait_for_resolution(
    chain: &dyn ChainClient,
    bundle: &SignedBundle,
    target_block: u64,
    poll_interval: Duration,
) -> BundlerResult<BundleResolution> {
    let lowest_nonces = lowest_nonce_per_signer(bundle);

    loop {
        let head = chain.block_number().await?;

        if head < target_block {
            for (account, nonce) in &lowest_nonces {
                let on_chain = chain.transaction_count(*account).await?;
                if on_chain > *nonce {
                    debug!(
                        account = ?account,
                        bundled_nonce = nonce,
                        on_chain,
                        "Bundled nonce already consumed"
                    );
                    return Ok(BundleResolution::AccountNonceTooHigh { account: *account });
                }
            }
        } else if let Some(block_hashes) = chain.block_transaction_hashes(target_block).await? {
            let included = bundle.hashes().iter().all(|h| block_hashes.contains(h));
            return Ok(if included {
                BundleResolution::Included
            } else {
                BundleResolution::BlockPassedWithoutInclusion
            });
        }

        tokio::time::sleep(poll_interval).await;
    }
}

fn lowest_nonce_per_signer(bundle: &SignedBundle) -> Vec<(Address, u64)> {
    let mut lowest: HashMap<Address, u64> = HashMap::new();
    for tx in &bundle.transactions {
        lowest
            .entry(tx.signer)
            .and_modify(|n| *n = (*n).min(tx.nonce))
            .or_insert(tx.nonce);
    }

    // Keep bundle order for deterministic queries
    let mut ordered = Vec::with_capacity(lowest.len());
    for tx in &bundle.transactions {
        if let Some(nonce) = lowest.remove(&tx.signer) {
            ordered.push((tx.signer, nonce));
        }
    }
    ordered
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bundle::BundleTransaction;
    use crate::chain::MockChainClient;
    use crate::identity::IdentityRole;
    use ethers::types::{Bytes, H256, U256};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    pub(crate) fn fake_bundle() -> SignedBundle {
        SignedBundle {
            chain_id: 1,
            transactions: vec![
                BundleTransaction::new(
                    IdentityRole::Token,
                    Address::repeat_byte(1),
                    4,
                    U256::one(),
                    Bytes::from(vec![0xaa]),
                ),
                BundleTransaction::new(
                    IdentityRole::Contract,
                    Address::repeat_byte(2),
                    9,
                    U256::one(),
                    Bytes::from(vec![0xbb]),
                ),
            ],
            plan: Vec::new(),
        }
    }

    fn advancing_chain(start: u64) -> (MockChainClient, Arc<AtomicU64>) {
        let head = Arc::new(AtomicU64::new(start));
        let mut chain = MockChainClient::new();
        let h = head.clone();
        chain
            .expect_block_number()
            .returning(move || Ok(h.fetch_add(1, Ordering::SeqCst)));
        (chain, head)
    }

    #[tokio::test]
    async fn test_included_when_all_hashes_in_block() {
        let bundle = fake_bundle();
        let (mut chain, _) = advancing_chain(10);
        chain.expect_transaction_count().returning(|address| {
            Ok(if address == Address::repeat_byte(1) { 4 } else { 9 })
        });
        let mut hashes = bundle.hashes();
        hashes.insert(0, H256::repeat_byte(7));
        chain
            .expect_block_transaction_hashes()
            .withf(|n| *n == 12)
            .returning(move |_| Ok(Some(hashes.clone())));

        let resolution = wait_for_resolution(&chain, &bundle, 12, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(resolution, BundleResolution::Included);
    }

    #[tokio::test]
    async fn test_block_passed_when_partially_included() {
        let bundle = fake_bundle();
        let (mut chain, _) = advancing_chain(12);
        let first_only = vec![bundle.transactions[0].hash];
        chain
            .expect_block_transaction_hashes()
            .returning(move |_| Ok(Some(first_only.clone())));

        let resolution = wait_for_resolution(&chain, &bundle, 12, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(resolution, BundleResolution::BlockPassedWithoutInclusion);
    }

    #[tokio::test]
    async fn test_nonce_too_high_before_target() {
        let bundle = fake_bundle();
        let (mut chain, _) = advancing_chain(5);
        chain.expect_transaction_count().returning(|address| {
            Ok(if address == Address::repeat_byte(2) { 10 } else { 4 })
        });
        chain.expect_block_transaction_hashes().never();

        let resolution = wait_for_resolution(&chain, &bundle, 50, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(
            resolution,
            BundleResolution::AccountNonceTooHigh {
                account: Address::repeat_byte(2)
            }
        );
    }

    #[tokio::test]
    async fn test_waits_for_block_to_be_served() {
        let bundle = fake_bundle();
        let (mut chain, _) = advancing_chain(20);
        let mut served = false;
        let hashes = bundle.hashes();
        chain.expect_block_transaction_hashes().times(2).returning(move |_| {
            if served {
                Ok(Some(hashes.clone()))
            } else {
                served = true;
                Ok(None)
            }
        });

        let resolution = wait_for_resolution(&chain, &bundle, 20, Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(resolution, BundleResolution::Included);
    }

    #[test]
    fn test_lowest_nonce_per_signer_keeps_order() {
        let mut bundle = fake_bundle();
        bundle.transactions.push(BundleTransaction::new(
            IdentityRole::Token,
            Address::repeat_byte(1),
            5,
            U256::one(),
            Bytes::from(vec![0xcc]),
        ));

        assert_eq!(
            lowest_nonce_per_signer(&bundle),
            vec![(Address::repeat_byte(1), 4), (Address::repeat_byte(2), 9)]
        );
    }
}
