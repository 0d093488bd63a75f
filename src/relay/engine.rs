//! Submit/resolve/retry protocol against a private relay

use super::client::simulation_error;
use super::resolution::BundleResolution;
use super::BundleRelay;
use crate::bundle::{BundleAssembler, SignedBundle};
use crate::chain::ChainClient;
use crate::config::BundleConfig;
use crate::error::{BundlerError, BundlerResult};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Final result of a submission cycle that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum BundleOutcome {
    /// The bundle landed in `block`
    Included {
        block: u64,
        attempts: u32,
        bundle_hash: Option<String>,
        submitted_at: DateTime<Utc>,
    },
    /// Every block in the window passed without the bundle
    Expired {
        first_block: u64,
        last_block: u64,
        attempts: u32,
    },
}

/// Drives one bundle through the block-targeted submission window
pub struct RelaySubmissionEngine {
    relay: Arc<dyn BundleRelay>,
    chain: Arc<dyn ChainClient>,
    assembler: Arc<BundleAssembler>,
    config: BundleConfig,
    user_stats_v2: bool,
    simulate: bool,
}

impl RelaySubmissionEngine {
    pub fn new(
        relay: Arc<dyn BundleRelay>,
        chain: Arc<dyn ChainClient>,
        assembler: Arc<BundleAssembler>,
        config: BundleConfig,
    ) -> Self {
        Self {
            relay,
            chain,
            assembler,
            config,
            user_stats_v2: false,
            simulate: false,
        }
    }

    /// Also query the v2 statistics endpoint
    pub fn with_user_stats_v2(mut self, enabled: bool) -> Self {
        self.user_stats_v2 = enabled;
        self
    }

    /// Simulate the bundle before the first submission
    pub fn with_simulation(mut self, enabled: bool) -> Self {
        self.simulate = enabled;
        self
    }

    /// Run a full submission cycle for `bundle`
    pub async fn submit(&self, bundle: SignedBundle) -> BundlerResult<BundleOutcome> {
        let cycle_id = Uuid::new_v4();
        let span = tracing::info_span!("bundle_cycle", %cycle_id);
        self.run_cycle(bundle).instrument(span).await
    }

    async fn run_cycle(&self, bundle: SignedBundle) -> BundlerResult<BundleOutcome> {
        let head = self.chain.block_number().await?;
        self.report_user_stats(head).await;

        let first_block = head + self.config.blocks_in_future;
        let last_block = first_block + u64::from(self.config.max_block_retries);

        if self.simulate {
            let result = self.relay.simulate(&bundle, first_block).await?;
            if let Some(reason) = simulation_error(&result) {
                crate::metrics::record_bundle_outcome("simulation_failed");
                return Err(BundlerError::Simulation(reason));
            }
            info!(block = first_block, "Bundle simulation succeeded");
        }

        let gas = self.assembler.gas_policy();
        let mut current = bundle.clone();
        let submitted_at = Utc::now();

        for retry in 0..=self.config.max_block_retries {
            let target_block = first_block + u64::from(retry);
            let attempt = retry + 1;

            if retry > 0 && gas.escalates() {
                current = self
                    .assembler
                    .reprice(&bundle, gas.price_for_retry(retry))
                    .await?;
            }

            crate::metrics::record_bundle_attempt();
            let receipt = self.relay.send_bundle(&current, target_block).await?;
            info!(
                target_block,
                attempt,
                bundle_hash = receipt.bundle_hash.as_deref().unwrap_or("-"),
                "Bundle submitted"
            );

            let resolution = self.relay.resolve(&current, target_block).await?;
            crate::metrics::record_resolution(&resolution);

            match resolution {
                BundleResolution::Included => {
                    info!(block = target_block, attempt, "Bundle included");
                    crate::metrics::record_bundle_outcome("included");
                    return Ok(BundleOutcome::Included {
                        block: target_block,
                        attempts: attempt,
                        bundle_hash: receipt.bundle_hash,
                        submitted_at,
                    });
                }
                BundleResolution::BlockPassedWithoutInclusion => {
                    warn!(target_block, attempt, "Block passed without inclusion");
                }
                BundleResolution::AccountNonceTooHigh { account } => {
                    error!(
                        target_block,
                        account = ?account,
                        "Account nonce too high, bundle can never land"
                    );
                    crate::metrics::record_bundle_outcome("nonce_conflict");
                    return Err(BundlerError::NonceConflict {
                        account: format!("{:?}", account),
                        target_block,
                    });
                }
            }
        }

        warn!(first_block, last_block, "Bundle window exhausted");
        crate::metrics::record_bundle_outcome("expired");
        Ok(BundleOutcome::Expired {
            first_block,
            last_block,
            attempts: self.config.max_block_retries + 1,
        })
    }

    async fn report_user_stats(&self, head: u64) {
        match self.relay.user_stats(head).await {
            Ok(stats) => info!(%stats, "Relay user stats"),
            Err(e) => warn!("Relay user stats unavailable: {}", e),
        }

        if self.user_stats_v2 {
            match self.relay.user_stats_v2(head).await {
                Ok(stats) => info!(%stats, "Relay user stats v2"),
                Err(e) => warn!("Relay user stats v2 unavailable: {}", e),
            }
        }
    }
}
