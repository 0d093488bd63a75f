//! Legacy gas-price policy for bundles and batch sends

use super::units::gwei;
use crate::config::{BatchConfig, BundleConfig};

use ethers::types::U256;
use tracing::debug;

/// Fixed legacy gas pricing with an optional per-retry escalation
#[derive(Debug, Clone)]
pub struct GasPolicy {
    /// Price applied to every bundled transaction without an override
    bundle_gas_price: U256,
    /// Price used for the public batch send
    batch_gas_price: U256,
    /// Increase per retry in percent (0 = resubmit unchanged)
    bump_percent: u64,
    /// Gas limit for `openTrading`
    pub open_trading_gas_limit: U256,
    /// Gas limit for `swapAndDistribute`
    pub swap_gas_limit: U256,
}

impl GasPolicy {
    /// Create a policy from configuration
    pub fn new(bundle: &BundleConfig, batch: &BatchConfig) -> Self {
        Self {
            bundle_gas_price: gwei(bundle.legacy_gas_price_gwei),
            batch_gas_price: gwei(batch.gas_price_gwei),
            bump_percent: bundle.gas_price_bump_percent,
            open_trading_gas_limit: U256::from(bundle.open_trading_gas_limit),
            swap_gas_limit: U256::from(bundle.swap_gas_limit),
        }
    }

    pub fn bundle_gas_price(&self) -> U256 {
        self.bundle_gas_price
    }

    pub fn batch_gas_price(&self) -> U256 {
        self.batch_gas_price
    }

    /// Whether retries must re-sign the bundle at a higher price
    pub fn escalates(&self) -> bool {
        self.bump_percent > 0
    }

    /// Gas price for a given retry (0 = first submission), compounding per retry
    pub fn price_for_retry(&self, retry: u32) -> U256 {
        let factor = 100 + self.bump_percent;
        let price = (0..retry).fold(self.bundle_gas_price, |price, _| price * factor / 100);

        debug!("Gas price for retry {}: {} wei", retry, price);
        price
    }

    /// Calculate total cost in wei
    pub fn calculate_cost(gas_limit: U256, gas_price: U256) -> U256 {
        gas_limit * gas_price
    }
}
