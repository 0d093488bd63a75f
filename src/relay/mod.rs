//! Private relay submission
//!
//! The relay module:
//! 1. Authenticates requests with a reputation key unrelated to the signers
//! 2. Sends a signed bundle for exactly one target block
//! 3. Resolves whether the bundle landed in that block
//! 4. Walks the target forward block by block until inclusion, a fatal answer,
//!    or the retry window is exhausted

mod client;
mod engine;
mod resolution;

pub use client::FlashbotsRelay;
pub use engine::{BundleOutcome, RelaySubmissionEngine};
pub use resolution::BundleResolution;

use crate::bundle::SignedBundle;
use crate::error::BundlerResult;

use async_trait::async_trait;
use serde_json::Value;

/// Relay acknowledgement of a submitted bundle
#[derive(Debug, Clone, PartialEq)]
pub struct BundleReceipt {
    pub bundle_hash: Option<String>,
    pub target_block: u64,
}

/// Operations a private bundle relay offers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submit `bundle` for inclusion in `target_block` only
    async fn send_bundle(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> BundlerResult<BundleReceipt>;

    /// Simulate `bundle` on top of the latest state as if mined in `target_block`
    async fn simulate(&self, bundle: &SignedBundle, target_block: u64) -> BundlerResult<Value>;

    /// Wait for `target_block` and report what happened to `bundle`
    async fn resolve(
        &self,
        bundle: &SignedBundle,
        target_block: u64,
    ) -> BundlerResult<BundleResolution>;

    /// Reputation statistics for the auth key
    async fn user_stats(&self, block_number: u64) -> BundlerResult<Value>;

    /// Reputation statistics, v2 format
    async fn user_stats_v2(&self, block_number: u64) -> BundlerResult<Value>;
}
