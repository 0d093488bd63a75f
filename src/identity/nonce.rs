//! Per-identity nonce sequencing
//!
//! Handles:
//! - Serialized nonce allocation per identity (single writer)
//! - Re-reading the chain at every allocation
//! - Releasing nonces of transactions that never left the process

use super::IdentityRole;
use crate::chain::ChainClient;
use crate::error::BundlerResult;

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-identity nonce state
#[derive(Debug, Default)]
struct IdentityNonceState {
    /// Next nonce to hand out (0 until the first allocation)
    next: u64,
    /// Last on-chain value observed
    observed: u64,
}

/// Allocates nonces for the registered identities
pub struct NonceManager {
    /// Per-identity state, each behind its own lock
    identity_state: DashMap<IdentityRole, Arc<Mutex<IdentityNonceState>>>,
}

impl NonceManager {
    /// Create a new nonce manager
    pub fn new() -> Self {
        Self {
            identity_state: DashMap::new(),
        }
    }

    fn state(&self, role: IdentityRole) -> Arc<Mutex<IdentityNonceState>> {
        self.identity_state
            .entry(role)
            .or_insert_with(|| Arc::new(Mutex::new(IdentityNonceState::default())))
            .clone()
    }

    /// Allocate the next nonce for an identity
    ///
    /// The chain is queried while the identity's lock is held, so two allocations
    /// for the same identity never observe the same value.
    pub async fn allocate(
        &self,
        role: IdentityRole,
        address: Address,
        chain: &dyn ChainClient,
    ) -> BundlerResult<u64> {
        let state = self.state(role);
        let mut state = state.lock().await;

        let on_chain = chain.transaction_count(address).await?;
        if on_chain < state.observed {
            warn!(
                "On-chain nonce for {} identity went backwards: {} -> {}",
                role, state.observed, on_chain
            );
        }
        state.observed = on_chain;

        let nonce = on_chain.max(state.next);
        state.next = nonce + 1;

        crate::metrics::record_nonce_allocated(role);
        debug!("Allocated nonce {} for {} identity ({:?})", nonce, role, address);
        Ok(nonce)
    }

    /// Release a nonce (transaction never broadcast, can be reused)
    pub async fn release(&self, role: IdentityRole, nonce: u64) {
        let state = self.state(role);
        let mut state = state.lock().await;

        // Only the most recent allocation can be rolled back
        if state.next == nonce + 1 {
            state.next = nonce;
            debug!("Released nonce {} for {} identity", nonce, role);
        }
    }
}

impl Default for NonceManager {
    fn default() -> Self {
        Self::new()
    }
}
