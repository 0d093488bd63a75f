//! Application context shared by the command flows
//!
//! Built once at startup; the chain and relay are trait objects so tests can
//! swap in mocks without any process-wide state.

use crate::bundle::BundleAssembler;
use crate::chain::{ChainClient, ChainProvider};
use crate::config::Settings;
use crate::dispatch::BatchDispatcher;
use crate::error::{BundlerError, BundlerResult};
use crate::identity::IdentityRegistry;
use crate::relay::{BundleRelay, FlashbotsRelay, RelaySubmissionEngine};
use crate::tx::{ContractAddresses, GasPolicy, TransactionBuilder};

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct AppContext {
    pub settings: Settings,
    pub chain: Arc<dyn ChainClient>,
    pub relay: Arc<dyn BundleRelay>,
    pub registry: Arc<IdentityRegistry>,
    pub builder: Arc<TransactionBuilder>,
    pub assembler: Arc<BundleAssembler>,
    pub gas: GasPolicy,
}

impl AppContext {
    /// Connect to the configured node and relay
    pub async fn connect(settings: Settings) -> BundlerResult<Self> {
        let provider = ChainProvider::new(settings.network.clone())?;
        provider.verify_chain_id().await?;
        info!(
            "Connected to {} (chain {})",
            settings.network.name, settings.network.chain_id
        );

        let chain: Arc<dyn ChainClient> = Arc::new(provider);
        let relay = FlashbotsRelay::new(
            &settings.relay,
            chain.clone(),
            Duration::from_millis(settings.bundle.poll_interval_ms),
        )?;
        info!(
            relay = %settings.relay.url,
            auth = ?relay.auth_address(),
            "Relay session established"
        );

        Self::from_parts(settings, chain, Arc::new(relay))
    }

    /// Assemble the context around existing chain and relay clients
    pub fn from_parts(
        settings: Settings,
        chain: Arc<dyn ChainClient>,
        relay: Arc<dyn BundleRelay>,
    ) -> BundlerResult<Self> {
        let chain_id = settings.network.chain_id;
        if chain.chain_id() != chain_id {
            return Err(BundlerError::Config(format!(
                "Chain client is bound to {} but {} is configured",
                chain.chain_id(),
                chain_id
            )));
        }

        let contracts = ContractAddresses {
            bundler: settings
                .bundler_address()
                .map_err(|e| BundlerError::Config(e.to_string()))?,
            token: settings
                .token_address()
                .map_err(|e| BundlerError::Config(e.to_string()))?,
        };

        let registry = Arc::new(IdentityRegistry::from_config(&settings.identities, chain_id)?);
        let gas = GasPolicy::new(&settings.bundle, &settings.batch);
        let builder = Arc::new(TransactionBuilder::new(
            chain.clone(),
            registry.clone(),
            contracts,
            gas.clone(),
        ));
        let assembler = Arc::new(BundleAssembler::new(registry.clone(), gas.clone()));

        Ok(Self {
            settings,
            chain,
            relay,
            registry,
            builder,
            assembler,
            gas,
        })
    }

    pub fn relay_engine(&self) -> RelaySubmissionEngine {
        RelaySubmissionEngine::new(
            self.relay.clone(),
            self.chain.clone(),
            self.assembler.clone(),
            self.settings.bundle.clone(),
        )
        .with_user_stats_v2(self.settings.relay.user_stats_v2)
        .with_simulation(self.settings.relay.simulate)
    }

    pub fn batch_dispatcher(&self) -> BatchDispatcher {
        BatchDispatcher::new(
            self.chain.clone(),
            self.registry.clone(),
            self.builder.clone(),
            self.gas.clone(),
            self.settings.batch.confirmations,
        )
    }
}
