//! The two operator flows: the private bundle and the public batch

use crate::bundle::SignedBundle;
use crate::context::AppContext;
use crate::dispatch::BatchReceipt;
use crate::error::{BundlerError, BundlerResult};
use crate::relay::BundleOutcome;
use crate::tx::units::{parse_amount, parse_bounded_amount, parse_ether, ETHER_DECIMALS};
use crate::tx::{ContractCall, PlannedTransaction};

use tracing::{info, warn};

/// Open trading and swap-and-distribute atomically through the relay
///
/// `max_tx` is in token units, `eth` is the value forwarded to the bundler
/// contract. An exhausted block window is reported as
/// [`BundlerError::BundleNotIncluded`].
pub async fn run_bundle(ctx: &AppContext, max_tx: &str, eth: &str) -> BundlerResult<BundleOutcome> {
    let bundle = prepare_bundle(ctx, max_tx, eth).await?;
    info!(
        transactions = bundle.len(),
        max_gas_cost_wei = %bundle.max_gas_cost(),
        "Bundle ready for submission"
    );

    match ctx.relay_engine().submit(bundle).await? {
        BundleOutcome::Expired {
            first_block,
            last_block,
            attempts,
        } => Err(BundlerError::BundleNotIncluded {
            first_block,
            last_block,
            attempts,
        }),
        included => Ok(included),
    }
}

/// Pay `amount` ether to every registered recipient
pub async fn run_batch(ctx: &AppContext, amount: &str) -> BundlerResult<BatchReceipt> {
    let input = amount;
    let amount = parse_bounded_amount(input, &ctx.settings.batch.max_amount, ETHER_DECIMALS)?;
    if amount.is_zero() {
        return Err(BundlerError::InvalidAmount {
            input: input.to_string(),
            reason: "batch amount must be positive".to_string(),
        });
    }
    ctx.batch_dispatcher().send_batch(amount).await
}

async fn prepare_bundle(ctx: &AppContext, max_tx: &str, eth: &str) -> BundlerResult<SignedBundle> {
    let decimals = ctx.builder.token_decimals().await?;
    let max_tx = parse_amount(max_tx, decimals)?;
    let fee = parse_ether(&ctx.settings.bundle.swap_fee_eth)?;
    let value = parse_bounded_amount(eth, &ctx.settings.bundle.max_eth_amount, ETHER_DECIMALS)?;

    let open = ctx.builder.build(ContractCall::OpenTrading).await?;
    let swap = ctx
        .builder
        .build(ContractCall::SwapAndDistribute {
            max_tx,
            fee,
            token: ctx.builder.contracts().token,
            value,
        })
        .await;
    let swap = match swap {
        Ok(swap) => swap,
        Err(e) => {
            release(ctx, &[&open]).await;
            return Err(e);
        }
    };

    let plan = vec![open, swap];
    match ctx.assembler.assemble(plan.clone()).await {
        Ok(bundle) => Ok(bundle),
        Err(e) => {
            release(ctx, &plan.iter().collect::<Vec<_>>()).await;
            Err(e)
        }
    }
}

async fn release(ctx: &AppContext, planned: &[&PlannedTransaction]) {
    for tx in planned.iter().rev() {
        if let Some(nonce) = tx.nonce() {
            warn!(identity = %tx.role, nonce = nonce.as_u64(), "Releasing unused nonce");
            ctx.registry.release_nonce(tx.role, nonce.as_u64()).await;
        }
    }
}
