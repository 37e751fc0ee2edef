use std::io;
use std::sync::Arc;
use std::time::Duration;

use marginkit::{
    liquidation_premium, margin_premium, Address, CollateralRatio, DeploymentPlan, NetworkConfig,
    Premium, Ratio, RecordingMarginEngine, RiskEngine, TargetCollateralization,
    TargetLiquidationPenalty,
};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{CheckArgs, DeploymentArgs, PremiumArgs, PriceArgs};
use crate::error::{ListerError, Result};
use crate::output;

/// A plan applied to a fresh engine backed by an in-memory margin engine.
pub struct Deployment {
    pub network: Arc<NetworkConfig>,
    pub margin: Arc<RecordingMarginEngine>,
    pub engine: RiskEngine,
}

pub async fn deploy(args: &DeploymentArgs) -> Result<Deployment> {
    let network = Arc::new(NetworkConfig::load(&args.network)?);
    let plan = DeploymentPlan::load(&args.plan)?;
    info!(
        network = %network.name,
        plan = %args.plan.display(),
        markets = plan.markets.len(),
        "applying deployment plan"
    );

    let margin = Arc::new(RecordingMarginEngine::new(network.base_rates));
    let engine = RiskEngine::new(Arc::clone(&network), margin.clone());
    plan.apply(&engine, &network).await?;

    Ok(Deployment {
        network,
        margin,
        engine,
    })
}

pub async fn run_check(args: CheckArgs) -> Result<()> {
    let deployment = deploy(&args.deployment).await?;
    let views = deployment.engine.market_views();
    let mut buf = String::with_capacity(256);
    output::write_markets(&views, args.json, &mut buf, &mut io::stdout().lock())
}

pub async fn run_plan(args: CheckArgs) -> Result<()> {
    let deployment = deploy(&args.deployment).await?;
    let updates = deployment.margin.updates().await;
    let mut buf = String::with_capacity(256);
    output::write_updates(&updates, args.json, &mut buf, &mut io::stdout().lock())
}

/// Premium for the requested base and target.
pub fn premium(args: &PremiumArgs) -> Result<Premium> {
    let premium = if args.liquidation {
        let base: Ratio = args.base.parse()?;
        let target: TargetLiquidationPenalty = args.target.parse()?;
        liquidation_premium(&base, target)?
    } else {
        let base: CollateralRatio = args.base.parse()?;
        let target: TargetCollateralization = args.target.parse()?;
        margin_premium(&base, target)?
    };
    Ok(premium)
}

pub fn run_premium(args: PremiumArgs) -> Result<()> {
    let premium = premium(&args)?;
    let mut buf = String::new();
    output::write_premium(premium, &mut buf, &mut io::stdout().lock())
}

pub async fn run_price(args: PriceArgs, cancel: CancellationToken) -> Result<()> {
    let deployment = deploy(&args.deployment).await?;
    let tokens = args
        .symbols
        .iter()
        .map(|s| -> Result<(String, Address)> {
            let token = deployment.network.token(s)?;
            Ok((token.symbol.clone(), token.address.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut buf = String::with_capacity(256);

    let Some(watch_ms) = args.watch_ms else {
        for (symbol, address) in &tokens {
            let price = deployment.engine.get_price(address).await?;
            output::write_price(symbol, &price, args.json, &mut buf, &mut io::stdout().lock())?;
        }
        return Ok(());
    };
    if watch_ms == 0 {
        return Err(ListerError::ZeroInterval);
    }

    info!(symbols = ?args.symbols, watch_ms, "watching prices");
    let mut ticker = tokio::time::interval(Duration::from_millis(watch_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("price watch stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        for (symbol, address) in &tokens {
            match deployment.engine.get_price(address).await {
                Ok(price) => {
                    output::write_price(symbol, &price, args.json, &mut buf, &mut io::stdout().lock())?;
                }
                Err(e) => warn!(symbol = %symbol, error = %e, "price read failed"),
            }
        }
    }
}
