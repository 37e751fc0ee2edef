use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// lister: dry-run market listings and risk parameters against a network.
#[derive(Parser, Debug)]
#[command(name = "lister", version)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply a deployment plan and print the resulting market table
    Check(CheckArgs),

    /// Apply a deployment plan and print the margin engine updates it produces
    Plan(CheckArgs),

    /// Compute a margin or liquidation premium
    Premium(PremiumArgs),

    /// Print aggregated prices for tokens after applying a plan
    Price(PriceArgs),
}

/// Network and plan files.
#[derive(Args, Debug, Clone)]
pub struct DeploymentArgs {
    /// Network config JSON
    #[arg(long, env = "LISTER_NETWORK")]
    pub network: PathBuf,

    /// Deployment plan JSON
    #[arg(long, env = "LISTER_PLAN")]
    pub plan: PathBuf,
}

/// Arguments for the `check` and `plan` subcommands.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub deployment: DeploymentArgs,

    /// Output as JSON instead of TSV
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `premium` subcommand.
#[derive(Parser, Debug)]
pub struct PremiumArgs {
    /// Protocol base value (e.g. 115% collateralization, or 5% spread with --liquidation)
    #[arg(long)]
    pub base: String,

    /// Target value, or "base"
    #[arg(long)]
    pub target: String,

    /// Treat base/target as liquidation spread/penalty
    #[arg(long)]
    pub liquidation: bool,
}

/// Arguments for the `price` subcommand.
#[derive(Parser, Debug)]
pub struct PriceArgs {
    #[command(flatten)]
    pub deployment: DeploymentArgs,

    /// Token symbols (e.g. WETH USDC)
    #[arg(required = true)]
    pub symbols: Vec<String>,

    /// Re-read prices every N milliseconds until interrupted
    #[arg(long)]
    pub watch_ms: Option<u64>,

    /// Output as JSON instead of TSV
    #[arg(long)]
    pub json: bool,
}
