//! # dualcam CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 配置信息展示
//! - 基于模拟相机的实时采集演示

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_simulate, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "dualcam CLI starting");

    let result = match &cli.command {
        Commands::Simulate(args) => run_simulate(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    let config = observability::ObservabilityConfig::from_verbosity(cli.verbose, cli.quiet)
        .with_format(cli.log_format.into());
    observability::init_with_config(config)
}
