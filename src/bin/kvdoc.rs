//! kvdoc CLI Binary

use anyhow::Context;
use clap::Parser;
use kvdoc::cli::{Cli, RunContext};
use kvdoc::logging::init_logging;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let context = RunContext::new(&cli).context("Failed to load configuration")?;
    init_logging(Some(&context.config().logging)).context("Failed to initialize logging")?;
    info!("kvdoc CLI starting");

    match context.execute(&cli.command).await {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            Err(e.into())
        }
    }
}
