use anyhow::{Context, Result};
use catalog_images::config::setup_logging;
use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = catalog_images::cli::CliOptions::parse();

    setup_logging(cli.debug).context("Failed to set up logging")?;

    if let Some(summary) = catalog_images::commands::run(&cli)
        .await
        .context("Run aborted")?
    {
        summary.log();
    }
    Ok(())
}
