use airq_ingest::cli::{run, Cli};
use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(cli).await.context("airq-ingest run failed")
}
