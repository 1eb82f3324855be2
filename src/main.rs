use crate::config::Config;
use crate::error::Result;
use crate::pipeline::Pipeline;
use tracing::info;

mod clients;
mod config;
mod dates;
mod error;
mod fetch;
mod lineups;
mod pipeline;
mod report;
mod scrapers;
mod stats;
mod storage;
mod teams;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let pipeline = Pipeline::new(Config::new()?)?;
    pipeline.run().await?;

    info!("Run completed successfully!");
    Ok(())
}
