// JDWP spy - watch a debugger talk to a JVM
//
// Relays a JDWP session unchanged and prints every command/reply pair and
// every event set that goes past

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod config;
mod format;
mod spy;

use config::SpyConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = SpyConfig::parse();

    // Tracing to stderr only - stdout carries the recorded conversations
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jdwp_spy=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting JDWP spy...");

    spy::run(config).await?;

    info!("JDWP spy shutting down");
    Ok(())
}
