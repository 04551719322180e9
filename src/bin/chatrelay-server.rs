// chatrelay server binary

use chatrelay::relay::{RelayServer, ServerCli};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatrelay=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = ServerCli::parse();

    let config = match cli.relay_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let server = match RelayServer::start(&cli.listen, config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    println!("Relay listening on {}", server.local_addr());
    println!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    println!("\nStopping relay...");
    server.shutdown();

    Ok(())
}
