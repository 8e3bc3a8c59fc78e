//! Minimal demonstration binary: starts a node from CLI flags and logs
//! peer lifecycle events until interrupted.

use clap::Parser;
use network::{Config, FileSecretsManager, NullMetrics, Server};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "node", about = "Runs a peer-to-peer networking node")]
struct Args {
    #[arg(long, default_value = "0.0.0.0")]
    listen_addr: IpAddr,

    #[arg(long, default_value_t = network::DEFAULT_LISTEN_PORT)]
    listen_port: u16,

    #[arg(long)]
    bootnode: Vec<String>,

    #[arg(long)]
    no_discover: bool,

    #[arg(long, default_value = "./data")]
    data_dir: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config {
        listen_addr: args.listen_addr,
        listen_port: args.listen_port,
        no_discover: args.no_discover,
        bootnodes: args.bootnode,
        ..Config::default()
    };

    let secrets = FileSecretsManager::new(args.data_dir);
    let server = Server::new(config, &secrets, Arc::new(NullMetrics))?;

    let mut events = server.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::info!(?event, "peer event");
        }
    });

    server.start().await?;
    tracing::info!(peers = server.num_peers(), "node started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.close();
    Ok(())
}
