use chain_node::{app, peers, AppState};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{info, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Peer base URL to register at startup (repeatable)
    #[arg(long)]
    peer: Vec<String>,

    /// Seconds between automatic reconciliation passes (0 disables them)
    #[arg(long, default_value_t = 0)]
    sync_interval_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let state = AppState::new()?;

    if !args.peer.is_empty() {
        let mut registry = state.peers.write().await;
        for peer in &args.peer {
            registry.register(peer.trim_end_matches('/'));
        }
        info!("registered {} startup peer(s)", registry.len());
    }

    if args.sync_interval_secs > 0 {
        let state = state.clone();
        let period = Duration::from_secs(args.sync_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it so a freshly
            // started node gets a chance to serve before it syncs.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                peers::run_reconciliation(&state).await;
            }
        });
    }

    let addr: SocketAddr = args.listen.parse()?;
    info!("chain-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app(state)).await?;
    Ok(())
}
