use anyhow::Result;
use chain_core::{chain::Chain, sync::ChainSnapshot};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chain-cli")]
#[command(about = "CLI client for the record ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction record
    Submit {
        /// Sender
        #[arg(long)]
        sender: String,
        /// Recipient
        #[arg(long)]
        receiver: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Submit an identity record (one per id)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        gender: String,
        #[arg(long)]
        dob: String,
        #[arg(long)]
        address: String,
    },
    /// Print the node's chain snapshot
    Chain,
    /// Register peer addresses with the node
    AddPeer {
        /// Peer base URL (repeatable)
        #[arg(long, required = true)]
        peer: Vec<String>,
    },
    /// Trigger one reconciliation pass on the node
    Resolve,
    /// Fetch the node's chain and re-validate it locally
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let node = cli.node.trim_end_matches('/').to_string();

    match cli.cmd {
        Command::Submit {
            sender,
            receiver,
            amount,
        } => {
            let body = json!({ "sender": sender, "receiver": receiver, "amount": amount });
            post_and_print(&client, &format!("{node}/add_block"), &body).await?;
        }
        Command::Register {
            name,
            id,
            gender,
            dob,
            address,
        } => {
            let body = json!({
                "name": name,
                "id": id,
                "gender": gender,
                "dob": dob,
                "address": address,
            });
            post_and_print(&client, &format!("{node}/add_block"), &body).await?;
        }
        Command::Chain => {
            let res = client.get(format!("{node}/chain")).send().await?;
            let status = res.status();
            let snapshot: serde_json::Value = res.json().await?;
            println!("status: {}", status);
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::AddPeer { peer } => {
            let body = json!({ "nodes": peer });
            post_and_print(&client, &format!("{node}/nodes/register"), &body).await?;
        }
        Command::Resolve => {
            let res = client.post(format!("{node}/resolve")).send().await?;
            let status = res.status();
            let body = res.text().await?;
            println!("status: {}", status);
            println!("{body}");
        }
        Command::Validate => {
            let snapshot: ChainSnapshot = client
                .get(format!("{node}/chain"))
                .send()
                .await?
                .json()
                .await?;
            let chain = Chain::from_blocks(snapshot.chain);
            println!("length: {}", chain.len());
            println!("valid: {}", chain.is_valid());
        }
    }
    Ok(())
}

async fn post_and_print(
    client: &reqwest::Client,
    url: &str,
    body: &serde_json::Value,
) -> Result<()> {
    let res = client.post(url).json(body).send().await?;
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    println!("{body}");
    Ok(())
}
