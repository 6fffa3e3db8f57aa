//! OrcaNet CLI: command-line interface to a running OrcaNet node.
//!
//! Subcommands: init, status, peers, providers, upload, delete, files,
//! purchase, proxy, wallet, record, send.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::NodeApi;

/// OrcaNet: peer-to-peer file sharing.
#[derive(Parser, Debug)]
#[command(name = "orcanet", version, about, long_about = None)]
struct Cli {
    /// API endpoint of the node.
    #[arg(short, long, global = true, default_value = "http://127.0.0.1:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default node configuration.
    Init(commands::init::InitArgs),
    /// Query the status of a running node.
    Status,
    /// List peers the node has seen.
    Peers,
    /// Find who provides a file and at what price.
    Providers(commands::files::ProvidersArgs),
    /// Upload a file and start providing it.
    Upload(commands::files::UploadArgs),
    /// Stop providing a file and remove it.
    Delete(commands::files::DeleteArgs),
    /// List the files this node provides.
    Files,
    /// Buy a file from a provider.
    Purchase(commands::files::PurchaseArgs),
    /// Manage proxy registration.
    #[command(subcommand)]
    Proxy(commands::proxy::ProxyCommand),
    /// Map or look up wallet addresses.
    #[command(subcommand)]
    Wallet(commands::wallet::WalletCommand),
    /// Read or write raw DHT records.
    #[command(subcommand)]
    Record(commands::record::RecordCommand),
    /// Send a message straight to a peer.
    Send(commands::send::SendArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let api = NodeApi::new(&cli.endpoint);
    match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Status => commands::status::run(&api).await,
        Commands::Peers => commands::status::peers(&api).await,
        Commands::Providers(args) => commands::files::providers(&api, args).await,
        Commands::Upload(args) => commands::files::upload(&api, args).await,
        Commands::Delete(args) => commands::files::delete(&api, args).await,
        Commands::Files => commands::files::list(&api).await,
        Commands::Purchase(args) => commands::files::purchase(&api, args).await,
        Commands::Proxy(cmd) => commands::proxy::run(&api, cmd).await,
        Commands::Wallet(cmd) => commands::wallet::run(&api, cmd).await,
        Commands::Record(cmd) => commands::record::run(&api, cmd).await,
        Commands::Send(args) => commands::send::run(&api, args).await,
    }
}
