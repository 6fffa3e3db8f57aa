//! `orcanet wallet`: map this node's wallet address, look up others.

use clap::Subcommand;
use serde::Deserialize;
use serde_json::json;

use super::NodeApi;

#[derive(Subcommand, Debug)]
pub enum WalletCommand {
    /// Publish the wallet address payments for this node should go to.
    Map { address: String },
    /// Look up the wallet address of a peer.
    Get { peer_id: String },
}

#[derive(Deserialize)]
struct MapWalletResponse {
    message: String,
    #[serde(rename = "peerID")]
    peer_id: String,
    wallet: String,
}

#[derive(Deserialize)]
struct WalletLookupResponse {
    #[serde(rename = "peerID")]
    peer_id: String,
    #[serde(rename = "walletAddress")]
    wallet_address: String,
}

pub async fn run(api: &NodeApi, cmd: &WalletCommand) -> anyhow::Result<()> {
    match cmd {
        WalletCommand::Map { address } => {
            let resp: MapWalletResponse = api
                .post("/mapPeerIDtoWallet", &json!({ "walletAddress": address }))
                .await?;
            println!("{}", resp.message);
            println!("  {} -> {}", resp.peer_id, resp.wallet);
        }
        WalletCommand::Get { peer_id } => {
            let resp: WalletLookupResponse = api
                .post("/getWalletAddress", &json!({ "peerID": peer_id }))
                .await?;
            println!("{} -> {}", resp.peer_id, resp.wallet_address);
        }
    }
    Ok(())
}
