//! `orcanet send`: push a message to a peer over the transfer protocol.

use clap::Args;
use serde_json::json;

use super::{MessageResponse, NodeApi};

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Peer ID to send to.
    pub peer_id: String,

    /// Text to send.
    pub message: String,
}

pub async fn run(api: &NodeApi, args: &SendArgs) -> anyhow::Result<()> {
    let body = json!({ "peerId": args.peer_id, "message": args.message });
    let resp: MessageResponse = api.post("/send", &body).await?;
    println!("{} to {}", resp.message, args.peer_id);
    Ok(())
}
