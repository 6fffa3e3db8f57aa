//! `orcanet status` and `orcanet peers`.

use serde::Deserialize;

use super::NodeApi;

#[derive(Deserialize)]
struct StatusResponse {
    version: String,
    peer_id: String,
    peer_count: usize,
    uptime_secs: u64,
    listening_addrs: Vec<String>,
    relay: Option<String>,
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
    count: usize,
}

#[derive(Deserialize)]
struct PeerInfo {
    peer_id: String,
    connected: bool,
}

pub async fn run(api: &NodeApi) -> anyhow::Result<()> {
    let status: StatusResponse = api.get("/status").await?;
    println!("Node Status:");
    println!("  Version:    {}", status.version);
    println!("  Peer ID:    {}", status.peer_id);
    println!("  Peers:      {}", status.peer_count);
    println!("  Uptime:     {}s", status.uptime_secs);
    println!("  Relay:      {}", status.relay.as_deref().unwrap_or("(none)"));
    if status.listening_addrs.is_empty() {
        println!("  Listening:  (none)");
    } else {
        for addr in &status.listening_addrs {
            println!("  Listening:  {}", addr);
        }
    }
    Ok(())
}

pub async fn peers(api: &NodeApi) -> anyhow::Result<()> {
    let data: PeersResponse = api.get("/peers").await?;
    println!("Known peers ({}):", data.count);
    if data.peers.is_empty() {
        println!("  (no peers seen yet)");
    }
    for peer in &data.peers {
        let marker = if peer.connected { "connected" } else { "seen" };
        println!("  {}  [{}]", peer.peer_id, marker);
    }
    Ok(())
}
