//! `orcanet proxy`: register, deregister, list.

use clap::Subcommand;
use orcanet_core::ProxyInfo;
use serde::Deserialize;
use serde_json::json;

use super::{MessageResponse, NodeApi};

#[derive(Subcommand, Debug)]
pub enum ProxyCommand {
    /// Offer this node as a proxy.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "0")]
        initial_fee: String,
        #[arg(long, default_value = "0")]
        price: String,
    },
    /// Stop offering proxy service.
    Deregister,
    /// Whether this node is registered.
    Status,
    /// Proxies among the peers the node has seen.
    List,
}

#[derive(Deserialize)]
struct IsProxyResponse {
    #[serde(rename = "isProxy")]
    is_proxy: bool,
}

pub async fn run(api: &NodeApi, cmd: &ProxyCommand) -> anyhow::Result<()> {
    match cmd {
        ProxyCommand::Register {
            name,
            initial_fee,
            price,
        } => {
            let body = json!({
                "action": "register",
                "name": name,
                "initialFee": initial_fee,
                "price": price,
            });
            let resp: MessageResponse = api.post("/registerProxy", &body).await?;
            println!("{}", resp.message);
        }
        ProxyCommand::Deregister => {
            let resp: MessageResponse = api
                .post("/registerProxy", &json!({ "action": "deregister" }))
                .await?;
            println!("{}", resp.message);
        }
        ProxyCommand::Status => {
            let resp: IsProxyResponse = api.get("/isProxy").await?;
            println!("Registered as proxy: {}", resp.is_proxy);
        }
        ProxyCommand::List => {
            let proxies: Vec<ProxyInfo> = api.get("/fetchProxyList").await?;
            println!("Proxies ({}):", proxies.len());
            for p in &proxies {
                println!(
                    "  {}  {}  {}:{}  {}  fee {}  price {}",
                    p.peer_id, p.name, p.ip_address, p.port, p.location, p.initial_fee, p.price
                );
            }
        }
    }
    Ok(())
}
