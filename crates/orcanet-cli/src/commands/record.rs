//! `orcanet record`: raw DHT access.

use clap::Subcommand;
use serde::Deserialize;
use serde_json::json;

use super::{MessageResponse, NodeApi};

#[derive(Subcommand, Debug)]
pub enum RecordCommand {
    /// Read the value stored under a key.
    Get { key: String },
    /// Store a value under a key.
    Put { key: String, value: String },
}

#[derive(Deserialize)]
struct RecordResponse {
    key: String,
    value: String,
}

pub async fn run(api: &NodeApi, cmd: &RecordCommand) -> anyhow::Result<()> {
    match cmd {
        RecordCommand::Get { key } => {
            let record: RecordResponse = api.post("/record/get", &json!({ "key": key })).await?;
            println!("{} = {}", record.key, record.value);
        }
        RecordCommand::Put { key, value } => {
            let resp: MessageResponse = api
                .post("/record/put", &json!({ "key": key, "value": value }))
                .await?;
            println!("{}", resp.message);
        }
    }
    Ok(())
}
