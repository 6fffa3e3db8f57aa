pub mod files;
pub mod init;
pub mod proxy;
pub mod record;
pub mod send;
pub mod status;
pub mod wallet;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Thin client for the node's HTTP API.
pub struct NodeApi {
    endpoint: String,
    client: reqwest::Client,
}

impl NodeApi {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send a request, turning transport failures and non-2xx replies into errors.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        let resp = request.send().await.with_context(|| {
            format!(
                "could not reach node at {} (is it running? start it with: orcanet-node)",
                self.endpoint
            )
        })?;
        let status = resp.status();
        tracing::debug!(url = %resp.url(), %status, "node replied");
        if status.is_success() {
            return Ok(resp);
        }
        match resp.json::<ErrorResponse>().await {
            Ok(err) => anyhow::bail!("node returned HTTP {}: {}", status, err.error),
            Err(_) => anyhow::bail!("node returned HTTP {}", status),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self.send(self.client.get(self.url(path))).await?;
        Ok(resp.json().await?)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> anyhow::Result<T> {
        let resp = self.send(self.client.post(self.url(path)).json(body)).await?;
        Ok(resp.json().await?)
    }
}
