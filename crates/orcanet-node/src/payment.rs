//! Client for the local wallet's payment endpoint.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use orcanet_core::keys::format_price;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PaymentRequest {
    pub address: String,
    pub amount: String,
}

#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    url: String,
}

impl PaymentClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask the wallet to send `amount` to `address`. Anything but 200 is a failure.
    pub async fn pay(&self, address: &str, amount: f64) -> Result<()> {
        let request = PaymentRequest {
            address: address.to_string(),
            amount: format_price(amount),
        };
        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("error sending payment request to wallet")?;

        if resp.status() != reqwest::StatusCode::OK {
            bail!("payment failed with status: {}", resp.status());
        }
        tracing::info!(address = %address, amount = %request.amount, "payment sent");
        Ok(())
    }
}
