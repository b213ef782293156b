//! Gas sponsorship.
//!
//! Two sponsors exist and the signer picks one of them:
//!
//! - [`SponsorRelay`]: the backend builds the full transaction with its own
//!   gas, and later countersigns and executes what the wallet signed.
//! - [`KindSponsor`]: a third-party sponsor API receives only the
//!   transaction kind and returns a sponsored transaction the wallet can
//!   sign-and-execute natively (zkLogin wallets).

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use commity_common::api::{ExecuteRequest, SponsorRequest};
use commity_common::{Address, ExecutionResult, MoveCall, SponsoredTransaction, UserSignature};

use crate::api::BackendClient;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SponsorError {
    #[error("sponsor could not build transaction: {0}")]
    Build(String),

    #[error("sponsored execution failed: {0}")]
    Execute(String),
}

#[async_trait]
pub trait SponsorRelay: Send + Sync {
    async fn build(&self, sender: &Address, call: &MoveCall) -> Result<SponsoredTransaction, SponsorError>;

    async fn execute(&self, tx_bytes: &str, signature: &UserSignature) -> Result<ExecutionResult, SponsorError>;
}

#[async_trait]
impl SponsorRelay for BackendClient {
    async fn build(&self, sender: &Address, call: &MoveCall) -> Result<SponsoredTransaction, SponsorError> {
        let req = SponsorRequest {
            sender: sender.clone(),
            target: call.target(),
            arguments: call.arguments.clone(),
        };
        self.sponsor(&req).await.map_err(|e| SponsorError::Build(e.message()))
    }

    async fn execute(&self, tx_bytes: &str, signature: &UserSignature) -> Result<ExecutionResult, SponsorError> {
        let req = ExecuteRequest {
            bytes: tx_bytes.to_string(),
            signature: signature.to_base64(),
        };
        BackendClient::execute(self, &req)
            .await
            .map_err(|e| SponsorError::Execute(e.message()))
    }
}

#[async_trait]
pub trait KindSponsor: Send + Sync {
    /// Wrap serialized transaction-kind bytes into a sponsored transaction.
    async fn sponsor_kind(&self, sender: &Address, kind_bytes: &[u8]) -> Result<SponsoredTransaction, SponsorError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SponsorKindBody<'a> {
    network: &'a str,
    sender: &'a Address,
    transaction_block_kind_bytes: String,
}

#[derive(Debug, Deserialize)]
struct SponsorKindResponse {
    data: SponsoredTransaction,
}

/// HTTP client for the third-party sponsor API.
#[derive(Clone)]
pub struct SponsorApiClient {
    base: String,
    api_key: String,
    network: String,
    client: Client,
}

impl SponsorApiClient {
    pub fn new(
        base: impl Into<String>,
        api_key: impl Into<String>,
        network: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SponsorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SponsorError::Build(e.to_string()))?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            network: network.into(),
            client,
        })
    }
}

#[async_trait]
impl KindSponsor for SponsorApiClient {
    async fn sponsor_kind(&self, sender: &Address, kind_bytes: &[u8]) -> Result<SponsoredTransaction, SponsorError> {
        let url = format!("{}/transaction-blocks/sponsor", self.base);
        let body = SponsorKindBody {
            network: &self.network,
            sender,
            transaction_block_kind_bytes: STANDARD.encode(kind_bytes),
        };
        debug!(%url, %sender, "requesting kind sponsorship");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SponsorError::Build(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, "sponsor api rejected request");
            return Err(SponsorError::Build(format!("sponsor api {}: {}", status, text)));
        }

        let parsed: SponsorKindResponse = resp.json().await.map_err(|e| SponsorError::Build(e.to_string()))?;
        Ok(parsed.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_body_shape() {
        let sender = Address::parse("0xa").expect("addr");
        let body = SponsorKindBody {
            network: "testnet",
            sender: &sender,
            transaction_block_kind_bytes: STANDARD.encode(b"kind"),
        };
        let v = serde_json::to_value(&body).expect("json");
        assert_eq!(v["network"], "testnet");
        assert_eq!(v["transactionBlockKindBytes"], "a2luZA==");
        assert_eq!(v["sender"], serde_json::Value::String(sender.to_string()));
    }

    #[test]
    fn response_unwraps_data() {
        let raw = r#"{"data":{"bytes":"AAA=","digest":"0xabc"}}"#;
        let parsed: SponsorKindResponse = serde_json::from_str(raw).expect("parse");
        assert_eq!(parsed.data.digest, "0xabc");
        assert_eq!(parsed.data.sponsor_signature, None);
    }

    #[test]
    fn base_trailing_slash_trimmed() {
        let c = SponsorApiClient::new("https://sponsor.example/v1/", "k", "testnet", Duration::from_secs(1))
            .expect("client");
        assert_eq!(c.base, "https://sponsor.example/v1");
    }
}
