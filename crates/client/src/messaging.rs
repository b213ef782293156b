//! Community chat channels.
//!
//! Chat lives in an external messaging service. The only coupling with the
//! DAO is that each community gets one channel, and a proposal may carry
//! the id of the chat message it was announced with.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use commity_common::{Address, ObjectId};

use crate::poll::{retry_with_backoff, RetryConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagingError {
    #[error("messaging transport error: {0}")]
    Transport(String),

    #[error("messaging service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("messaging response decode error: {0}")]
    Decode(String),
}

impl MessagingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            MessagingError::Transport(_) => true,
            MessagingError::Http { status, .. } => *status >= 500 || *status == 429,
            MessagingError::Decode(_) => false,
        }
    }
}

#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Create the channel for a community. Returns the channel id.
    async fn create_channel(&self, community: &ObjectId, name: &str, creator: &Address)
        -> Result<String, MessagingError>;

    /// Post a message. Returns the message id.
    async fn post_message(&self, channel_id: &str, sender: &Address, text: &str) -> Result<String, MessagingError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChannelBody<'a> {
    community_id: &'a ObjectId,
    name: &'a str,
    creator: &'a Address,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChannelResponse {
    channel_id: String,
}

#[derive(Debug, Serialize)]
struct PostMessageBody<'a> {
    sender: &'a Address,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageResponse {
    message_id: String,
}

#[derive(Clone)]
pub struct HttpMessagingClient {
    base: String,
    client: Client,
}

impl HttpMessagingClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self, MessagingError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MessagingError::Transport(e.to_string()))?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post<B: Serialize + Sync, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, MessagingError> {
        let url = format!("{}{}", self.base, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MessagingError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MessagingError::Http {
                status: status.as_u16(),
                body,
            });
        }
        resp.json::<T>().await.map_err(|e| MessagingError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MessagingService for HttpMessagingClient {
    async fn create_channel(
        &self,
        community: &ObjectId,
        name: &str,
        creator: &Address,
    ) -> Result<String, MessagingError> {
        let body = CreateChannelBody {
            community_id: community,
            name,
            creator,
        };
        let resp: CreateChannelResponse = self.post("/channels", &body).await?;
        Ok(resp.channel_id)
    }

    async fn post_message(&self, channel_id: &str, sender: &Address, text: &str) -> Result<String, MessagingError> {
        let body = PostMessageBody { sender, text };
        let resp: PostMessageResponse = self.post(&format!("/channels/{}/messages", channel_id), &body).await?;
        Ok(resp.message_id)
    }
}

/// Create a community's channel: one logical attempt, at most three tries
/// with linear backoff.
pub async fn ensure_channel(
    service: &dyn MessagingService,
    community: &ObjectId,
    name: &str,
    creator: &Address,
) -> Result<String, MessagingError> {
    ensure_channel_with(service, community, name, creator, &RetryConfig::linear(3, 1_000)).await
}

pub async fn ensure_channel_with(
    service: &dyn MessagingService,
    community: &ObjectId,
    name: &str,
    creator: &Address,
    retry: &RetryConfig,
) -> Result<String, MessagingError> {
    match retry_with_backoff(
        retry,
        || service.create_channel(community, name, creator),
        MessagingError::is_retryable,
    )
    .await
    {
        Ok((channel_id, attempts)) => {
            info!(%community, %channel_id, attempts, "chat channel ready");
            Ok(channel_id)
        }
        Err(exhausted) => {
            warn!(%community, attempts = exhausted.attempts, error = %exhausted.last_error, "chat channel creation failed");
            Err(exhausted.last_error)
        }
    }
}
