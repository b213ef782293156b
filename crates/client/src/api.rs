//! # BackendClient: REST client for the Commity backend
//!
//! Thin reqwest wrapper over every read-side projection endpoint, the
//! community channel link and the generic sponsor/execute endpoints.
//!
//! ## Conventions
//!
//! - A bearer token is attached when the session holds one.
//! - `404` on single-object reads maps to `Ok(None)`; projections that are
//!   not there yet are normal while the indexer catches up.
//! - Non-success statuses surface as [`ApiError::Http`] with the body text
//!   so callers can run it through [`commity_common::classify`].
//! - No retry here. Polling and retry belong to the flows.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use commity_common::api::{
    BuildResponse, CommunityListResponse, CommunityResponse, ErrorBody, ExecuteRequest, MembersResponse,
    NftListResponse, NotificationListResponse, OkResponse, ProfileResponse, ProposalListResponse,
    SetChannelRequest, SponsorRequest, StatsResponse, VotesResponse,
};
use commity_common::{
    Address, Community, EventNft, ExecutionResult, Notification, ObjectId, Profile, ProfileStats, Proposal,
    SponsoredTransaction, Vote,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("backend returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend response decode error: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl ApiError {
    /// Text suitable for [`commity_common::classify`].
    pub fn message(&self) -> String {
        match self {
            ApiError::Http { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct BackendClient(Arc<ClientInner>);

struct ClientInner {
    base: String,
    client: Client,
    token: RwLock<Option<String>>,
}

impl BackendClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let base = base.into().trim_end_matches('/').to_string();
        Ok(Self(Arc::new(ClientInner {
            base,
            client,
            token: RwLock::new(None),
        })))
    }

    pub fn base_url(&self) -> &str {
        &self.0.base
    }

    pub fn set_auth_token(&self, token: Option<String>) {
        *self.0.token.write() = token;
    }

    pub fn auth_token(&self) -> Option<String> {
        self.0.token.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.0.base, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.0.token.read().as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn read_error(resp: Response) -> ApiError {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        let body = serde_json::from_str::<ErrorBody>(&text)
            .map(|e| e.error)
            .unwrap_or(text);
        ApiError::Http { status, body }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get_optional(path)
            .await?
            .ok_or_else(|| ApiError::NotFound(path.to_string()))
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ApiError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let resp = self.authorize(self.0.client.get(&url)).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(resp.json::<T>().await?)),
            _ => Err(Self::read_error(resp).await),
        }
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(%url, "POST");
        let mut req = self.authorize(self.0.client.post(&url));
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Self::read_error(resp).await);
        }
        Ok(resp.json::<T>().await?)
    }

    // ── profile ──────────────────────────────────────────────────────────────

    pub async fn get_profile(&self, address: &Address) -> Result<Option<Profile>, ApiError> {
        let resp: Option<ProfileResponse> = self.get_optional(&format!("/profile/{}", address)).await?;
        Ok(resp.and_then(|r| r.profile))
    }

    pub async fn profile_stats(
        &self,
        address: &Address,
        community: Option<&ObjectId>,
    ) -> Result<ProfileStats, ApiError> {
        let path = match community {
            Some(id) => format!("/profile/{}/stats?commityId={}", address, id),
            None => format!("/profile/{}/stats", address),
        };
        let resp: StatsResponse = self.get_json(&path).await?;
        Ok(resp.stats)
    }

    // ── community ────────────────────────────────────────────────────────────

    pub async fn list_communities(&self) -> Result<Vec<Community>, ApiError> {
        let resp: CommunityListResponse = self.get_json("/community").await?;
        Ok(resp.communities)
    }

    pub async fn get_community(&self, id: &ObjectId) -> Result<Option<Community>, ApiError> {
        let resp: Option<CommunityResponse> = self.get_optional(&format!("/community/{}", id)).await?;
        Ok(resp.map(|r| r.community))
    }

    pub async fn community_members(&self, id: &ObjectId) -> Result<Vec<Address>, ApiError> {
        let resp: MembersResponse = self.get_json(&format!("/community/{}/members", id)).await?;
        Ok(resp.members)
    }

    /// Link a chat channel to a community the caller created.
    pub async fn set_community_channel(
        &self,
        id: &ObjectId,
        requester: &Address,
        channel_id: &str,
    ) -> Result<Community, ApiError> {
        let req = SetChannelRequest {
            requester: requester.clone(),
            channel_id: channel_id.to_string(),
        };
        let resp: CommunityResponse = self.post_json(&format!("/community/{}/channel", id), Some(&req)).await?;
        Ok(resp.community)
    }

    pub async fn member_communities(&self, address: &Address) -> Result<Vec<Community>, ApiError> {
        let resp: CommunityListResponse = self.get_json(&format!("/community/member/{}", address)).await?;
        Ok(resp.communities)
    }

    // ── proposal ─────────────────────────────────────────────────────────────

    pub async fn community_proposals(&self, community: &ObjectId) -> Result<Vec<Proposal>, ApiError> {
        let resp: ProposalListResponse = self.get_json(&format!("/proposal/community/{}", community)).await?;
        Ok(resp.proposals)
    }

    pub async fn proposal_votes(&self, proposal: &ObjectId) -> Result<Vec<Vote>, ApiError> {
        let resp: VotesResponse = self.get_json(&format!("/proposal/{}/votes", proposal)).await?;
        Ok(resp.votes)
    }

    // ── notification / nft ───────────────────────────────────────────────────

    pub async fn notifications(&self, address: &Address) -> Result<Vec<Notification>, ApiError> {
        let resp: NotificationListResponse = self.get_json(&format!("/notification/{}", address)).await?;
        Ok(resp.notifications)
    }

    pub async fn mark_notification_read(&self, address: &Address, id: &str) -> Result<bool, ApiError> {
        let resp: OkResponse = self
            .post_json::<(), _>(&format!("/notification/{}/{}/read", address, id), None)
            .await?;
        Ok(resp.ok)
    }

    pub async fn nfts(&self, address: &Address) -> Result<Vec<EventNft>, ApiError> {
        let resp: NftListResponse = self.get_json(&format!("/nft/{}", address)).await?;
        Ok(resp.nfts)
    }

    // ── transactions ─────────────────────────────────────────────────────────

    pub async fn sponsor(&self, req: &SponsorRequest) -> Result<SponsoredTransaction, ApiError> {
        let resp: BuildResponse = self.post_json("/transaction/sponsor", Some(req)).await?;
        Ok(resp.transaction)
    }

    pub async fn execute(&self, req: &ExecuteRequest) -> Result<ExecutionResult, ApiError> {
        self.post_json("/transaction/execute", Some(req)).await
    }

    pub async fn health(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.get_json("/health").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let c = BackendClient::new("http://localhost:3001/", Duration::from_secs(1)).expect("client");
        assert_eq!(c.base_url(), "http://localhost:3001");
        assert_eq!(c.url("/community"), "http://localhost:3001/community");
    }

    #[test]
    fn token_roundtrip() {
        let c = BackendClient::new("http://localhost:3001", Duration::from_secs(1)).expect("client");
        assert_eq!(c.auth_token(), None);
        c.set_auth_token(Some("jwt".into()));
        assert_eq!(c.auth_token().as_deref(), Some("jwt"));
        let clone = c.clone();
        clone.set_auth_token(None);
        assert_eq!(c.auth_token(), None);
    }

    #[test]
    fn http_error_message_is_body() {
        let e = ApiError::Http {
            status: 500,
            body: "MoveAbort(..., 2) in command 0".into(),
        };
        assert_eq!(e.message(), "MoveAbort(..., 2) in command 0");
        assert!(ApiError::Transport("connection refused".into())
            .message()
            .contains("connection refused"));
    }
}
