//! # Membership verification
//!
//! Checked before every vote. The community object records members as
//! dynamic fields keyed by address, so the authoritative answer comes from
//! listing those fields on chain.
//!
//! Order of sources:
//!
//! 1. Chain dynamic-field scan (every page).
//! 2. Backend stats endpoint, only when the chain read itself failed.
//! 3. Both failed ⇒ not a member.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use commity_common::{Address, ObjectId};

use crate::api::BackendClient;

/// Hard stop for pathological pagination.
const MAX_PAGES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainReadError {
    #[error("chain rpc transport error: {0}")]
    Transport(String),

    #[error("chain rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("chain rpc decode error: {0}")]
    Decode(String),

    #[error("dynamic field listing exceeded {0} pages")]
    TooManyPages(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicFieldPage {
    /// Field names rendered as strings (addresses for the member table).
    pub names: Vec<String>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn dynamic_field_names(
        &self,
        object: &ObjectId,
        cursor: Option<String>,
    ) -> Result<DynamicFieldPage, ChainReadError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// JSON-RPC READER
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DynamicFieldsResult {
    data: Vec<DynamicFieldInfo>,
    next_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct DynamicFieldInfo {
    name: DynamicFieldName,
}

#[derive(Debug, Deserialize)]
struct DynamicFieldName {
    value: serde_json::Value,
}

#[derive(Clone)]
pub struct JsonRpcChainReader {
    url: String,
    client: Client,
}

impl JsonRpcChainReader {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainReadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainReadError::Transport(e.to_string()))?;
        Ok(Self { url: url.into(), client })
    }
}

#[async_trait]
impl ChainReader for JsonRpcChainReader {
    async fn dynamic_field_names(
        &self,
        object: &ObjectId,
        cursor: Option<String>,
    ) -> Result<DynamicFieldPage, ChainReadError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "suix_getDynamicFields",
            "params": [object.as_str(), cursor, serde_json::Value::Null],
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainReadError::Transport(e.to_string()))?;
        let envelope: RpcEnvelope<DynamicFieldsResult> =
            resp.json().await.map_err(|e| ChainReadError::Decode(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(ChainReadError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = envelope
            .result
            .ok_or_else(|| ChainReadError::Decode("response has neither result nor error".into()))?;

        Ok(DynamicFieldPage {
            names: result
                .data
                .into_iter()
                .filter_map(|f| match f.name.value {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            next_cursor: result.next_cursor,
            has_next_page: result.has_next_page,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// BACKEND FALLBACK
// ════════════════════════════════════════════════════════════════════════════════

#[async_trait]
pub trait MemberStatsSource: Send + Sync {
    async fn is_member(&self, address: &Address, community: &ObjectId) -> Result<bool, String>;
}

#[async_trait]
impl MemberStatsSource for BackendClient {
    async fn is_member(&self, address: &Address, community: &ObjectId) -> Result<bool, String> {
        self.profile_stats(address, Some(community))
            .await
            .map(|s| s.is_member)
            .map_err(|e| e.to_string())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// VERIFIER
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipSource {
    Chain,
    BackendFallback,
    FailClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipCheck {
    pub is_member: bool,
    pub source: MembershipSource,
}

#[derive(Clone)]
pub struct MembershipVerifier {
    chain: Arc<dyn ChainReader>,
    fallback: Arc<dyn MemberStatsSource>,
}

impl MembershipVerifier {
    pub fn new(chain: Arc<dyn ChainReader>, fallback: Arc<dyn MemberStatsSource>) -> Self {
        Self { chain, fallback }
    }

    /// Scan every page of the community's dynamic fields for `address`.
    pub async fn scan_chain(&self, address: &Address, community: &ObjectId) -> Result<bool, ChainReadError> {
        let mut cursor: Option<String> = None;
        for page_no in 0..MAX_PAGES {
            let page = self.chain.dynamic_field_names(community, cursor.take()).await?;
            if page
                .names
                .iter()
                .any(|name| Address::parse(name).map(|a| &a == address).unwrap_or(false))
            {
                debug!(%address, %community, page = page_no, "member found on chain");
                return Ok(true);
            }
            match (page.has_next_page, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => return Ok(false),
            }
        }
        Err(ChainReadError::TooManyPages(MAX_PAGES))
    }

    pub async fn check(&self, address: &Address, community: &ObjectId) -> MembershipCheck {
        match self.scan_chain(address, community).await {
            Ok(is_member) => MembershipCheck {
                is_member,
                source: MembershipSource::Chain,
            },
            Err(chain_err) => {
                warn!(%address, %community, error = %chain_err, "chain membership read failed, asking backend");
                match self.fallback.is_member(address, community).await {
                    Ok(is_member) => MembershipCheck {
                        is_member,
                        source: MembershipSource::BackendFallback,
                    },
                    Err(e) => {
                        warn!(%address, %community, error = %e, "membership fallback failed, treating as non-member");
                        MembershipCheck {
                            is_member: false,
                            source: MembershipSource::FailClosed,
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn addr(s: &str) -> Address {
        Address::parse(s).expect("addr")
    }

    fn community() -> ObjectId {
        ObjectId::parse("0xc0").expect("community")
    }

    /// Chain with members split over fixed-size pages.
    struct PagedChain {
        members: Vec<String>,
        page_size: usize,
        fail: bool,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ChainReader for PagedChain {
        async fn dynamic_field_names(
            &self,
            _object: &ObjectId,
            cursor: Option<String>,
        ) -> Result<DynamicFieldPage, ChainReadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ChainReadError::Transport("connection refused".into()));
            }
            let start: usize = cursor.map(|c| c.parse().expect("cursor")).unwrap_or(0);
            let end = (start + self.page_size).min(self.members.len());
            Ok(DynamicFieldPage {
                names: self.members[start..end].to_vec(),
                next_cursor: (end < self.members.len()).then(|| end.to_string()),
                has_next_page: end < self.members.len(),
            })
        }
    }

    struct Fallback(Result<bool, String>);

    #[async_trait]
    impl MemberStatsSource for Fallback {
        async fn is_member(&self, _a: &Address, _c: &ObjectId) -> Result<bool, String> {
            self.0.clone()
        }
    }

    fn chain(members: &[&str], fail: bool) -> Arc<PagedChain> {
        Arc::new(PagedChain {
            members: members.iter().map(|s| s.to_string()).collect(),
            page_size: 2,
            fail,
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn finds_member_on_later_page() {
        let c = chain(&["0x1", "0x2", "0x3", "0x4", "0xA"], false);
        let v = MembershipVerifier::new(c.clone(), Arc::new(Fallback(Ok(false))));
        let check = v.check(&addr("0xa"), &community()).await;
        assert_eq!(
            check,
            MembershipCheck {
                is_member: true,
                source: MembershipSource::Chain
            }
        );
        assert_eq!(c.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn chain_negative_does_not_consult_backend() {
        let v = MembershipVerifier::new(chain(&["0x1", "0x2", "0x3"], false), Arc::new(Fallback(Ok(true))));
        let check = v.check(&addr("0xa"), &community()).await;
        assert!(!check.is_member);
        assert_eq!(check.source, MembershipSource::Chain);
    }

    #[tokio::test]
    async fn chain_failure_uses_backend() {
        let v = MembershipVerifier::new(chain(&[], true), Arc::new(Fallback(Ok(true))));
        let check = v.check(&addr("0xa"), &community()).await;
        assert!(check.is_member);
        assert_eq!(check.source, MembershipSource::BackendFallback);
    }

    #[tokio::test]
    async fn both_failing_fails_closed() {
        let v = MembershipVerifier::new(chain(&[], true), Arc::new(Fallback(Err("503".into()))));
        let check = v.check(&addr("0xa"), &community()).await;
        assert_eq!(
            check,
            MembershipCheck {
                is_member: false,
                source: MembershipSource::FailClosed
            }
        );
    }

    #[test]
    fn rpc_page_decodes() {
        let raw = r#"{"jsonrpc":"2.0","id":1,"result":{"data":[
            {"name":{"type":"address","value":"0xabc"},"objectId":"0x1"},
            {"name":{"type":"u64","value":7},"objectId":"0x2"}
        ],"nextCursor":"0x2","hasNextPage":true}}"#;
        let env: RpcEnvelope<DynamicFieldsResult> = serde_json::from_str(raw).expect("decode");
        let result = env.result.expect("result");
        assert_eq!(result.data.len(), 2);
        assert_eq!(result.next_cursor.as_deref(), Some("0x2"));
        assert!(result.has_next_page);
    }
}
