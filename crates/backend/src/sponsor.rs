//! # Gas Sponsor
//!
//! The backend pays gas for every contract call.
//!
//! ```text
//! build(sender, MoveCall)  ──► TransactionData { gas.owner = sponsor } ──► base64 bytes
//! execute(bytes, user sig) ──► verify sig == sender ──► countersign ──► ChainExecutor
//! ```
//!
//! Only calls into the configured package and module are sponsored.
//!
//! ## Wire encoding
//!
//! Transaction bytes are the serde_json encoding of [`TransactionData`], not
//! BCS. [`JsonRpcExecutor`] forwards them unchanged, so it only works against
//! an endpoint that accepts that JSON encoding (a relay or test node in front
//! of the chain). A stock fullnode rejects it; point `rpc_url` at such a
//! relay or run with the in-process chain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::SigningKey;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use commity_common::crypto::address_from_public_key;
use commity_common::transaction::{digest, sign_transaction, verify_user_signature};
use commity_common::{
    Address, CallArg, ExecutionResult, GasData, MoveCall, MoveCallError, ObjectId, SponsoredTransaction,
    TransactionData, TransactionError, TransactionKind, UserSignature,
};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("chain transport error: {0}")]
    Transport(String),

    /// The chain rejected the transaction (Move abort, insufficient gas, ...).
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum SponsorError {
    #[error("invalid move call: {0}")]
    InvalidCall(#[from] MoveCallError),

    #[error("target {found} is not sponsored (expected {expected})")]
    ForeignTarget { expected: String, found: String },

    #[error("invalid transaction: {0}")]
    Transaction(#[from] TransactionError),

    #[error("transaction gas is not paid by this sponsor")]
    NotSponsored,

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

// ════════════════════════════════════════════════════════════════════════════════
// CHAIN EXECUTOR
// ════════════════════════════════════════════════════════════════════════════════

/// Submits a fully signed transaction (user + sponsor signatures).
#[async_trait]
pub trait ChainExecutor: Send + Sync {
    async fn execute(&self, tx_bytes: &[u8], signatures: &[UserSignature]) -> Result<ExecutionResult, ExecutorError>;
}

/// `sui_executeTransactionBlock` over JSON-RPC. `params[0]` is base64 of the
/// JSON transaction bytes; the endpoint must understand that encoding.
pub struct JsonRpcExecutor {
    url: String,
    client: reqwest::Client,
}

impl JsonRpcExecutor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<ExecuteResponse>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    digest: String,
    #[serde(default)]
    effects: Option<Effects>,
    #[serde(default)]
    object_changes: Vec<ObjectChange>,
}

#[derive(Deserialize)]
struct Effects {
    status: EffectsStatus,
}

#[derive(Deserialize)]
struct EffectsStatus {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectChange {
    #[serde(rename = "type")]
    change: String,
    #[serde(default)]
    object_id: Option<String>,
}

#[async_trait]
impl ChainExecutor for JsonRpcExecutor {
    async fn execute(&self, tx_bytes: &[u8], signatures: &[UserSignature]) -> Result<ExecutionResult, ExecutorError> {
        let sigs: Vec<String> = signatures.iter().map(UserSignature::to_base64).collect();
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sui_executeTransactionBlock",
            "params": [
                STANDARD.encode(tx_bytes),
                sigs,
                { "showEffects": true, "showObjectChanges": true },
                "WaitForLocalExecution"
            ]
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ExecutorError::Transport(format!("rpc status {}", resp.status())));
        }
        let envelope: RpcEnvelope = resp.json().await.map_err(|e| ExecutorError::Transport(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(ExecutorError::Rejected(err.message));
        }
        let result = envelope
            .result
            .ok_or_else(|| ExecutorError::Transport("rpc response without result".to_string()))?;

        if let Some(status) = result.effects.map(|e| e.status) {
            if status.status != "success" {
                return Err(ExecutorError::Rejected(
                    status.error.unwrap_or_else(|| format!("execution {}", status.status)),
                ));
            }
        }

        let created = result
            .object_changes
            .iter()
            .filter(|c| c.change == "created")
            .filter_map(|c| c.object_id.as_deref())
            .filter_map(|id| ObjectId::parse(id).ok())
            .collect();
        Ok(ExecutionResult {
            digest: result.digest,
            created,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SPONSOR
// ════════════════════════════════════════════════════════════════════════════════

pub struct Sponsor {
    key: SigningKey,
    address: Address,
    package: ObjectId,
    module: String,
    gas_budget: u64,
    gas_price: u64,
    executor: Arc<dyn ChainExecutor>,
}

impl Sponsor {
    pub fn new(
        key: SigningKey,
        package: ObjectId,
        module: &str,
        gas_budget: u64,
        gas_price: u64,
        executor: Arc<dyn ChainExecutor>,
    ) -> Self {
        let address = address_from_public_key(&key.verifying_key());
        Self {
            key,
            address,
            package,
            module: module.to_string(),
            gas_budget,
            gas_price,
            executor,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn package(&self) -> &ObjectId {
        &self.package
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Build the unsigned sponsored transaction for `call`.
    pub fn build(&self, sender: &Address, call: MoveCall) -> Result<SponsoredTransaction, SponsorError> {
        if call.package != self.package || call.module != self.module {
            return Err(SponsorError::ForeignTarget {
                expected: format!("{}::{}", self.package, self.module),
                found: call.target(),
            });
        }
        call.validate()?;

        let data = TransactionData {
            sender: sender.clone(),
            kind: TransactionKind::MoveCall(call),
            gas: GasData {
                owner: self.address.clone(),
                budget: self.gas_budget,
                price: self.gas_price,
            },
            expiration_epoch: None,
        };
        let bytes = data.to_bytes()?;
        let tx = SponsoredTransaction {
            bytes: STANDARD.encode(&bytes),
            digest: digest(&bytes),
            sponsor_signature: None,
        };
        info!(sender = %sender, target = %data.kind.move_call().target(), digest = %tx.digest, "sponsored transaction built");
        Ok(tx)
    }

    /// Build from a `<package>::<module>::<function>` target string.
    pub fn build_target(
        &self,
        sender: &Address,
        target: &str,
        arguments: Vec<CallArg>,
    ) -> Result<SponsoredTransaction, SponsorError> {
        let (package, module, function) = MoveCall::parse_target(target)?;
        self.build(
            sender,
            MoveCall {
                package,
                module,
                function,
                arguments,
            },
        )
    }

    /// Verify the user's signature, countersign and submit.
    pub async fn execute(&self, bytes_b64: &str, signature_b64: &str) -> Result<ExecutionResult, SponsorError> {
        let bytes = STANDARD.decode(bytes_b64).map_err(TransactionError::from)?;
        let data = TransactionData::from_bytes(&bytes)?;
        if data.gas.owner != self.address {
            return Err(SponsorError::NotSponsored);
        }
        let user_sig = UserSignature::from_base64(signature_b64)?;
        verify_user_signature(&bytes, &user_sig, &data.sender)?;

        let sponsor_sig = sign_transaction(&self.key, &bytes);
        match self.executor.execute(&bytes, &[user_sig, sponsor_sig]).await {
            Ok(result) => {
                info!(sender = %data.sender, digest = %result.digest, created = result.created.len(), "transaction executed");
                Ok(result)
            }
            Err(e) => {
                warn!(sender = %data.sender, error = %e, "transaction execution failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingExecutor {
        calls: Mutex<Vec<(Vec<u8>, usize)>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl ChainExecutor for RecordingExecutor {
        async fn execute(&self, tx_bytes: &[u8], signatures: &[UserSignature]) -> Result<ExecutionResult, ExecutorError> {
            self.calls.lock().push((tx_bytes.to_vec(), signatures.len()));
            if let Some(msg) = &self.reject {
                return Err(ExecutorError::Rejected(msg.clone()));
            }
            Ok(ExecutionResult {
                digest: digest(tx_bytes),
                created: vec![ObjectId::parse("0x77").expect("id")],
            })
        }
    }

    fn sponsor(reject: Option<&str>) -> (Sponsor, Arc<RecordingExecutor>) {
        let exec = Arc::new(RecordingExecutor {
            calls: Mutex::new(Vec::new()),
            reject: reject.map(str::to_string),
        });
        let s = Sponsor::new(
            SigningKey::from_bytes(&[9u8; 32]),
            ObjectId::parse("0xda0").expect("pkg"),
            "commity",
            50_000_000,
            1_000,
            exec.clone(),
        );
        (s, exec)
    }

    fn user() -> (SigningKey, Address) {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let address = address_from_public_key(&key.verifying_key());
        (key, address)
    }

    #[test]
    fn build_sets_sponsor_as_gas_owner() {
        let (s, _) = sponsor(None);
        let (_, sender) = user();
        let call = MoveCall::create_profile(s.package(), "commity", "nadolink");
        let tx = s.build(&sender, call).expect("build");

        let data = TransactionData::from_base64(&tx.bytes).expect("decode");
        assert_eq!(&data.gas.owner, s.address());
        assert_eq!(data.sender, sender);
        assert!(data.is_sponsored());
        assert_eq!(data.gas.budget, 50_000_000);
    }

    #[test]
    fn foreign_package_and_bad_arguments_rejected() {
        let (s, _) = sponsor(None);
        let (_, sender) = user();
        let other = ObjectId::parse("0xbad").expect("pkg");
        assert!(matches!(
            s.build(&sender, MoveCall::create_profile(&other, "commity", "nadolink")),
            Err(SponsorError::ForeignTarget { .. })
        ));

        let target = format!("{}::commity::create_profile", s.package());
        assert!(matches!(
            s.build_target(&sender, &target, vec![CallArg::u64(1)]),
            Err(SponsorError::InvalidCall(_))
        ));
    }

    #[tokio::test]
    async fn execute_verifies_and_countersigns() {
        let (s, exec) = sponsor(None);
        let (key, sender) = user();
        let tx = s
            .build(&sender, MoveCall::create_profile(s.package(), "commity", "nadolink"))
            .expect("build");
        let bytes = STANDARD.decode(&tx.bytes).expect("b64");
        let sig = sign_transaction(&key, &bytes);

        let result = s.execute(&tx.bytes, &sig.to_base64()).await.expect("execute");
        assert_eq!(result.digest, tx.digest);
        assert_eq!(exec.calls.lock()[0].1, 2);
    }

    #[tokio::test]
    async fn wrong_signer_never_reaches_chain() {
        let (s, exec) = sponsor(None);
        let (_, sender) = user();
        let tx = s
            .build(&sender, MoveCall::create_profile(s.package(), "commity", "nadolink"))
            .expect("build");
        let bytes = STANDARD.decode(&tx.bytes).expect("b64");
        let intruder = SigningKey::from_bytes(&[4u8; 32]);
        let sig = sign_transaction(&intruder, &bytes);

        let err = s.execute(&tx.bytes, &sig.to_base64()).await.expect_err("mismatch");
        assert!(matches!(err, SponsorError::Transaction(TransactionError::SignerMismatch { .. })));
        assert!(exec.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn chain_rejection_carries_abort_text() {
        let (s, _) = sponsor(Some("MoveAbort(..., 2) in command 0"));
        let (key, sender) = user();
        let tx = s
            .build(&sender, MoveCall::create_profile(s.package(), "commity", "nadolink"))
            .expect("build");
        let bytes = STANDARD.decode(&tx.bytes).expect("b64");
        let err = s
            .execute(&tx.bytes, &sign_transaction(&key, &bytes).to_base64())
            .await
            .expect_err("rejected");
        assert!(err.to_string().contains("MoveAbort"));
    }

    /// JSON-RPC node stand-in that accepts the JSON transaction encoding and
    /// answers every request with `reply`.
    async fn json_bytes_node(reply: serde_json::Value) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let app = axum::Router::new().route(
            "/",
            axum::routing::post(move |axum::Json(req): axum::Json<serde_json::Value>| {
                let log = log.clone();
                let reply = reply.clone();
                async move {
                    log.lock().push(req);
                    axum::Json(reply)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}", addr), seen)
    }

    #[tokio::test]
    async fn rpc_executor_forwards_json_transaction_bytes() {
        let (url, seen) = json_bytes_node(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "digest": "0xfeed",
                "effects": { "status": { "status": "success" } },
                "objectChanges": [
                    { "type": "mutated", "objectId": "0x2" },
                    { "type": "created", "objectId": "0x77" }
                ]
            }
        }))
        .await;
        let (s, _) = sponsor(None);
        let (key, sender) = user();
        let id = |raw: &str| ObjectId::parse(raw).expect("id");
        let call = MoveCall::join_commity(s.package(), "commity", &id("0x1"), &id("0x2"));
        let tx = s.build(&sender, call.clone()).expect("build");
        let bytes = STANDARD.decode(&tx.bytes).expect("b64");
        let sig = sign_transaction(&key, &bytes);

        let executor = JsonRpcExecutor::new(&url, Duration::from_secs(5)).expect("executor");
        let result = executor.execute(&bytes, &[sig]).await.expect("execute");
        assert_eq!(result.digest, "0xfeed");
        assert_eq!(result.created, vec![id("0x77")]);

        let requests = seen.lock();
        let params = &requests[0]["params"];
        assert_eq!(requests[0]["method"], "sui_executeTransactionBlock");
        let sent = STANDARD.decode(params[0].as_str().expect("bytes")).expect("b64");
        let data = TransactionData::from_bytes(&sent).expect("json transaction");
        assert_eq!(data.kind.move_call(), &call);
        assert_eq!(params[1].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn rpc_executor_surfaces_failed_effects() {
        let (url, _) = json_bytes_node(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "digest": "0xdead",
                "effects": { "status": { "status": "failure", "error": "MoveAbort(..., 1) in command 0" } }
            }
        }))
        .await;
        let executor = JsonRpcExecutor::new(&url, Duration::from_secs(5)).expect("executor");
        let err = executor.execute(b"{}", &[]).await.expect_err("rejected");
        assert!(matches!(err, ExecutorError::Rejected(ref msg) if msg.contains("MoveAbort")));
    }
}
