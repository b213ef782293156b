//! Session context and persisted session state.
//!
//! [`Session`] is the explicit bundle of service handles every flow takes.
//! Nothing in the client reaches for a global; a flow sees exactly the
//! signer, REST client and verifier its session was built with.
//!
//! [`SessionStore`] persists what must survive a restart (auth token and
//! wallet-connection bookkeeping) as a small JSON file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use commity_common::{Address, ConfigError, NetworkConfig, ObjectId};

use crate::api::BackendClient;
use crate::membership::MembershipVerifier;
use crate::messaging::MessagingService;
use crate::poll::PollConfig;
use crate::signer::{SignerKind, TransactionSigner};

/// Contract coordinates resolved from [`NetworkConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRef {
    pub package: ObjectId,
    pub module: String,
}

impl ContractRef {
    pub fn from_config(cfg: &NetworkConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            package: cfg.package()?,
            module: cfg.module.clone(),
        })
    }
}

/// Polling budgets and fixed waits used by the flows.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowTimings {
    pub profile: PollConfig,
    pub community: PollConfig,
    pub proposal: PollConfig,
    pub vote: PollConfig,
    /// Pause between the sequential steps of community creation.
    pub step_delay: Duration,
    /// Upper bound on the whole vote submission, wallet prompt included.
    pub vote_timeout: Duration,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            profile: PollConfig::profile(),
            community: PollConfig::community(),
            proposal: PollConfig::proposal(),
            vote: PollConfig::vote(),
            step_delay: Duration::from_secs(2),
            vote_timeout: Duration::from_secs(30),
        }
    }
}

impl FlowTimings {
    /// No waiting at all; `attempts` fetches per poll.
    pub fn immediate(attempts: u32) -> Self {
        let p = PollConfig::immediate(attempts);
        Self {
            profile: p.clone(),
            community: p.clone(),
            proposal: p.clone(),
            vote: p,
            step_delay: Duration::ZERO,
            vote_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct Session {
    pub address: Address,
    pub signer: Arc<dyn TransactionSigner>,
    pub api: BackendClient,
    pub membership: MembershipVerifier,
    pub messaging: Option<Arc<dyn MessagingService>>,
    pub contract: ContractRef,
    pub timings: FlowTimings,
}

impl Session {
    pub fn new(
        signer: Arc<dyn TransactionSigner>,
        api: BackendClient,
        membership: MembershipVerifier,
        contract: ContractRef,
    ) -> Self {
        Self {
            address: signer.address(),
            signer,
            api,
            membership,
            messaging: None,
            contract,
            timings: FlowTimings::default(),
        }
    }

    pub fn with_messaging(mut self, messaging: Arc<dyn MessagingService>) -> Self {
        self.messaging = Some(messaging);
        self
    }

    pub fn with_timings(mut self, timings: FlowTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn signer_kind(&self) -> SignerKind {
        self.signer.kind()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// PERSISTENCE
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session io error: {0}")]
    Io(#[from] io::Error),

    #[error("session file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnection {
    pub address: Address,
    /// Wallet name as reported at connect time.
    pub wallet: String,
    pub connected_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub wallet: Option<WalletConnection>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file is an empty session.
    pub fn load(&self) -> Result<PersistedSession, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PersistedSession::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, session: &PersistedSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(session)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "session saved");
        Ok(())
    }

    /// Record a wallet connection, keeping any auth token.
    pub fn record_connection(&self, connection: WalletConnection) -> Result<PersistedSession, SessionError> {
        let mut s = self.load()?;
        s.wallet = Some(connection);
        self.save(&s)?;
        Ok(s)
    }

    pub fn set_auth_token(&self, token: Option<String>) -> Result<PersistedSession, SessionError> {
        let mut s = self.load()?;
        s.auth_token = token;
        self.save(&s)?;
        Ok(s)
    }

    /// Forget everything. Idempotent.
    pub fn logout(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "session cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
