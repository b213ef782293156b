//! # Agent Context
//!
//! Resolves configuration once per invocation and builds the pieces the
//! commands need: a read-only [`BackendClient`] for queries and a full
//! [`Session`] (wallet, signer, membership verifier, messaging) for writes.
//!
//! ## Resolution order
//!
//! 1. `--config <file>` TOML, or built-in defaults when absent
//! 2. `COMMITY_*` environment overrides
//! 3. validation (`poll_interval_ms` range, package id)

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use tracing::{debug, info};

use commity_client::session::WalletConnection;
use commity_client::{
    select_signer, BackendClient, ContractRef, HttpMessagingClient, JsonRpcChainReader, KeypairWallet, KindSponsor,
    MembershipVerifier, Session, SessionStore, SponsorApiClient, Wallet,
};
use commity_common::config::load_client_config;
use commity_common::{now_ms, Address, ClientConfig};

/// Wallet label recorded in the session file for locally held keys.
pub const LOCAL_WALLET: &str = "keypair";

pub struct Context {
    pub config: ClientConfig,
    pub store: SessionStore,
    /// Chain name sent to the third-party sponsor API.
    pub network: String,
}

impl Context {
    pub fn load(path: Option<&Path>, network: &str) -> Result<Self> {
        let mut config = match path {
            Some(p) => load_client_config(p).with_context(|| format!("loading {}", p.display()))?,
            None => ClientConfig::default(),
        };
        config.apply_env().context("applying environment overrides")?;
        debug!(backend = %config.backend_url, ws = %config.ws_url, "client config resolved");
        let store = SessionStore::new(&config.session_path);
        Ok(Self {
            config,
            store,
            network: network.to_string(),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    pub fn api(&self) -> Result<BackendClient> {
        Ok(BackendClient::new(self.config.backend_url.clone(), self.timeout())?)
    }

    /// Address of the wallet remembered in the session file.
    pub fn remembered_address(&self) -> Result<Option<Address>> {
        Ok(self.store.load()?.wallet.map(|w| w.address))
    }

    /// Resolve the address a read command is about: explicit, then the
    /// key, then the session file.
    pub fn resolve_address(&self, explicit: Option<Address>, key_hex: Option<&str>) -> Result<Address> {
        if let Some(a) = explicit {
            return Ok(a);
        }
        if let Some(hex) = key_hex {
            return Ok(KeypairWallet::from_hex(hex)?.address());
        }
        self.remembered_address()?
            .ok_or_else(|| anyhow!("no address given and no wallet in the session; pass --address or --key"))
    }

    /// Build a signing session for `key_hex` and remember the wallet.
    pub fn session(&self, key_hex: Option<&str>) -> Result<Session> {
        let key_hex = key_hex.ok_or_else(|| anyhow!("this command signs transactions; pass --key or set COMMITY_KEY"))?;
        let wallet: Arc<dyn Wallet> = Arc::new(KeypairWallet::from_hex(key_hex)?);
        let address = wallet.address();

        let api = self.api()?;
        let kind_sponsor: Option<Arc<dyn KindSponsor>> =
            match (&self.config.sponsor_api_url, &self.config.sponsor_api_key) {
                (Some(url), Some(key)) => Some(Arc::new(SponsorApiClient::new(
                    url.clone(),
                    key.clone(),
                    self.network.clone(),
                    self.timeout(),
                )?)),
                _ => None,
            };
        let signer = select_signer(wallet, Arc::new(api.clone()), kind_sponsor)?;

        let chain = JsonRpcChainReader::new(self.config.rpc_url.clone(), self.timeout())?;
        let membership = MembershipVerifier::new(Arc::new(chain), Arc::new(api.clone()));
        let contract = ContractRef::from_config(&self.config.network)?;

        let mut session = Session::new(signer, api, membership, contract);
        if let Some(url) = &self.config.messaging_url {
            session = session.with_messaging(Arc::new(HttpMessagingClient::new(url.clone(), self.timeout())?));
        }

        self.remember(&address)?;
        info!(%address, signer = ?session.signer_kind(), "session ready");
        Ok(session)
    }

    /// Record the wallet connection unless it is already the remembered one.
    pub fn remember(&self, address: &Address) -> Result<()> {
        if self.remembered_address()?.as_ref() == Some(address) {
            return Ok(());
        }
        self.store.record_connection(WalletConnection {
            address: address.clone(),
            wallet: LOCAL_WALLET.to_string(),
            connected_at: now_ms(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commity_common::crypto::{generate_keypair_bytes, signing_key_from_bytes, signing_key_to_hex};

    fn context(dir: &tempfile::TempDir) -> Context {
        let mut config = ClientConfig::default();
        config.session_path = dir.path().join("session.json").display().to_string();
        let store = SessionStore::new(&config.session_path);
        Context {
            config,
            store,
            network: "testnet".into(),
        }
    }

    fn key_hex() -> String {
        let key = signing_key_from_bytes(&generate_keypair_bytes()).expect("key");
        signing_key_to_hex(&key)
    }

    #[test]
    fn address_resolution_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir);
        assert!(ctx.resolve_address(None, None).is_err());

        let hex = key_hex();
        let from_key = ctx.resolve_address(None, Some(&hex)).expect("from key");

        let explicit = Address::parse("0xabc").expect("addr");
        assert_eq!(ctx.resolve_address(Some(explicit.clone()), Some(&hex)).expect("explicit"), explicit);

        ctx.remember(&from_key).expect("remember");
        assert_eq!(ctx.resolve_address(None, None).expect("remembered"), from_key);
    }

    #[test]
    fn remember_keeps_first_connection_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir);
        let a = Address::parse("0xa").expect("addr");
        ctx.remember(&a).expect("remember");
        let first = ctx.store.load().expect("load").wallet.expect("wallet");
        ctx.remember(&a).expect("remember again");
        let second = ctx.store.load().expect("load").wallet.expect("wallet");
        assert_eq!(first, second);
        assert_eq!(second.wallet, LOCAL_WALLET);
    }

    #[test]
    fn session_requires_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(&dir);
        let err = ctx.session(None).err().expect("missing key");
        assert!(err.to_string().contains("--key"));
    }
}
