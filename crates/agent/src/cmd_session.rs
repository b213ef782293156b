//! # Key and Session Commands
//!
//! - `key generate [--remember]`: fresh Ed25519 keypair; prints the Sui
//!   address and the secret (hex). With `--remember` the address is
//!   recorded as the session wallet. The secret is never written to disk.
//! - `logout`: forget the persisted session.

use anyhow::Result;

use commity_client::{KeypairWallet, Wallet};

use crate::context::Context;

pub struct GeneratedKey {
    pub address: String,
    pub secret_hex: String,
}

pub fn generate_key() -> Result<GeneratedKey> {
    let wallet = KeypairWallet::generate()?;
    Ok(GeneratedKey {
        address: wallet.address().to_string(),
        secret_hex: wallet.secret_hex(),
    })
}

pub fn handle_key_generate(ctx: &Context, remember: bool) -> Result<()> {
    let key = generate_key()?;
    println!("address: {}", key.address);
    println!("secret:  {}", key.secret_hex);
    if remember {
        let wallet = KeypairWallet::from_hex(&key.secret_hex)?;
        ctx.remember(&wallet.address())?;
        println!("session: {}", ctx.store.path().display());
    }
    Ok(())
}

pub fn handle_logout(ctx: &Context) -> Result<()> {
    ctx.store.logout()?;
    println!("logged out");
    Ok(())
}
