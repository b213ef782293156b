//! # Commity Agent CLI
//!
//! Terminal front end for the Commity DAO. Every write goes through the
//! same client flows the app uses: sponsored transaction, wallet
//! signature, then read-after-write polling against the backend.
//!
//! ## Commands
//!
//! ### Keys and session
//! - `key generate [--remember]`: generate an Ed25519 keypair
//! - `logout`: clear the persisted session
//!
//! ### Profile
//! - `profile show [--address]`
//! - `profile create <nickname>`
//! - `nft redeem <nft-id>`
//!
//! ### Communities
//! - `community list [--mine]`
//! - `community members <community-id>`
//! - `community create <name>`
//! - `community join <community-id> [--message]`
//!
//! ### Proposals
//! - `proposal list <community-id>`
//! - `proposal create --community <id> --title <t> [--description] [--hours] [--quorum] [--announce]`
//! - `proposal vote <community-id> <proposal-id> <yes|no|abstain>`
//! - `proposal finalize <community-id> <proposal-id>`
//!
//! ### Notifications
//! - `notifications list [--address] [--read <id>]`
//! - `notifications watch [--address]`
//!
//! ## Environment Variables
//!
//! - `COMMITY_KEY`: wallet secret (hex) for signing commands
//! - `COMMITY_NETWORK`: chain name for the sponsor API (default: testnet)
//! - `COMMITY_BACKEND_URL`, `COMMITY_WS_URL`, `COMMITY_RPC_URL`,
//!   `COMMITY_SESSION_PATH`, `COMMITY_PACKAGE_ID`, ...: config overrides
//! - `RUST_LOG`: log filter (default: warn)

mod cmd_community;
mod cmd_notifications;
mod cmd_profile;
mod cmd_proposal;
mod cmd_session;
mod context;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commity_common::{Address, ObjectId, VoteType};

use crate::cmd_proposal::{parse_vote, CreateArgs};
use crate::context::Context;

#[derive(Parser)]
#[command(version, about = "Commity Agent CLI")]
struct Cli {
    /// Client config file (TOML). Defaults plus COMMITY_* overrides when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Wallet secret key (hex) used by signing commands.
    #[arg(long, global = true, env = "COMMITY_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Chain name passed to the third-party sponsor API.
    #[arg(long, global = true, env = "COMMITY_NETWORK", default_value = "testnet")]
    network: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Key management
    Key {
        #[command(subcommand)]
        key_cmd: KeyCommands,
    },

    /// Profile commands
    Profile {
        #[command(subcommand)]
        profile_cmd: ProfileCommands,
    },

    /// Community commands
    Community {
        #[command(subcommand)]
        community_cmd: CommunityCommands,
    },

    /// Proposal and voting commands
    Proposal {
        #[command(subcommand)]
        proposal_cmd: ProposalCommands,
    },

    /// Event NFT commands
    Nft {
        #[command(subcommand)]
        nft_cmd: NftCommands,
    },

    /// Notification inbox and live feed
    Notifications {
        #[command(subcommand)]
        notifications_cmd: NotificationCommands,
    },

    /// Forget the persisted session (auth token, wallet)
    Logout,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate an Ed25519 keypair and print address and secret
    Generate {
        /// Record the address as the session wallet
        #[arg(long)]
        remember: bool,
    },
}

#[derive(Args)]
struct AddressArg {
    /// Address to query (defaults to the key's or the session's address)
    #[arg(long)]
    address: Option<Address>,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show profile, XP, activity and NFTs
    Show {
        #[command(flatten)]
        who: AddressArg,
    },
    /// Create the wallet's profile
    Create { nickname: String },
}

#[derive(Subcommand)]
enum CommunityCommands {
    /// List communities
    List {
        /// Only communities the wallet belongs to
        #[arg(long)]
        mine: bool,
    },
    /// List a community's member addresses
    Members { community: ObjectId },
    /// Create a community, join it and open its chat channel
    Create { name: String },
    /// Ask to join a community
    Join {
        community: ObjectId,
        #[arg(long, default_value = "")]
        message: String,
    },
}

#[derive(Subcommand)]
enum ProposalCommands {
    /// List a community's proposals
    List { community: ObjectId },
    /// Create a proposal
    Create {
        #[arg(long)]
        community: ObjectId,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Voting window in hours
        #[arg(long, default_value_t = 72)]
        hours: u64,
        /// Minimum participation percentage (1-100)
        #[arg(long, default_value_t = 50)]
        quorum: u8,
        /// Announce the proposal in the community chat
        #[arg(long)]
        announce: bool,
    },
    /// Vote on a proposal
    Vote {
        community: ObjectId,
        proposal: ObjectId,
        #[arg(value_parser = parse_vote)]
        vote: VoteType,
    },
    /// Finalize a proposal after its deadline (creator only)
    Finalize { community: ObjectId, proposal: ObjectId },
}

#[derive(Subcommand)]
enum NftCommands {
    /// Redeem an event NFT for XP
    Redeem { nft: ObjectId },
}

#[derive(Subcommand)]
enum NotificationCommands {
    /// Print the inbox
    List {
        #[command(flatten)]
        who: AddressArg,
        /// Mark this notification read first
        #[arg(long)]
        read: Option<String>,
    },
    /// Print notifications as they arrive
    Watch {
        #[command(flatten)]
        who: AddressArg,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::load(cli.config.as_deref(), &cli.network)?;
    let key = cli.key.as_deref();

    match cli.cmd {
        Commands::Key { key_cmd } => match key_cmd {
            KeyCommands::Generate { remember } => cmd_session::handle_key_generate(&ctx, remember),
        },

        Commands::Logout => cmd_session::handle_logout(&ctx),

        Commands::Profile { profile_cmd } => match profile_cmd {
            ProfileCommands::Show { who } => {
                let address = ctx.resolve_address(who.address, key)?;
                cmd_profile::handle_profile_show(&ctx, address).await
            }
            ProfileCommands::Create { nickname } => cmd_profile::handle_profile_create(&ctx, key, &nickname).await,
        },

        Commands::Community { community_cmd } => match community_cmd {
            CommunityCommands::List { mine } => {
                let member = if mine { Some(ctx.resolve_address(None, key)?) } else { None };
                cmd_community::handle_community_list(&ctx, member).await
            }
            CommunityCommands::Members { community } => cmd_community::handle_community_members(&ctx, &community).await,
            CommunityCommands::Create { name } => cmd_community::handle_community_create(&ctx, key, &name).await,
            CommunityCommands::Join { community, message } => {
                cmd_community::handle_community_join(&ctx, key, &community, &message).await
            }
        },

        Commands::Proposal { proposal_cmd } => match proposal_cmd {
            ProposalCommands::List { community } => cmd_proposal::handle_proposal_list(&ctx, &community).await,
            ProposalCommands::Create {
                community,
                title,
                description,
                hours,
                quorum,
                announce,
            } => {
                let args = CreateArgs {
                    community,
                    title,
                    description,
                    hours,
                    quorum,
                    announce,
                };
                cmd_proposal::handle_proposal_create(&ctx, key, args).await
            }
            ProposalCommands::Vote {
                community,
                proposal,
                vote,
            } => cmd_proposal::handle_proposal_vote(&ctx, key, &community, &proposal, vote).await,
            ProposalCommands::Finalize { community, proposal } => {
                cmd_proposal::handle_proposal_finalize(&ctx, key, &community, &proposal).await
            }
        },

        Commands::Nft { nft_cmd } => match nft_cmd {
            NftCommands::Redeem { nft } => cmd_profile::handle_nft_redeem(&ctx, key, &nft).await,
        },

        Commands::Notifications { notifications_cmd } => match notifications_cmd {
            NotificationCommands::List { who, read } => {
                let address = ctx.resolve_address(who.address, key)?;
                cmd_notifications::handle_notifications_list(&ctx, address, read).await
            }
            NotificationCommands::Watch { who } => {
                let address = ctx.resolve_address(who.address, key)?;
                cmd_notifications::handle_notifications_watch(&ctx, address).await
            }
        },
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// UNIT TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["commity-agent"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).expect("parse")
    }

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn vote_arguments() {
        let cli = parse(&["proposal", "vote", "0xc", "0x1", "evet"]);
        match cli.cmd {
            Commands::Proposal {
                proposal_cmd: ProposalCommands::Vote { community, proposal, vote },
            } => {
                assert_eq!(community, ObjectId::parse("0xc").expect("id"));
                assert_eq!(proposal, ObjectId::parse("0x1").expect("id"));
                assert_eq!(vote, VoteType::Yes);
            }
            _ => panic!("expected proposal vote"),
        }
        let bad = Cli::try_parse_from(["commity-agent", "proposal", "vote", "0xc", "0x1", "maybe"]);
        assert!(bad.is_err());
    }

    #[test]
    fn object_ids_are_validated() {
        assert!(Cli::try_parse_from(["commity-agent", "proposal", "list", "not-hex"]).is_err());
        assert!(Cli::try_parse_from(["commity-agent", "nft", "redeem", "0xabc"]).is_ok());
    }

    #[test]
    fn community_members_takes_an_id() {
        let cli = parse(&["community", "members", "0xc"]);
        match cli.cmd {
            Commands::Community {
                community_cmd: CommunityCommands::Members { community },
            } => assert_eq!(community, ObjectId::parse("0xc").expect("id")),
            _ => panic!("expected community members"),
        }
        assert!(Cli::try_parse_from(["commity-agent", "community", "members"]).is_err());
    }

    #[test]
    fn proposal_create_defaults() {
        let cli = parse(&["proposal", "create", "--community", "0xc", "--title", "Bütçe"]);
        match cli.cmd {
            Commands::Proposal {
                proposal_cmd:
                    ProposalCommands::Create {
                        hours,
                        quorum,
                        announce,
                        description,
                        ..
                    },
            } => {
                assert_eq!(hours, 72);
                assert_eq!(quorum, 50);
                assert!(!announce);
                assert!(description.is_empty());
            }
            _ => panic!("expected proposal create"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = parse(&["profile", "show", "--address", "0xa", "--network", "devnet"]);
        assert_eq!(cli.network, "devnet");
        match cli.cmd {
            Commands::Profile {
                profile_cmd: ProfileCommands::Show { who },
            } => assert_eq!(who.address, Some(Address::parse("0xa").expect("addr"))),
            _ => panic!("expected profile show"),
        }
    }
}
