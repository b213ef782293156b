//! # Transaction Error Taxonomy
//!
//! Every failure that can come back from a wallet, a sponsor, or the chain
//! arrives as a free-form message. This module sorts those messages into
//! the four classes the flows care about:
//!
//! | Class | Handling |
//! |-------|----------|
//! | [`TxErrorClass::UserRejected`] | silent cancel, never shown |
//! | [`TxErrorClass::SponsorFailure`] | translated message, flow aborts before signing |
//! | [`TxErrorClass::MoveAbort`] | mapped to a specific message via [`AbortReason`] |
//! | [`TxErrorClass::Transient`] | retried / absorbed by polling |
//!
//! Classification is substring based because the upstream SDKs do not
//! expose structured errors.

use std::fmt;

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// ABORT REASONS
// ════════════════════════════════════════════════════════════════════════════════

/// Known abort codes of the contract module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbortReason {
    NotMember,
    NotProfileOwner,
    AlreadyVoted,
    ProposalNotActive,
    AlreadyMember,
    DeadlineNotReached,
    NftAlreadyRedeemed,
    WrongCommunity,
    NotProposalCreator,
    ProfileAlreadyExists,
    Unknown(u64),
}

impl AbortReason {
    const KNOWN: [AbortReason; 10] = [
        AbortReason::NotMember,
        AbortReason::NotProfileOwner,
        AbortReason::AlreadyVoted,
        AbortReason::ProposalNotActive,
        AbortReason::AlreadyMember,
        AbortReason::DeadlineNotReached,
        AbortReason::NftAlreadyRedeemed,
        AbortReason::WrongCommunity,
        AbortReason::NotProposalCreator,
        AbortReason::ProfileAlreadyExists,
    ];

    pub fn from_code(code: u64) -> Self {
        match code {
            0 => AbortReason::NotMember,
            1 => AbortReason::NotProfileOwner,
            2 => AbortReason::AlreadyVoted,
            3 => AbortReason::ProposalNotActive,
            4 => AbortReason::AlreadyMember,
            5 => AbortReason::DeadlineNotReached,
            6 => AbortReason::NftAlreadyRedeemed,
            7 => AbortReason::WrongCommunity,
            8 => AbortReason::NotProposalCreator,
            9 => AbortReason::ProfileAlreadyExists,
            other => AbortReason::Unknown(other),
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            AbortReason::NotMember => 0,
            AbortReason::NotProfileOwner => 1,
            AbortReason::AlreadyVoted => 2,
            AbortReason::ProposalNotActive => 3,
            AbortReason::AlreadyMember => 4,
            AbortReason::DeadlineNotReached => 5,
            AbortReason::NftAlreadyRedeemed => 6,
            AbortReason::WrongCommunity => 7,
            AbortReason::NotProposalCreator => 8,
            AbortReason::ProfileAlreadyExists => 9,
            AbortReason::Unknown(code) => *code,
        }
    }

    /// Error constant name as declared in the Move module.
    pub fn constant_name(&self) -> Option<&'static str> {
        Some(match self {
            AbortReason::NotMember => "ENotMember",
            AbortReason::NotProfileOwner => "ENotProfileOwner",
            AbortReason::AlreadyVoted => "EAlreadyVoted",
            AbortReason::ProposalNotActive => "EProposalNotActive",
            AbortReason::AlreadyMember => "EAlreadyMember",
            AbortReason::DeadlineNotReached => "EDeadlineNotReached",
            AbortReason::NftAlreadyRedeemed => "ENftAlreadyRedeemed",
            AbortReason::WrongCommunity => "EWrongCommunity",
            AbortReason::NotProposalCreator => "ENotProposalCreator",
            AbortReason::ProfileAlreadyExists => "EProfileAlreadyExists",
            AbortReason::Unknown(_) => return None,
        })
    }

    fn from_constant_name(message: &str) -> Option<Self> {
        Self::KNOWN
            .iter()
            .copied()
            .find(|r| r.constant_name().is_some_and(|name| message.contains(name)))
    }

    /// Message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            AbortReason::NotMember => "Bu topluluğun üyesi değilsiniz".to_string(),
            AbortReason::NotProfileOwner => "Bu profilin sahibi değilsiniz".to_string(),
            AbortReason::AlreadyVoted => "Bu teklife zaten oy verdiniz".to_string(),
            AbortReason::ProposalNotActive => "Bu teklif artık aktif değil".to_string(),
            AbortReason::AlreadyMember => "Zaten bu topluluğun üyesisiniz".to_string(),
            AbortReason::DeadlineNotReached => "Teklifin süresi henüz dolmadı".to_string(),
            AbortReason::NftAlreadyRedeemed => "Bu NFT zaten kullanıldı".to_string(),
            AbortReason::WrongCommunity => "Bu NFT bu topluluğa ait değil".to_string(),
            AbortReason::NotProposalCreator => "Teklifi yalnızca oluşturan kişi sonuçlandırabilir".to_string(),
            AbortReason::ProfileAlreadyExists => "Bu adres için zaten bir profil var".to_string(),
            AbortReason::Unknown(code) => format!("İşlem zincir tarafından reddedildi (kod {})", code),
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.constant_name() {
            Some(name) => write!(f, "{} ({})", name, self.code()),
            None => write!(f, "abort code {}", self.code()),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// MOVE ABORT PARSING
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortInfo {
    pub code: u64,
    pub function: Option<String>,
    pub reason: AbortReason,
}

fn leading_digits(s: &str) -> &str {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    &s[..end]
}

/// Extract the abort code and function from a `MoveAbort(...)` message.
///
/// Recognized shapes:
/// - `MoveAbort(MoveLocation { ..., function_name: Some("cast_vote") }, 0) in command 0`
/// - `... MoveAbort ... abort code: 3`
pub fn parse_move_abort(message: &str) -> Option<AbortInfo> {
    let start = message.find("MoveAbort")?;
    let rest = &message[start..];

    let function = rest.find("function_name: Some(\"").and_then(|i| {
        let tail = &rest[i + "function_name: Some(\"".len()..];
        tail.find('"').map(|end| tail[..end].to_string())
    });

    let mut code = rest.match_indices("}, ").find_map(|(i, sep)| {
        let tail = &rest[i + sep.len()..];
        let digits = leading_digits(tail);
        if !digits.is_empty() && tail[digits.len()..].starts_with(')') {
            digits.parse::<u64>().ok()
        } else {
            None
        }
    });

    if code.is_none() {
        code = rest
            .find("abort code: ")
            .and_then(|i| leading_digits(&rest[i + "abort code: ".len()..]).parse().ok());
    }

    let by_name = AbortReason::from_constant_name(message);
    let code = match (code, by_name) {
        (Some(c), _) => c,
        (None, Some(reason)) => reason.code(),
        (None, None) => return None,
    };

    Some(AbortInfo {
        code,
        function,
        reason: by_name.unwrap_or_else(|| AbortReason::from_code(code)),
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// CLASSIFICATION
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxErrorClass {
    UserRejected,
    SponsorFailure(String),
    MoveAbort(AbortInfo),
    Transient(String),
    Other(String),
}

/// Returns true when the message looks like a wallet-side rejection.
pub fn is_user_rejection(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("user rejected")
        || msg.contains("rejected the request")
        || msg.contains("rejected by user")
        || msg.contains("user denied")
        || msg.contains("user cancelled")
        || msg.contains("user canceled")
}

/// Determine if an error is transient based on its text.
///
/// Retryable errors (network-related):
/// - Contains: "network", "connection", "timeout", "timed out", "refused",
///   "unavailable", "reset", "broken pipe", "dns", "eof", "temporarily"
pub fn is_transient(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("network")
        || msg.contains("connection")
        || msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("refused")
        || msg.contains("unavailable")
        || msg.contains("reset")
        || msg.contains("broken pipe")
        || msg.contains("dns")
        || msg.contains("eof")
        || msg.contains("temporarily")
}

pub fn classify(message: &str) -> TxErrorClass {
    if let Some(info) = parse_move_abort(message) {
        return TxErrorClass::MoveAbort(info);
    }
    if is_user_rejection(message) {
        return TxErrorClass::UserRejected;
    }
    let lower = message.to_lowercase();
    if lower.contains("sponsor") || lower.contains("gas") {
        return TxErrorClass::SponsorFailure(message.to_string());
    }
    if is_transient(message) {
        return TxErrorClass::Transient(message.to_string());
    }
    TxErrorClass::Other(message.to_string())
}

impl TxErrorClass {
    /// Message shown to the user, `None` for silent cancels.
    pub fn user_message(&self) -> Option<String> {
        match self {
            TxErrorClass::UserRejected => None,
            TxErrorClass::SponsorFailure(_) => {
                Some("İşlem sponsoru şu anda kullanılamıyor, lütfen daha sonra tekrar deneyin".to_string())
            }
            TxErrorClass::MoveAbort(info) => Some(info.reason.user_message()),
            TxErrorClass::Transient(_) => Some("Ağ hatası, lütfen tekrar deneyin".to_string()),
            TxErrorClass::Other(msg) => Some(format!("İşlem başarısız: {}", msg)),
        }
    }
}
