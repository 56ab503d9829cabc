// Rejection taxonomy for raid actions.

use thiserror::Error;

/// Why an action was rejected. A rejected action never leaves the session
/// partially mutated: every handler validates before it applies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RaidError {
    #[error("Raid not found: {0}")]
    RaidNotFound(String),

    #[error("Raid is full ({0} players)")]
    RaidFull(usize),

    #[error("Too many active raids ({0})")]
    TooManyRaids(usize),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("Player already joined: {0}")]
    AlreadyJoined(String),

    #[error("It is not your turn")]
    NotYourTurn,

    #[error("Action not allowed during {0}")]
    InvalidPhase(String),

    #[error("Card is knocked out")]
    CardKnockedOut,

    #[error("Bench card is not available")]
    BenchUnavailable,

    #[error("Unknown attack: {0}")]
    UnknownAttack(String),

    #[error("Cheer card not available to this player")]
    CheerUnavailable,

    #[error("All cheer cards for this raid have been used")]
    CheerExhausted,

    #[error("Unknown cheer card #{0}")]
    InvalidCheerCard(u8),

    #[error("Debug mode is disabled")]
    DebugDisabled,

    #[error("Only the raid creator can do that")]
    NotRaidCreator,

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Malformed action: {0}")]
    MalformedAction(String),
}

impl RaidError {
    /// Stable machine-readable code, carried alongside the message in `actionResult`.
    pub fn code(&self) -> &'static str {
        match self {
            RaidError::RaidNotFound(_) => "RaidNotFound",
            RaidError::RaidFull(_) => "RaidFull",
            RaidError::TooManyRaids(_) => "TooManyRaids",
            RaidError::PlayerNotFound(_) => "PlayerNotFound",
            RaidError::AlreadyJoined(_) => "AlreadyJoined",
            RaidError::NotYourTurn => "NotYourTurn",
            RaidError::InvalidPhase(_) => "InvalidPhase",
            RaidError::CardKnockedOut => "CardKnockedOut",
            RaidError::BenchUnavailable => "BenchUnavailable",
            RaidError::UnknownAttack(_) => "UnknownAttack",
            RaidError::CheerUnavailable => "CheerUnavailable",
            RaidError::CheerExhausted => "CheerExhausted",
            RaidError::InvalidCheerCard(_) => "InvalidCheerCard",
            RaidError::DebugDisabled => "DebugDisabled",
            RaidError::NotRaidCreator => "NotRaidCreator",
            RaidError::UnknownActionType(_) => "UnknownActionType",
            RaidError::MalformedAction(_) => "MalformedAction",
        }
    }
}

pub type RaidResult<T> = std::result::Result<T, RaidError>;
