use crate::wager::{Operation, WagerState};
use thiserror::Error;

/// Error codes carried by `Event::TransactionRejected` and rejected receipts.
pub const ERROR_INVALID_STATE_TRANSITION: u8 = 1;
pub const ERROR_UNAUTHORIZED: u8 = 2;
pub const ERROR_STAKE_MISMATCH: u8 = 3;
pub const ERROR_DEADLINE_PASSED: u8 = 4;
pub const ERROR_DEADLINE_NOT_REACHED: u8 = 5;
pub const ERROR_ALREADY_FUNDED: u8 = 6;
pub const ERROR_ALREADY_INITIALIZED: u8 = 7;
pub const ERROR_ARITHMETIC_OVERFLOW: u8 = 8;
pub const ERROR_WAGER_NOT_FOUND: u8 = 9;
pub const ERROR_INVALID_STAKE: u8 = 10;
pub const ERROR_INVALID_DEADLINE: u8 = 11;
pub const ERROR_INVALID_OUTCOME: u8 = 12;
pub const ERROR_INSUFFICIENT_BALANCE: u8 = 13;
pub const ERROR_VAULT_MISMATCH: u8 = 14;
pub const ERROR_ARBITER_REQUIRED: u8 = 15;
pub const ERROR_ARBITER_NOT_ALLOWED: u8 = 16;
pub const ERROR_NONCE_MISMATCH: u8 = 17;

/// Reasons a wager transition is refused.
///
/// Any of these aborts the whole transition; no record or vault field changes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WagerError {
    #[error("cannot {operation} a wager in state {state}")]
    InvalidStateTransition {
        state: WagerState,
        operation: Operation,
    },
    #[error("signer is not authorized for this operation")]
    Unauthorized,
    #[error("deposit does not match stake (expected={expected}, got={got})")]
    StakeMismatch { expected: u64, got: u64 },
    #[error("wager deadline has passed")]
    DeadlinePassed,
    #[error("wager deadline has not been reached")]
    DeadlineNotReached,
    #[error("wager already has a counterparty")]
    AlreadyFunded,
    #[error("wager id already in use")]
    AlreadyInitialized,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("wager not found")]
    WagerNotFound,
    #[error("stake must be greater than zero")]
    InvalidStake,
    #[error("deadline outside the allowed window")]
    InvalidDeadline,
    #[error("invalid outcome")]
    InvalidOutcome,
    #[error("insufficient balance (available={available}, required={required})")]
    InsufficientBalance { available: u64, required: u64 },
    #[error("vault does not belong to this wager or cannot cover the payout")]
    VaultMismatch,
    #[error("resolution policy requires an arbiter")]
    ArbiterRequired,
    #[error("resolution policy does not allow an arbiter")]
    ArbiterNotAllowed,
    #[error("nonce mismatch (expected={expected}, got={got})")]
    NonceMismatch { expected: u64, got: u64 },
}

impl WagerError {
    pub fn code(&self) -> u8 {
        match self {
            Self::InvalidStateTransition { .. } => ERROR_INVALID_STATE_TRANSITION,
            Self::Unauthorized => ERROR_UNAUTHORIZED,
            Self::StakeMismatch { .. } => ERROR_STAKE_MISMATCH,
            Self::DeadlinePassed => ERROR_DEADLINE_PASSED,
            Self::DeadlineNotReached => ERROR_DEADLINE_NOT_REACHED,
            Self::AlreadyFunded => ERROR_ALREADY_FUNDED,
            Self::AlreadyInitialized => ERROR_ALREADY_INITIALIZED,
            Self::ArithmeticOverflow => ERROR_ARITHMETIC_OVERFLOW,
            Self::WagerNotFound => ERROR_WAGER_NOT_FOUND,
            Self::InvalidStake => ERROR_INVALID_STAKE,
            Self::InvalidDeadline => ERROR_INVALID_DEADLINE,
            Self::InvalidOutcome => ERROR_INVALID_OUTCOME,
            Self::InsufficientBalance { .. } => ERROR_INSUFFICIENT_BALANCE,
            Self::VaultMismatch => ERROR_VAULT_MISMATCH,
            Self::ArbiterRequired => ERROR_ARBITER_REQUIRED,
            Self::ArbiterNotAllowed => ERROR_ARBITER_NOT_ALLOWED,
            Self::NonceMismatch { .. } => ERROR_NONCE_MISMATCH,
        }
    }

    pub fn invalid_transition(state: WagerState, operation: Operation) -> Self {
        Self::InvalidStateTransition { state, operation }
    }
}
