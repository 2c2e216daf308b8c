//! Wire and persisted types shared by every wagerline crate.

pub mod api;
pub use api::{Receipt, ReceiptStatus, Submission};
pub mod codec;
mod compat;
pub mod config;
pub use config::{ExecutionConfig, ResolutionPolicy};
pub mod error;
pub use error::WagerError;
pub mod execution;
pub use execution::NAMESPACE;
pub mod wager;
pub use wager::{vault_address, EscrowVault, Operation, Outcome, Payout, Wager, WagerState};
