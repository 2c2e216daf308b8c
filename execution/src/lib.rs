//! Wagerline execution layer.
//!
//! This crate contains the deterministic transaction execution logic ([`Layer`]) that moves
//! wagers through their lifecycle and custody funds in per-wager escrow vaults.
//!
//! ## Determinism requirements
//! - Do not read wall-clock time inside execution; the block time is passed to [`Layer::new`].
//! - Avoid iteration order of hash-based collections influencing outputs.
//!
//! ## Atomicity
//! Each transaction executes against its own staging overlay. A rejected transition discards
//! the overlay; only the signer's nonce advances. Re-running an already applied height through
//! [`state_transition::execute_state_transition`] is a no-op.
//!
//! ## Minimal execution pipeline (example)
//! ```rust,ignore
//! use wagerline_execution::{genesis, state_transition::execute_state_transition, Memory};
//! use wagerline_types::ExecutionConfig;
//!
//! # async fn example(alice: PublicKey, txs: Vec<Transaction>) -> anyhow::Result<()> {
//! let mut state = Memory::default();
//! genesis::allocate(&mut state, &[(alice, 1_000)]).await?;
//! let result = execute_state_transition(
//!     &mut state,
//!     &ExecutionConfig::default(),
//!     /* height */ 1,
//!     /* now */ 1_700_000_000,
//!     txs,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod genesis;
pub mod guard;
pub mod resolution;
pub mod state_transition;
pub mod vault;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

mod layer;

mod state;

pub use layer::{Executed, Layer};
pub use state::{balance, height, nonce, Memory, Noncer, PrepareError, State, Status};
