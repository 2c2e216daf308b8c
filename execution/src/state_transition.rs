//! Apply a block's transactions to state.
//!
//! The state transition is safe to re-run: a height that was already applied is a no-op and
//! a height gap is an error, so a block can never be skipped or applied twice.

use crate::{state::height as state_height, Layer, State, Status};
use anyhow::{anyhow, Context as _};
use commonware_cryptography::ed25519::PublicKey;
use std::collections::BTreeMap;
use tracing::info;
use wagerline_types::{
    execution::{Key, Output, Transaction, Value},
    ExecutionConfig, Receipt,
};

/// Result of executing a block's state transition
#[derive(Debug, Default)]
pub struct StateTransitionResult {
    /// Height of the block, or the current state height for a no-op.
    pub height: u64,
    /// Events and included transactions, terminated by `Output::Commit`.
    pub outputs: Vec<Output>,
    pub receipts: Vec<Receipt>,
    /// Every state change written by the block, including the commit marker.
    pub changes: Vec<(Key, Status)>,
    /// Map of public keys to their next expected nonce after processing
    pub processed_nonces: BTreeMap<PublicKey, u64>,
    /// Number of transactions that consumed a nonce.
    pub executed_transactions: usize,
}

impl StateTransitionResult {
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Execute state transition for a block
///
/// Processes all transactions against a staged [`Layer`] and applies the resulting changes
/// (plus the new commit height) to `state` in one batch. Only processes the block if it is
/// the next expected height.
pub async fn execute_state_transition<S: State>(
    state: &mut S,
    config: &ExecutionConfig,
    height: u64,
    now: i64,
    transactions: Vec<Transaction>,
) -> anyhow::Result<StateTransitionResult> {
    let current = state_height(&*state)
        .await
        .context("read state height")?;

    // If this is not the next expected height, either treat as a no-op (already processed),
    // or fail (height gap) to avoid silently skipping blocks.
    if height <= current {
        return Ok(StateTransitionResult {
            height: current,
            ..Default::default()
        });
    }
    let expected_next_height = current.saturating_add(1);
    if height != expected_next_height {
        return Err(anyhow!(
            "non-sequential height: state_height={current}, expected={expected_next_height}, requested={height}"
        ));
    }

    let mut layer = Layer::new(&*state, config.clone(), height, now);
    let executed = layer
        .execute(transactions)
        .await
        .with_context(|| format!("execute layer (height={height})"))?;
    let mut changes = layer.commit();
    changes.push((Key::Commit, Status::Update(Value::Commit { height })));

    state
        .apply(changes.clone())
        .await
        .with_context(|| format!("apply state changes (height={height})"))?;

    let mut outputs = executed.outputs;
    outputs.push(Output::Commit { height });
    let executed_transactions = executed.receipts.len();
    let rejected = executed
        .receipts
        .iter()
        .filter(|receipt| !receipt.status.is_applied())
        .count();
    info!(
        height,
        now,
        executed = executed_transactions,
        rejected,
        changes = changes.len(),
        "applied block"
    );

    Ok(StateTransitionResult {
        height,
        outputs,
        receipts: executed.receipts,
        changes,
        processed_nonces: executed.processed_nonces,
        executed_transactions,
    })
}
