use commonware_codec::Encode;
use commonware_utils::hex;
use thiserror::Error;
use wagerline_types::Submission;

use crate::Simulator;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("transaction {index} has an invalid signature")]
    InvalidSignature { index: usize },
    #[error("mempool full (capacity {capacity})")]
    MempoolFull { capacity: usize },
    #[error("transaction {index} nonce {got} is too far ahead of next nonce {expected}")]
    NonceTooFarAhead { index: usize, expected: u64, got: u64 },
    #[error("failed to read account nonce: {0}")]
    State(String),
}

/// Admits a decoded submission into the mempool.
///
/// The whole submission is refused if any signature fails to verify or any nonce is
/// `max_backlog` or more past its signer's next nonce.
pub async fn apply_submission(
    simulator: &Simulator,
    submission: Submission,
) -> Result<usize, SubmitError> {
    match submission {
        Submission::Transactions(txs) => {
            if let Some(index) = txs.iter().position(|tx| !tx.verify()) {
                tracing::warn!(
                    index,
                    public = %hex(&txs[index].public.encode()),
                    nonce = txs[index].nonce,
                    "rejected submission with invalid signature"
                );
                return Err(SubmitError::InvalidSignature { index });
            }
            let max_backlog = simulator.config().max_backlog;
            for (index, tx) in txs.iter().enumerate() {
                let (expected, _) = simulator
                    .query_account(&tx.public)
                    .await
                    .map_err(|err| SubmitError::State(err.to_string()))?;
                if tx.nonce.saturating_sub(expected) >= max_backlog {
                    tracing::warn!(
                        index,
                        public = %hex(&tx.public.encode()),
                        tx = tx.nonce,
                        state = expected,
                        "rejected submission beyond nonce backlog"
                    );
                    return Err(SubmitError::NonceTooFarAhead {
                        index,
                        expected,
                        got: tx.nonce,
                    });
                }
            }
            if let Some(first) = txs.first() {
                tracing::info!(
                    txs = txs.len(),
                    first_public = %hex(&first.public.encode()),
                    first_nonce = first.nonce,
                    first_operation = %first.instruction.operation(),
                    "received transactions submission"
                );
            }
            let count = txs.len();
            simulator.submit_transactions(txs)?;
            Ok(count)
        }
    }
}
