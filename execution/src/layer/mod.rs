use anyhow::{Context as _, Result};
use commonware_cryptography::{ed25519::PublicKey, Digestible};
use std::collections::BTreeMap;
use tracing::debug;
use wagerline_types::{
    execution::{Event, Instruction, Key, Output, Transaction, Value},
    ExecutionConfig, Receipt, ReceiptStatus, WagerError,
};

use crate::state::{load_account, validate_and_increment_nonce, PrepareError, State, Status};

mod handlers;

/// Why a single transaction could not be applied.
///
/// `Rejected` is a refused transition and is reported back to the signer.
/// `State` is a backend failure and aborts the whole block.
#[derive(Debug)]
pub(crate) enum ApplyError {
    Rejected(WagerError),
    State(anyhow::Error),
}

impl From<WagerError> for ApplyError {
    fn from(err: WagerError) -> Self {
        Self::Rejected(err)
    }
}

impl From<anyhow::Error> for ApplyError {
    fn from(err: anyhow::Error) -> Self {
        Self::State(err)
    }
}

/// Everything produced by executing a batch of transactions.
#[derive(Debug, Default)]
pub struct Executed {
    /// Events and transactions in application order.
    pub outputs: Vec<Output>,
    /// One receipt per transaction that consumed a nonce.
    pub receipts: Vec<Receipt>,
    /// Next expected nonce of every signer that had a transaction included.
    pub processed_nonces: BTreeMap<PublicKey, u64>,
}

/// Staged execution over a read-only base state.
///
/// Writes land in a per-transaction overlay first. The overlay is merged into the
/// block's pending set when the transaction succeeds and dropped when it is rejected,
/// so a refused transition never leaves a partial write behind.
pub struct Layer<'a, S: State> {
    state: &'a S,
    pending: BTreeMap<Key, Status>,
    staged: BTreeMap<Key, Status>,

    config: ExecutionConfig,
    height: u64,
    now: i64,
}

impl<'a, S: State> Layer<'a, S> {
    pub fn new(state: &'a S, config: ExecutionConfig, height: u64, now: i64) -> Self {
        Self {
            state,
            pending: BTreeMap::new(),
            staged: BTreeMap::new(),

            config,
            height,
            now,
        }
    }

    async fn prepare(&mut self, transaction: &Transaction) -> Result<(), PrepareError> {
        let mut account = load_account(self, &transaction.public)
            .await
            .map_err(PrepareError::State)?;
        validate_and_increment_nonce(&mut account, transaction.nonce)?;
        self.pending.insert(
            Key::Account(transaction.public.clone()),
            Status::Update(Value::Account(account)),
        );

        Ok(())
    }

    async fn apply(&mut self, transaction: &Transaction) -> Result<Vec<Event>, ApplyError> {
        let public = &transaction.public;
        match &transaction.instruction {
            Instruction::Initialize {
                wager_id,
                stake,
                deadline,
                arbiter,
            } => {
                self.handle_initialize(public, *wager_id, *stake, *deadline, arbiter.as_ref())
                    .await
            }
            Instruction::Join { wager_id, amount } => {
                self.handle_join(public, *wager_id, *amount).await
            }
            Instruction::Cancel { wager_id } => self.handle_cancel(public, *wager_id).await,
            Instruction::Resolve {
                wager_id,
                outcome,
                approvals,
            } => {
                self.handle_resolve(public, *wager_id, outcome, approvals)
                    .await
            }
            Instruction::ClaimExpiry { wager_id } => {
                self.handle_claim_expiry(public, *wager_id).await
            }
        }
    }

    fn merge(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        self.pending.extend(staged);
    }

    pub async fn execute(&mut self, transactions: Vec<Transaction>) -> Result<Executed> {
        let mut executed = Executed::default();
        for tx in transactions {
            if !tx.verify() {
                debug!(public = ?tx.public, nonce = tx.nonce, "invalid signature; dropping transaction");
                continue;
            }
            match self.prepare(&tx).await {
                Ok(()) => {}
                Err(PrepareError::NonceMismatch { expected, got }) => {
                    debug!(
                        public = ?tx.public,
                        expected,
                        got,
                        "nonce mismatch; dropping transaction"
                    );
                    continue;
                }
                Err(PrepareError::State(err)) => {
                    return Err(err).context("state error during prepare");
                }
            }
            executed
                .processed_nonces
                .insert(tx.public.clone(), tx.nonce.saturating_add(1));

            let status = match self.apply(&tx).await {
                Ok(events) => {
                    self.merge();
                    executed
                        .outputs
                        .extend(events.iter().cloned().map(Output::Event));
                    ReceiptStatus::Applied { events }
                }
                Err(ApplyError::Rejected(err)) => {
                    self.staged.clear();
                    debug!(
                        public = ?tx.public,
                        nonce = tx.nonce,
                        wager_id = tx.instruction.wager_id(),
                        operation = %tx.instruction.operation(),
                        code = err.code(),
                        %err,
                        "transaction rejected"
                    );
                    executed
                        .outputs
                        .push(Output::Event(handlers::rejected(&tx, &err)));
                    ReceiptStatus::Rejected {
                        error_code: err.code(),
                        message: err.to_string(),
                    }
                }
                Err(ApplyError::State(err)) => {
                    return Err(err).context("state error during apply");
                }
            };

            executed.receipts.push(Receipt {
                digest: tx.digest(),
                public: tx.public.clone(),
                nonce: tx.nonce,
                height: self.height,
                status,
            });
            executed.outputs.push(Output::Transaction(tx));
        }
        Ok(executed)
    }

    pub fn commit(self) -> Vec<(Key, Status)> {
        self.pending.into_iter().collect()
    }
}

impl<'a, S: State> State for Layer<'a, S> {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        let status = self.staged.get(key).or_else(|| self.pending.get(key));
        Ok(match status {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => self.state.get(key).await?,
        })
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.staged.insert(key, Status::Update(value));
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.staged.insert(key.clone(), Status::Delete);
        Ok(())
    }
}
