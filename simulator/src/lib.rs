//! Local backend for wagerline.
//!
//! Holds the state, a mempool and every receipt, produces a block per interval and
//! serves the HTTP API used by `wagerline-client`.

use anyhow::{ensure, Result};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use wagerline_execution::{
    balance, genesis, height, nonce,
    state_transition::{execute_state_transition, StateTransitionResult},
    vault, Memory, Noncer, PrepareError, State, Status,
};
use wagerline_types::{
    execution::{Key, Transaction, Value},
    EscrowVault, Receipt, Wager,
};

mod api;
mod config;
mod persistence;
mod submission;

pub use api::Api;
pub use config::{
    GenesisAllocation, SimulatorConfig, DEFAULT_BLOCK_INTERVAL_MS, DEFAULT_MAX_BACKLOG,
    DEFAULT_MAX_DEFERRED_BLOCKS, DEFAULT_MEMPOOL_CAPACITY,
};
pub use persistence::{Snapshot, StatePersistence};
pub use submission::{apply_submission, SubmitError};

/// Seconds since the unix epoch, the clock blocks are stamped with.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// A mempool entry and the number of blocks it has been passed over.
struct Queued {
    tx: Transaction,
    deferrals: u64,
}

pub struct Simulator {
    config: SimulatorConfig,
    state: RwLock<Memory>,
    mempool: Mutex<VecDeque<Queued>>,
    receipts: RwLock<HashMap<Digest, Receipt>>,
    persistence: Option<StatePersistence>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self::from_snapshot(config, Snapshot::default(), None)
    }

    /// Resumes from a persisted snapshot. New blocks are written to `persistence`.
    pub fn from_snapshot(
        config: SimulatorConfig,
        snapshot: Snapshot,
        persistence: Option<StatePersistence>,
    ) -> Self {
        let receipts = snapshot
            .receipts
            .into_iter()
            .map(|receipt| (receipt.digest, receipt))
            .collect();
        Self {
            config,
            state: RwLock::new(snapshot.state),
            mempool: Mutex::new(VecDeque::new()),
            receipts: RwLock::new(receipts),
            persistence,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Credits the genesis balances. Refused once any state exists.
    pub async fn allocate_genesis(&self, allocations: &[(PublicKey, u64)]) -> Result<u64> {
        let mut state = self.state.write().await;
        ensure!(state.is_empty(), "genesis requires an empty state");

        let mut funded = Memory::default();
        let total = genesis::allocate(&mut funded, allocations).await?;
        let changes: Vec<_> = funded
            .entries()
            .into_iter()
            .map(|(key, value)| (key, Status::Update(value)))
            .collect();
        state.apply(changes.clone()).await?;
        if let Some(persistence) = &self.persistence {
            persistence.persist_block(0, changes, Vec::new()).await;
        }
        Ok(total)
    }

    /// Queues transactions for the next block, in arrival order.
    pub fn submit_transactions(&self, transactions: Vec<Transaction>) -> Result<(), SubmitError> {
        let mut mempool = self.mempool.lock().unwrap_or_else(PoisonError::into_inner);
        let capacity = self.config.mempool_capacity;
        if mempool.len().saturating_add(transactions.len()) > capacity {
            return Err(SubmitError::MempoolFull { capacity });
        }
        mempool.extend(transactions.into_iter().map(|tx| Queued { tx, deferrals: 0 }));
        Ok(())
    }

    pub fn mempool_len(&self) -> usize {
        self.mempool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Executes the mempool as the next block, stamped with `now`.
    ///
    /// Transactions whose nonce is ahead of their signer's chain stay queued for at most
    /// `max_deferred_blocks` blocks; stale nonces are dropped. Returns `None` without
    /// advancing the height when nothing is executable.
    pub async fn produce_block(&self, now: i64) -> Result<Option<StateTransitionResult>> {
        let mut state = self.state.write().await;
        let pending: Vec<_> = self
            .mempool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut included = Vec::with_capacity(pending.len());
        let mut deferred = Vec::new();
        {
            let mut noncer = Noncer::new(&*state);
            for mut queued in pending {
                match noncer.prepare(&queued.tx).await {
                    Ok(()) => included.push(queued.tx),
                    Err(PrepareError::NonceMismatch { expected, got }) if got > expected => {
                        queued.deferrals += 1;
                        if queued.deferrals > self.config.max_deferred_blocks {
                            debug!(expected, got, "evicting transaction stuck behind a nonce gap");
                        } else {
                            deferred.push(queued);
                        }
                    }
                    Err(PrepareError::NonceMismatch { expected, got }) => {
                        debug!(expected, got, "dropping stale transaction");
                    }
                    Err(PrepareError::State(err)) => return Err(err),
                }
            }
        }
        if !deferred.is_empty() {
            let mut mempool = self.mempool.lock().unwrap_or_else(PoisonError::into_inner);
            for queued in deferred.into_iter().rev() {
                mempool.push_front(queued);
            }
        }
        if included.is_empty() {
            debug!(deferred = self.mempool_len(), "no executable transactions, skipping block");
            return Ok(None);
        }

        let next = height(&*state).await?.saturating_add(1);
        let result = execute_state_transition(
            &mut *state,
            &self.config.execution,
            next,
            now,
            included,
        )
        .await?;

        {
            let mut receipts = self.receipts.write().await;
            for receipt in &result.receipts {
                receipts.insert(receipt.digest, receipt.clone());
            }
        }
        if let Some(persistence) = &self.persistence {
            persistence
                .persist_block(result.height, result.changes.clone(), result.receipts.clone())
                .await;
        }
        Ok(Some(result))
    }

    /// Produces a block every `interval` while the mempool has work.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_ms = interval.as_millis() as u64, "block production started");
        loop {
            ticker.tick().await;
            if self.mempool_len() == 0 {
                continue;
            }
            match self.produce_block(unix_now()).await {
                Ok(Some(result)) => {
                    debug!(height = result.height, txs = result.receipts.len(), "produced block")
                }
                Ok(None) => {}
                Err(err) => error!(?err, "block production failed"),
            }
        }
    }

    pub async fn height(&self) -> Result<u64> {
        height(&*self.state.read().await).await
    }

    pub async fn query_wager(&self, wager_id: u64) -> Result<Option<Wager>> {
        let state = self.state.read().await;
        Ok(match state.get(&Key::Wager(wager_id)).await? {
            Some(Value::Wager(wager)) => Some(wager),
            _ => None,
        })
    }

    pub async fn query_vault(&self, wager_id: u64) -> Result<Option<EscrowVault>> {
        vault::load(&*self.state.read().await, wager_id).await
    }

    /// Returns `(nonce, balance)` for `public`; unknown principals are all zero.
    pub async fn query_account(&self, public: &PublicKey) -> Result<(u64, u64)> {
        let state = self.state.read().await;
        Ok((nonce(&*state, public).await?, balance(&*state, public).await?))
    }

    pub async fn query_receipt(&self, digest: &Digest) -> Option<Receipt> {
        self.receipts.read().await.get(digest).cloned()
    }

    /// Flushes pending writes to disk.
    pub fn shutdown(self) {
        if let Some(persistence) = self.persistence {
            persistence.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_cryptography::{ed25519::PrivateKey, Digestible, Signer};
    use wagerline_execution::mocks::create_account_keypair;
    use wagerline_types::{execution::Instruction, ExecutionConfig, ReceiptStatus, WagerState};

    const NOW: i64 = 1_700_000_000;

    fn initialize(private: &PrivateKey, nonce: u64, wager_id: u64) -> Transaction {
        Transaction::sign(
            private,
            nonce,
            Instruction::Initialize {
                wager_id,
                stake: 100,
                deadline: NOW + 3_600,
                arbiter: None,
            },
        )
    }

    async fn funded(path: Option<&std::path::Path>) -> (Simulator, PrivateKey, PrivateKey) {
        let (creator, creator_public) = create_account_keypair(1);
        let (joiner, joiner_public) = create_account_keypair(2);
        let simulator = match path {
            Some(path) => {
                let (persistence, snapshot) =
                    StatePersistence::load_and_start_sqlite(path, 16).unwrap();
                Simulator::from_snapshot(SimulatorConfig::default(), snapshot, Some(persistence))
            }
            None => Simulator::new(SimulatorConfig::default()),
        };
        simulator
            .allocate_genesis(&[(creator_public, 1_000), (joiner_public, 1_000)])
            .await
            .unwrap();
        (simulator, creator, joiner)
    }

    #[tokio::test]
    async fn block_applies_mempool_and_records_receipts() {
        let (simulator, creator, joiner) = funded(None).await;
        let create = initialize(&creator, 0, 1);
        let join = Transaction::sign(
            &joiner,
            0,
            Instruction::Join {
                wager_id: 1,
                amount: 100,
            },
        );
        simulator
            .submit_transactions(vec![create.clone(), join.clone()])
            .unwrap();
        assert_eq!(simulator.mempool_len(), 2);

        let result = simulator.produce_block(NOW).await.unwrap().unwrap();
        assert_eq!(result.height, 1);
        assert_eq!(simulator.mempool_len(), 0);
        assert_eq!(simulator.height().await.unwrap(), 1);

        let wager = simulator.query_wager(1).await.unwrap().unwrap();
        assert_eq!(wager.state, WagerState::Active);
        assert_eq!(simulator.query_vault(1).await.unwrap().unwrap().balance(), 200);
        assert_eq!(
            simulator.query_account(&creator.public_key()).await.unwrap(),
            (1, 900)
        );

        let receipt = simulator.query_receipt(&join.digest()).await.unwrap();
        assert_eq!(receipt.height, 1);
        assert!(receipt.status.is_applied());
        assert!(simulator.query_receipt(&create.digest()).await.is_some());
    }

    #[tokio::test]
    async fn rejected_transaction_gets_receipt() {
        let (simulator, creator, _) = funded(None).await;
        let cancel = Transaction::sign(&creator, 0, Instruction::Cancel { wager_id: 9 });
        simulator.submit_transactions(vec![cancel.clone()]).unwrap();
        simulator.produce_block(NOW).await.unwrap();

        let receipt = simulator.query_receipt(&cancel.digest()).await.unwrap();
        let ReceiptStatus::Rejected { error_code, .. } = receipt.status else {
            panic!("expected rejection");
        };
        assert_eq!(error_code, wagerline_types::error::ERROR_WAGER_NOT_FOUND);
        assert_eq!(
            simulator.query_account(&creator.public_key()).await.unwrap(),
            (1, 1_000)
        );
    }

    #[tokio::test]
    async fn future_nonces_wait_for_their_turn() {
        let (simulator, creator, _) = funded(None).await;
        let cancel = Transaction::sign(&creator, 1, Instruction::Cancel { wager_id: 1 });
        simulator.submit_transactions(vec![cancel.clone()]).unwrap();

        // Nothing to execute yet: nonce 1 is ahead of the signer's chain.
        assert!(simulator.produce_block(NOW).await.unwrap().is_none());
        assert_eq!(simulator.mempool_len(), 1);
        assert_eq!(simulator.height().await.unwrap(), 0);

        simulator
            .submit_transactions(vec![initialize(&creator, 0, 1)])
            .unwrap();
        simulator.produce_block(NOW + 1).await.unwrap();
        assert_eq!(simulator.mempool_len(), 1);
        simulator.produce_block(NOW + 2).await.unwrap();
        assert_eq!(simulator.mempool_len(), 0);
        assert_eq!(
            simulator.query_wager(1).await.unwrap().unwrap().state,
            WagerState::Cancelled
        );

        // A replayed transaction is dropped without a second receipt.
        simulator.submit_transactions(vec![cancel.clone()]).unwrap();
        assert!(simulator.produce_block(NOW + 3).await.unwrap().is_none());
        assert_eq!(simulator.mempool_len(), 0);
        assert_eq!(
            simulator.query_receipt(&cancel.digest()).await.unwrap().height,
            2
        );
    }

    #[tokio::test]
    async fn nonce_gaps_cannot_clog_the_mempool() {
        let config = SimulatorConfig {
            mempool_capacity: 2,
            max_deferred_blocks: 2,
            ..Default::default()
        };
        let simulator = Simulator::new(config);
        let (creator, creator_public) = create_account_keypair(1);
        let (stranger, _) = create_account_keypair(9);
        simulator
            .allocate_genesis(&[(creator_public, 1_000)])
            .await
            .unwrap();

        let gapped: Vec<_> = (1..=2)
            .map(|nonce| Transaction::sign(&stranger, nonce, Instruction::Cancel { wager_id: 1 }))
            .collect();
        simulator.submit_transactions(gapped).unwrap();

        // Passed over twice, evicted on the third block.
        for now in NOW..NOW + 3 {
            assert!(simulator.produce_block(now).await.unwrap().is_none());
        }
        assert_eq!(simulator.mempool_len(), 0);
        assert_eq!(simulator.height().await.unwrap(), 0);

        simulator
            .submit_transactions(vec![initialize(&creator, 0, 1)])
            .unwrap();
        let result = simulator.produce_block(NOW + 3).await.unwrap().unwrap();
        assert_eq!(result.height, 1);
        assert_eq!(
            simulator.query_wager(1).await.unwrap().unwrap().state,
            WagerState::Created
        );
    }

    #[tokio::test]
    async fn mempool_capacity_is_enforced() {
        let config = SimulatorConfig {
            mempool_capacity: 1,
            ..Default::default()
        };
        let simulator = Simulator::new(config);
        let (creator, _) = create_account_keypair(1);
        simulator
            .submit_transactions(vec![initialize(&creator, 0, 1)])
            .unwrap();
        assert!(matches!(
            simulator.submit_transactions(vec![initialize(&creator, 1, 2)]),
            Err(SubmitError::MempoolFull { capacity: 1 })
        ));
    }

    #[tokio::test]
    async fn genesis_only_once() {
        let (simulator, creator, _) = funded(None).await;
        assert!(simulator
            .allocate_genesis(&[(creator.public_key(), 1)])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn persisted_state_reloads_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulator.sqlite");

        let (simulator, creator, _) = funded(Some(&path)).await;
        let create = initialize(&creator, 0, 1);
        simulator.submit_transactions(vec![create.clone()]).unwrap();
        simulator.produce_block(NOW).await.unwrap();
        simulator
            .submit_transactions(vec![Transaction::sign(
                &creator,
                1,
                Instruction::Cancel { wager_id: 1 },
            )])
            .unwrap();
        simulator.produce_block(NOW + 10).await.unwrap();
        let before = simulator.state.read().await.entries();
        simulator.shutdown();

        let (persistence, snapshot) = StatePersistence::load_and_start_sqlite(&path, 16).unwrap();
        let restored =
            Simulator::from_snapshot(SimulatorConfig::default(), snapshot, Some(persistence));
        assert_eq!(restored.state.read().await.entries(), before);
        assert_eq!(restored.height().await.unwrap(), 2);
        assert!(restored.query_receipt(&create.digest()).await.is_some());
        assert_eq!(
            restored.query_wager(1).await.unwrap().unwrap().state,
            WagerState::Cancelled
        );

        // Replaying a committed height against the restored state changes nothing.
        let replay = execute_state_transition(
            &mut *restored.state.write().await,
            &ExecutionConfig::default(),
            2,
            NOW + 20,
            vec![create],
        )
        .await
        .unwrap();
        assert!(replay.is_noop());
        assert_eq!(restored.state.read().await.entries(), before);
        restored.shutdown();
    }
}
