use anyhow::Context;
use commonware_codec::{DecodeExt, Encode};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{error, info};
use wagerline_execution::{Memory, Status};
use wagerline_types::{
    execution::{Key, Value},
    Receipt,
};

enum PersistRequest {
    Block {
        height: u64,
        changes: Vec<(Key, Status)>,
        receipts: Vec<Receipt>,
    },
}

/// Everything recovered from disk at boot.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub state: Memory,
    pub receipts: Vec<Receipt>,
}

/// SQLite snapshot of the key/value state and the receipt log.
///
/// Writes happen on a dedicated thread; each block's changes land in a single
/// SQLite transaction so a crash never leaves half a block on disk.
pub struct StatePersistence {
    sender: mpsc::Sender<PersistRequest>,
    worker: JoinHandle<()>,
}

impl StatePersistence {
    pub fn load_and_start_sqlite(
        path: &Path,
        buffer_size: usize,
    ) -> anyhow::Result<(Self, Snapshot)> {
        let conn = Connection::open(path).context("open state persistence db")?;
        init_schema_sqlite(&conn)?;

        let snapshot = load_snapshot_sqlite(&conn)?;
        drop(conn);

        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let path = path.to_path_buf();
        let worker = std::thread::spawn(move || {
            persistence_worker(path, receiver);
        });

        Ok((Self { sender, worker }, snapshot))
    }

    /// Queues a committed block for writing.
    ///
    /// Waits for channel capacity instead of dropping, since a missing block would
    /// leave the snapshot behind the in-memory state.
    pub async fn persist_block(
        &self,
        height: u64,
        changes: Vec<(Key, Status)>,
        receipts: Vec<Receipt>,
    ) {
        let request = PersistRequest::Block {
            height,
            changes,
            receipts,
        };
        if self.sender.send(request).await.is_err() {
            error!(height, "state persistence worker stopped; block not persisted");
        }
    }

    /// Flushes queued blocks and stops the worker.
    pub fn shutdown(self) {
        drop(self.sender);
        if self.worker.join().is_err() {
            error!("state persistence worker panicked");
        }
    }
}

fn init_schema_sqlite(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS state (
             key_bytes BLOB PRIMARY KEY,
             value_bytes BLOB NOT NULL
         );
         CREATE TABLE IF NOT EXISTS receipts (
             digest BLOB PRIMARY KEY,
             height INTEGER NOT NULL,
             receipt_bytes BLOB NOT NULL
         );",
    )
    .context("init state persistence schema")?;
    Ok(())
}

fn load_snapshot_sqlite(conn: &Connection) -> anyhow::Result<Snapshot> {
    let mut stmt = conn.prepare("SELECT key_bytes, value_bytes FROM state")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;
    let mut entries = Vec::new();
    for row in rows {
        let (key, value) = row?;
        let key = Key::decode(&mut key.as_slice()).context("decode persisted key")?;
        let value = Value::decode(&mut value.as_slice()).context("decode persisted value")?;
        entries.push((key, value));
    }

    let mut stmt = conn.prepare("SELECT receipt_bytes FROM receipts ORDER BY height ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
    let mut receipts = Vec::new();
    for row in rows {
        let bytes = row?;
        receipts
            .push(Receipt::decode(&mut bytes.as_slice()).context("decode persisted receipt")?);
    }

    info!(
        entries = entries.len(),
        receipts = receipts.len(),
        "loaded state snapshot"
    );
    Ok(Snapshot {
        state: entries.into_iter().collect(),
        receipts,
    })
}

fn write_block(
    conn: &mut Connection,
    height: u64,
    changes: &[(Key, Status)],
    receipts: &[Receipt],
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    for (key, status) in changes {
        let key_bytes = key.encode().to_vec();
        match status {
            Status::Update(value) => {
                tx.execute(
                    "INSERT OR REPLACE INTO state (key_bytes, value_bytes) VALUES (?, ?)",
                    params![key_bytes, value.encode().to_vec()],
                )?;
            }
            Status::Delete => {
                tx.execute("DELETE FROM state WHERE key_bytes = ?", params![key_bytes])?;
            }
        }
    }
    for receipt in receipts {
        tx.execute(
            "INSERT OR REPLACE INTO receipts (digest, height, receipt_bytes) VALUES (?, ?, ?)",
            params![
                receipt.digest.encode().to_vec(),
                height,
                receipt.encode().to_vec()
            ],
        )?;
    }
    tx.commit()
}

fn persistence_worker(path: PathBuf, mut receiver: mpsc::Receiver<PersistRequest>) {
    let mut conn = match Connection::open(&path) {
        Ok(conn) => conn,
        Err(err) => {
            error!("State persistence open failed: {err}");
            return;
        }
    };

    if let Err(err) = init_schema_sqlite(&conn) {
        error!("State persistence init failed: {err}");
        return;
    }

    while let Some(request) = receiver.blocking_recv() {
        let PersistRequest::Block {
            height,
            changes,
            receipts,
        } = request;
        if let Err(err) = write_block(&mut conn, height, &changes, &receipts) {
            error!(height, "State persistence write failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_cryptography::{sha256::Sha256, Hasher};
    use wagerline_execution::mocks::create_account_keypair;
    use wagerline_types::{execution::Account, ReceiptStatus};

    #[tokio::test]
    async fn snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite");
        let (_, alice) = create_account_keypair(1);
        let (_, bob) = create_account_keypair(2);

        let (persistence, snapshot) = StatePersistence::load_and_start_sqlite(&path, 8).unwrap();
        assert!(snapshot.state.is_empty());
        assert!(snapshot.receipts.is_empty());

        let receipt = Receipt {
            digest: Sha256::hash(b"receipt"),
            public: alice.clone(),
            nonce: 0,
            height: 1,
            status: ReceiptStatus::Rejected {
                error_code: 9,
                message: "wager not found".to_string(),
            },
        };
        persistence
            .persist_block(
                1,
                vec![
                    (
                        Key::Account(alice.clone()),
                        Status::Update(Value::Account(Account { nonce: 1 })),
                    ),
                    (Key::Balance(bob.clone()), Status::Update(Value::Balance(5))),
                    (Key::Commit, Status::Update(Value::Commit { height: 1 })),
                ],
                vec![receipt.clone()],
            )
            .await;
        persistence
            .persist_block(
                2,
                vec![
                    (Key::Balance(bob.clone()), Status::Delete),
                    (Key::Commit, Status::Update(Value::Commit { height: 2 })),
                ],
                Vec::new(),
            )
            .await;
        persistence.shutdown();

        let (persistence, snapshot) = StatePersistence::load_and_start_sqlite(&path, 8).unwrap();
        persistence.shutdown();
        let entries = snapshot.state.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&(
            Key::Account(alice),
            Value::Account(Account { nonce: 1 })
        )));
        assert!(entries.contains(&(Key::Commit, Value::Commit { height: 2 })));
        assert_eq!(snapshot.receipts, vec![receipt]);
    }
}
