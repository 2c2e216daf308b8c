use anyhow::Result;
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use commonware_cryptography::ed25519::PublicKey;
use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
};
use wagerline_types::execution::{Account, Key, Transaction, Value};

#[derive(Debug)]
pub enum PrepareError {
    NonceMismatch { expected: u64, got: u64 },
    State(anyhow::Error),
}

pub trait State {
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<Value>>>;
    fn insert(&mut self, key: Key, value: Value) -> impl Future<Output = Result<()>>;
    fn delete(&mut self, key: &Key) -> impl Future<Output = Result<()>>;

    fn apply(&mut self, changes: Vec<(Key, Status)>) -> impl Future<Output = Result<()>> {
        async {
            for (key, status) in changes {
                match status {
                    Status::Update(value) => self.insert(key, value).await?,
                    Status::Delete => self.delete(&key).await?,
                }
            }
            Ok(())
        }
    }
}

/// In-memory key/value state.
///
/// Backs the simulator and every test in this workspace.
#[derive(Clone, Default, Debug)]
pub struct Memory {
    state: HashMap<Key, Value>,
}

impl Memory {
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Iterate all entries in key order.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        let mut entries: Vec<_> = self
            .state
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl FromIterator<(Key, Value)> for Memory {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        Self {
            state: iter.into_iter().collect(),
        }
    }
}

impl State for Memory {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(self.state.get(key).cloned())
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.state.insert(key, value);
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.state.remove(key);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Status {
    Update(Value),
    Delete,
}

impl Write for Status {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Status::Update(value) => {
                0u8.write(writer);
                value.write(writer);
            }
            Status::Delete => 1u8.write(writer),
        }
    }
}

impl Read for Status {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Status::Update(Value::read(reader)?)),
            1 => Ok(Status::Delete),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Status {
    fn encode_size(&self) -> usize {
        1 + match self {
            Status::Update(value) => value.encode_size(),
            Status::Delete => 0,
        }
    }
}

pub async fn nonce<S: State>(state: &S, public: &PublicKey) -> Result<u64> {
    Ok(load_account(state, public).await?.nonce)
}

/// Free funds held by `public`.
pub async fn balance<S: State>(state: &S, public: &PublicKey) -> Result<u64> {
    Ok(match state.get(&Key::Balance(public.clone())).await? {
        Some(Value::Balance(balance)) => balance,
        _ => 0,
    })
}

/// Height of the last block applied to `state` (0 before the first block).
pub async fn height<S: State>(state: &S) -> Result<u64> {
    Ok(match state.get(&Key::Commit).await? {
        Some(Value::Commit { height }) => height,
        _ => 0,
    })
}

pub(crate) async fn load_account<S: State>(state: &S, public: &PublicKey) -> Result<Account> {
    Ok(match state.get(&Key::Account(public.clone())).await? {
        Some(Value::Account(account)) => account,
        _ => Account::default(),
    })
}

pub(crate) fn validate_and_increment_nonce(
    account: &mut Account,
    provided_nonce: u64,
) -> Result<(), PrepareError> {
    if account.nonce != provided_nonce {
        return Err(PrepareError::NonceMismatch {
            expected: account.nonce,
            got: provided_nonce,
        });
    }
    account.nonce += 1;
    Ok(())
}

/// Nonce-only overlay used to pre-check a batch of transactions without executing them.
pub struct Noncer<'a, S: State> {
    state: &'a S,
    pending: BTreeMap<Key, Status>,
}

impl<'a, S: State> Noncer<'a, S> {
    pub fn new(state: &'a S) -> Self {
        Self {
            state,
            pending: BTreeMap::new(),
        }
    }

    pub async fn prepare(&mut self, transaction: &Transaction) -> Result<(), PrepareError> {
        let mut account = load_account(self, &transaction.public)
            .await
            .map_err(PrepareError::State)?;
        validate_and_increment_nonce(&mut account, transaction.nonce)?;
        self.insert(
            Key::Account(transaction.public.clone()),
            Value::Account(account),
        )
        .await
        .map_err(PrepareError::State)?;

        Ok(())
    }
}

impl<'a, S: State> State for Noncer<'a, S> {
    async fn get(&self, key: &Key) -> Result<Option<Value>> {
        Ok(match self.pending.get(key) {
            Some(Status::Update(value)) => Some(value.clone()),
            Some(Status::Delete) => None,
            None => self.state.get(key).await?,
        })
    }

    async fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.pending.insert(key, Status::Update(value));
        Ok(())
    }

    async fn delete(&mut self, key: &Key) -> Result<()> {
        self.pending.insert(key.clone(), Status::Delete);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::create_account_keypair;
    use commonware_runtime::{deterministic::Runner, Runner as _};
    use wagerline_types::execution::Instruction;

    #[test]
    fn noncer_tracks_sequential_nonces() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let state = Memory::default();
            let (private, public) = create_account_keypair(1);
            let mut noncer = Noncer::new(&state);

            let first = Transaction::sign(&private, 0, Instruction::Cancel { wager_id: 1 });
            noncer.prepare(&first).await.expect("first nonce");
            assert!(matches!(
                noncer.prepare(&first).await,
                Err(PrepareError::NonceMismatch {
                    expected: 1,
                    got: 0
                })
            ));

            let second = Transaction::sign(&private, 1, Instruction::Cancel { wager_id: 1 });
            noncer.prepare(&second).await.expect("second nonce");
            assert_eq!(nonce(&noncer, &public).await.unwrap(), 2);

            // The backing state is untouched.
            assert_eq!(nonce(&state, &public).await.unwrap(), 0);
        });
    }

    #[test]
    fn apply_handles_updates_and_deletes() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let mut state = Memory::default();
            let (_, public) = create_account_keypair(2);
            state
                .apply(vec![
                    (Key::Balance(public.clone()), Status::Update(Value::Balance(5))),
                    (Key::Commit, Status::Update(Value::Commit { height: 3 })),
                ])
                .await
                .unwrap();
            assert_eq!(balance(&state, &public).await.unwrap(), 5);
            assert_eq!(height(&state).await.unwrap(), 3);

            state
                .apply(vec![(Key::Balance(public.clone()), Status::Delete)])
                .await
                .unwrap();
            assert_eq!(balance(&state, &public).await.unwrap(), 0);
            assert_eq!(state.len(), 1);
        });
    }
}
