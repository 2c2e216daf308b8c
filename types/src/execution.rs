use bytes::{Buf, BufMut};
use commonware_codec::{
    Encode, EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write,
};
use commonware_cryptography::{
    ed25519::{self, PublicKey},
    sha256::{Digest, Sha256},
    Digestible, Hasher, Signer, Verifier,
};
use commonware_utils::union;

use crate::codec::{read_string, string_encode_size, write_string};
use crate::wager::{EscrowVault, Operation, Outcome, Payout, Wager};

pub const NAMESPACE: &[u8] = b"_WAGERLINE";
pub const TRANSACTION_SUFFIX: &[u8] = b"_TX";
pub const RESOLVE_SUFFIX: &[u8] = b"_RESOLVE";

/// Upper bound on co-signatures attached to a resolution.
pub const MAX_APPROVALS: usize = 2;

/// Upper bound on payouts produced by a single settlement.
pub const MAX_PAYOUTS: usize = 2;

/// Upper bound on the human-readable message of a rejection.
pub const MAX_ERROR_MESSAGE_LENGTH: usize = 256;

#[inline]
pub fn transaction_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, TRANSACTION_SUFFIX)
}

#[inline]
pub fn resolve_namespace(namespace: &[u8]) -> Vec<u8> {
    union(namespace, RESOLVE_SUFFIX)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub instruction: Instruction,

    pub public: ed25519::PublicKey,
    pub signature: ed25519::Signature,
}

impl Transaction {
    fn payload(nonce: &u64, instruction: &Instruction) -> Vec<u8> {
        let mut payload = Vec::new();
        nonce.write(&mut payload);
        instruction.write(&mut payload);

        payload
    }

    pub fn sign(private: &ed25519::PrivateKey, nonce: u64, instruction: Instruction) -> Self {
        let signature = private.sign(
            &transaction_namespace(NAMESPACE),
            &Self::payload(&nonce, &instruction),
        );

        Self {
            nonce,
            instruction,
            public: private.public_key(),
            signature,
        }
    }

    pub fn verify(&self) -> bool {
        self.public.verify(
            &transaction_namespace(NAMESPACE),
            &Self::payload(&self.nonce, &self.instruction),
            &self.signature,
        )
    }
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.nonce.write(writer);
        self.instruction.write(writer);
        self.public.write(writer);
        self.signature.write(writer);
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let nonce = u64::read(reader)?;
        let instruction = Instruction::read(reader)?;
        let public = ed25519::PublicKey::read(reader)?;
        let signature = ed25519::Signature::read(reader)?;

        Ok(Self {
            nonce,
            instruction,
            public,
            signature,
        })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.nonce.encode_size()
            + self.instruction.encode_size()
            + self.public.encode_size()
            + self.signature.encode_size()
    }
}

impl Digestible for Transaction {
    type Digest = Digest;

    fn digest(&self) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(self.nonce.to_be_bytes().as_ref());
        hasher.update(self.instruction.encode().as_ref());
        hasher.update(self.public.as_ref());
        // The signature is excluded: any valid signature authorizes the same transaction.
        hasher.finalize()
    }
}

/// A participant's signature over a proposed outcome.
///
/// Used when a wager is settled by mutual agreement instead of an arbiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Approval {
    pub public: ed25519::PublicKey,
    pub signature: ed25519::Signature,
}

impl Approval {
    fn payload(wager_id: u64, outcome: &Outcome) -> Vec<u8> {
        let mut payload = Vec::new();
        wager_id.write(&mut payload);
        outcome.write(&mut payload);
        payload
    }

    pub fn sign(private: &ed25519::PrivateKey, wager_id: u64, outcome: &Outcome) -> Self {
        let signature = private.sign(
            &resolve_namespace(NAMESPACE),
            &Self::payload(wager_id, outcome),
        );
        Self {
            public: private.public_key(),
            signature,
        }
    }

    pub fn verify(&self, wager_id: u64, outcome: &Outcome) -> bool {
        self.public.verify(
            &resolve_namespace(NAMESPACE),
            &Self::payload(wager_id, outcome),
            &self.signature,
        )
    }
}

impl Write for Approval {
    fn write(&self, writer: &mut impl BufMut) {
        self.public.write(writer);
        self.signature.write(writer);
    }
}

impl Read for Approval {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            public: ed25519::PublicKey::read(reader)?,
            signature: ed25519::Signature::read(reader)?,
        })
    }
}

impl FixedSize for Approval {
    const SIZE: usize = ed25519::PublicKey::SIZE + ed25519::Signature::SIZE;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Open a wager and deposit the creator's stake.
    /// Binary: [1] [wagerId:u64] [stake:u64] [deadline:i64] [arbiter:opt<32>]
    Initialize {
        wager_id: u64,
        stake: u64,
        deadline: i64,
        arbiter: Option<PublicKey>,
    },

    /// Take the other side of a wager by depositing exactly its stake.
    /// Binary: [2] [wagerId:u64] [amount:u64]
    Join { wager_id: u64, amount: u64 },

    /// Withdraw an unjoined wager.
    /// Binary: [3] [wagerId:u64]
    Cancel { wager_id: u64 },

    /// Settle an active wager.
    /// Binary: [4] [wagerId:u64] [outcome] [approvals:vec<96>]
    Resolve {
        wager_id: u64,
        outcome: Outcome,
        approvals: Vec<Approval>,
    },

    /// Refund both sides of an active wager once its deadline has passed.
    /// Binary: [5] [wagerId:u64]
    ClaimExpiry { wager_id: u64 },
}

impl Instruction {
    pub fn wager_id(&self) -> u64 {
        match self {
            Self::Initialize { wager_id, .. }
            | Self::Join { wager_id, .. }
            | Self::Cancel { wager_id }
            | Self::Resolve { wager_id, .. }
            | Self::ClaimExpiry { wager_id } => *wager_id,
        }
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Initialize { .. } => Operation::Initialize,
            Self::Join { .. } => Operation::Join,
            Self::Cancel { .. } => Operation::Cancel,
            Self::Resolve { .. } => Operation::Resolve,
            Self::ClaimExpiry { .. } => Operation::ClaimExpiry,
        }
    }
}

impl Write for Instruction {
    fn write(&self, writer: &mut impl BufMut) {
        (self.operation() as u8).write(writer);
        match self {
            Self::Initialize {
                wager_id,
                stake,
                deadline,
                arbiter,
            } => {
                wager_id.write(writer);
                stake.write(writer);
                deadline.write(writer);
                arbiter.write(writer);
            }
            Self::Join { wager_id, amount } => {
                wager_id.write(writer);
                amount.write(writer);
            }
            Self::Cancel { wager_id } | Self::ClaimExpiry { wager_id } => {
                wager_id.write(writer);
            }
            Self::Resolve {
                wager_id,
                outcome,
                approvals,
            } => {
                wager_id.write(writer);
                outcome.write(writer);
                approvals.write(writer);
            }
        }
    }
}

impl Read for Instruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let instruction = match u8::read(reader)? {
            1 => Self::Initialize {
                wager_id: u64::read(reader)?,
                stake: u64::read(reader)?,
                deadline: i64::read(reader)?,
                arbiter: Option::<PublicKey>::read(reader)?,
            },
            2 => Self::Join {
                wager_id: u64::read(reader)?,
                amount: u64::read(reader)?,
            },
            3 => Self::Cancel {
                wager_id: u64::read(reader)?,
            },
            4 => Self::Resolve {
                wager_id: u64::read(reader)?,
                outcome: Outcome::read(reader)?,
                approvals: Vec::read_range(reader, 0..=MAX_APPROVALS)?,
            },
            5 => Self::ClaimExpiry {
                wager_id: u64::read(reader)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(instruction)
    }
}

impl EncodeSize for Instruction {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Initialize { arbiter, .. } => {
                    u64::SIZE + u64::SIZE + i64::SIZE + arbiter.encode_size()
                }
                Self::Join { .. } => u64::SIZE + u64::SIZE,
                Self::Cancel { .. } | Self::ClaimExpiry { .. } => u64::SIZE,
                Self::Resolve {
                    outcome, approvals, ..
                } => u64::SIZE + outcome.encode_size() + approvals.encode_size(),
            }
    }
}

/// Per-signer replay protection.
#[derive(Clone, Default, Eq, PartialEq, Debug)]
pub struct Account {
    pub nonce: u64,
}

impl Write for Account {
    fn write(&self, writer: &mut impl BufMut) {
        self.nonce.write(writer);
    }
}

impl Read for Account {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            nonce: u64::read(reader)?,
        })
    }
}

impl FixedSize for Account {
    const SIZE: usize = u64::SIZE;
}

#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum Key {
    /// Nonce tracking (tag 0)
    Account(PublicKey),
    /// Free funds of a principal (tag 1)
    Balance(PublicKey),
    /// Wager record by id (tag 2)
    Wager(u64),
    /// Escrow vault by derived address (tag 3)
    Vault(Digest),
    /// Last applied block height (tag 4)
    Commit,
}

impl Write for Key {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(pk) => {
                0u8.write(writer);
                pk.write(writer);
            }
            Self::Balance(pk) => {
                1u8.write(writer);
                pk.write(writer);
            }
            Self::Wager(id) => {
                2u8.write(writer);
                id.write(writer);
            }
            Self::Vault(address) => {
                3u8.write(writer);
                address.write(writer);
            }
            Self::Commit => 4u8.write(writer),
        }
    }
}

impl Read for Key {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let key = match u8::read(reader)? {
            0 => Self::Account(PublicKey::read(reader)?),
            1 => Self::Balance(PublicKey::read(reader)?),
            2 => Self::Wager(u64::read(reader)?),
            3 => Self::Vault(Digest::read(reader)?),
            4 => Self::Commit,
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(key)
    }
}

impl EncodeSize for Key {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(_) | Self::Balance(_) => PublicKey::SIZE,
                Self::Wager(_) => u64::SIZE,
                Self::Vault(_) => Digest::SIZE,
                Self::Commit => 0,
            }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Value {
    Account(Account),
    Balance(u64),
    Wager(Wager),
    Vault(EscrowVault),
    Commit { height: u64 },
}

impl Write for Value {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Account(account) => {
                0u8.write(writer);
                account.write(writer);
            }
            Self::Balance(balance) => {
                1u8.write(writer);
                balance.write(writer);
            }
            Self::Wager(wager) => {
                2u8.write(writer);
                wager.write(writer);
            }
            Self::Vault(vault) => {
                3u8.write(writer);
                vault.write(writer);
            }
            Self::Commit { height } => {
                4u8.write(writer);
                height.write(writer);
            }
        }
    }
}

impl Read for Value {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = match u8::read(reader)? {
            0 => Self::Account(Account::read(reader)?),
            1 => Self::Balance(u64::read(reader)?),
            2 => Self::Wager(Wager::read(reader)?),
            3 => Self::Vault(EscrowVault::read(reader)?),
            4 => Self::Commit {
                height: u64::read(reader)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(value)
    }
}

impl EncodeSize for Value {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Account(account) => account.encode_size(),
                Self::Balance(balance) => balance.encode_size(),
                Self::Wager(wager) => wager.encode_size(),
                Self::Vault(vault) => vault.encode_size(),
                Self::Commit { height } => height.encode_size(),
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // Lifecycle events (tags 10-14)
    WagerInitialized {
        wager_id: u64,
        creator: PublicKey,
        arbiter: Option<PublicKey>,
        stake: u64,
        deadline: i64,
    },
    WagerActivated {
        wager_id: u64,
        counterparty: PublicKey,
    },
    WagerResolved {
        wager_id: u64,
        outcome: Outcome,
        payouts: Vec<Payout>,
    },
    WagerCancelled {
        wager_id: u64,
        payouts: Vec<Payout>,
    },
    WagerExpired {
        wager_id: u64,
        payouts: Vec<Payout>,
    },

    // Vault movements (tags 15-16)
    VaultDeposited {
        wager_id: u64,
        from: PublicKey,
        amount: u64,
        vault_balance: u64,
    },
    VaultPaidOut {
        wager_id: u64,
        to: PublicKey,
        amount: u64,
        vault_balance: u64,
    },

    // Rejection (tag 29)
    TransactionRejected {
        public: PublicKey,
        nonce: u64,
        wager_id: u64,
        error_code: u8,
        message: String,
    },
}

fn read_payouts(reader: &mut impl Buf) -> Result<Vec<Payout>, Error> {
    Vec::read_range(reader, 0..=MAX_PAYOUTS)
}

impl Write for Event {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::WagerInitialized {
                wager_id,
                creator,
                arbiter,
                stake,
                deadline,
            } => {
                10u8.write(writer);
                wager_id.write(writer);
                creator.write(writer);
                arbiter.write(writer);
                stake.write(writer);
                deadline.write(writer);
            }
            Self::WagerActivated {
                wager_id,
                counterparty,
            } => {
                11u8.write(writer);
                wager_id.write(writer);
                counterparty.write(writer);
            }
            Self::WagerResolved {
                wager_id,
                outcome,
                payouts,
            } => {
                12u8.write(writer);
                wager_id.write(writer);
                outcome.write(writer);
                payouts.write(writer);
            }
            Self::WagerCancelled { wager_id, payouts } => {
                13u8.write(writer);
                wager_id.write(writer);
                payouts.write(writer);
            }
            Self::WagerExpired { wager_id, payouts } => {
                14u8.write(writer);
                wager_id.write(writer);
                payouts.write(writer);
            }
            Self::VaultDeposited {
                wager_id,
                from,
                amount,
                vault_balance,
            } => {
                15u8.write(writer);
                wager_id.write(writer);
                from.write(writer);
                amount.write(writer);
                vault_balance.write(writer);
            }
            Self::VaultPaidOut {
                wager_id,
                to,
                amount,
                vault_balance,
            } => {
                16u8.write(writer);
                wager_id.write(writer);
                to.write(writer);
                amount.write(writer);
                vault_balance.write(writer);
            }
            Self::TransactionRejected {
                public,
                nonce,
                wager_id,
                error_code,
                message,
            } => {
                29u8.write(writer);
                public.write(writer);
                nonce.write(writer);
                wager_id.write(writer);
                error_code.write(writer);
                write_string(message, writer);
            }
        }
    }
}

impl Read for Event {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let event = match u8::read(reader)? {
            10 => Self::WagerInitialized {
                wager_id: u64::read(reader)?,
                creator: PublicKey::read(reader)?,
                arbiter: Option::<PublicKey>::read(reader)?,
                stake: u64::read(reader)?,
                deadline: i64::read(reader)?,
            },
            11 => Self::WagerActivated {
                wager_id: u64::read(reader)?,
                counterparty: PublicKey::read(reader)?,
            },
            12 => Self::WagerResolved {
                wager_id: u64::read(reader)?,
                outcome: Outcome::read(reader)?,
                payouts: read_payouts(reader)?,
            },
            13 => Self::WagerCancelled {
                wager_id: u64::read(reader)?,
                payouts: read_payouts(reader)?,
            },
            14 => Self::WagerExpired {
                wager_id: u64::read(reader)?,
                payouts: read_payouts(reader)?,
            },
            15 => Self::VaultDeposited {
                wager_id: u64::read(reader)?,
                from: PublicKey::read(reader)?,
                amount: u64::read(reader)?,
                vault_balance: u64::read(reader)?,
            },
            16 => Self::VaultPaidOut {
                wager_id: u64::read(reader)?,
                to: PublicKey::read(reader)?,
                amount: u64::read(reader)?,
                vault_balance: u64::read(reader)?,
            },
            29 => Self::TransactionRejected {
                public: PublicKey::read(reader)?,
                nonce: u64::read(reader)?,
                wager_id: u64::read(reader)?,
                error_code: u8::read(reader)?,
                message: read_string(reader, MAX_ERROR_MESSAGE_LENGTH)?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };

        Ok(event)
    }
}

impl EncodeSize for Event {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::WagerInitialized { arbiter, .. } => {
                    u64::SIZE + PublicKey::SIZE + arbiter.encode_size() + u64::SIZE + i64::SIZE
                }
                Self::WagerActivated { .. } => u64::SIZE + PublicKey::SIZE,
                Self::WagerResolved {
                    outcome, payouts, ..
                } => u64::SIZE + outcome.encode_size() + payouts.encode_size(),
                Self::WagerCancelled { payouts, .. } | Self::WagerExpired { payouts, .. } => {
                    u64::SIZE + payouts.encode_size()
                }
                Self::VaultDeposited { .. } | Self::VaultPaidOut { .. } => {
                    u64::SIZE + PublicKey::SIZE + u64::SIZE + u64::SIZE
                }
                Self::TransactionRejected { message, .. } => {
                    PublicKey::SIZE + u64::SIZE + u64::SIZE + u8::SIZE + string_encode_size(message)
                }
            }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Output {
    Event(Event),
    Transaction(Transaction),
    Commit { height: u64 },
}

impl Write for Output {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Event(event) => {
                0u8.write(writer);
                event.write(writer);
            }
            Self::Transaction(transaction) => {
                1u8.write(writer);
                transaction.write(writer);
            }
            Self::Commit { height } => {
                2u8.write(writer);
                height.write(writer);
            }
        }
    }
}

impl Read for Output {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Event(Event::read(reader)?)),
            1 => Ok(Self::Transaction(Transaction::read(reader)?)),
            2 => Ok(Self::Commit {
                height: u64::read(reader)?,
            }),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for Output {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Event(event) => event.encode_size(),
                Self::Transaction(transaction) => transaction.encode_size(),
                Self::Commit { height } => height.encode_size(),
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wager::vault_address;
    use commonware_codec::DecodeExt;
    use commonware_cryptography::{ed25519::PrivateKey, Signer};

    #[test]
    fn transaction_signature_covers_instruction() {
        let private = PrivateKey::from_seed(1);
        let tx = Transaction::sign(&private, 0, Instruction::Cancel { wager_id: 1 });
        assert!(tx.verify());

        let mut tampered = tx.clone();
        tampered.instruction = Instruction::Cancel { wager_id: 2 };
        assert!(!tampered.verify());

        let mut replayed = tx;
        replayed.nonce = 1;
        assert!(!replayed.verify());
    }

    #[test]
    fn digest_ignores_signature() {
        let private = PrivateKey::from_seed(1);
        let instruction = Instruction::ClaimExpiry { wager_id: 4 };
        let a = Transaction::sign(&private, 3, instruction.clone());
        let b = Transaction::sign(&private, 3, instruction);
        assert_eq!(a.digest(), b.digest());

        let c = Transaction::sign(&private, 4, Instruction::ClaimExpiry { wager_id: 4 });
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn approval_binds_wager_and_outcome() {
        let private = PrivateKey::from_seed(2);
        let winner = PrivateKey::from_seed(3).public_key();
        let outcome = Outcome::Winner(winner);
        let approval = Approval::sign(&private, 9, &outcome);
        assert!(approval.verify(9, &outcome));
        assert!(!approval.verify(10, &outcome));
        assert!(!approval.verify(9, &Outcome::even_draw()));
    }

    #[test]
    fn approval_is_not_a_transaction_signature() {
        let private = PrivateKey::from_seed(2);
        let outcome = Outcome::even_draw();
        let approval = Approval::sign(&private, 9, &outcome);
        let tx = Transaction {
            nonce: 0,
            instruction: Instruction::Cancel { wager_id: 9 },
            public: approval.public.clone(),
            signature: approval.signature.clone(),
        };
        assert!(!tx.verify());
    }

    #[test]
    fn resolve_rejects_too_many_approvals() {
        let signers: Vec<_> = (1..=3).map(PrivateKey::from_seed).collect();
        let outcome = Outcome::even_draw();
        let instruction = Instruction::Resolve {
            wager_id: 1,
            outcome: outcome.clone(),
            approvals: signers
                .iter()
                .map(|signer| Approval::sign(signer, 1, &outcome))
                .collect(),
        };
        let encoded = instruction.encode();
        assert_eq!(encoded.len(), instruction.encode_size());
        assert!(Instruction::decode(encoded.as_ref()).is_err());
    }

    #[test]
    fn key_and_value_decode() {
        let key = Key::Vault(vault_address(5));
        assert_eq!(Key::decode(key.encode().as_ref()).unwrap(), key);

        let value = Value::Vault(EscrowVault {
            wager_id: 5,
            deposited: 200,
            paid_out: 0,
        });
        let encoded = value.encode();
        assert_eq!(encoded.len(), value.encode_size());
        assert_eq!(Value::decode(encoded.as_ref()).unwrap(), value);
        assert!(matches!(
            Value::decode(&[9u8][..]),
            Err(Error::InvalidEnum(9))
        ));
    }

    #[test]
    fn rejection_event_bounds_message() {
        let public = PrivateKey::from_seed(1).public_key();
        let event = Event::TransactionRejected {
            public,
            nonce: 0,
            wager_id: 1,
            error_code: 3,
            message: "x".repeat(MAX_ERROR_MESSAGE_LENGTH + 1),
        };
        assert!(Event::decode(event.encode().as_ref()).is_err());
    }
}
