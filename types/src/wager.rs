//! Wager and vault records.
//!
//! Both records are persisted with the codec layouts below; field order is part of the
//! storage format and must not change without bumping [`WAGER_RECORD_VERSION`].

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::{
    ed25519::PublicKey,
    sha256::{Digest, Sha256},
    Hasher,
};
use std::fmt;

/// Version tag written at the front of every persisted [`Wager`].
pub const WAGER_RECORD_VERSION: u8 = 1;

/// Version tag written at the front of every persisted [`EscrowVault`].
pub const VAULT_RECORD_VERSION: u8 = 1;

/// Domain separator for vault addresses.
pub const VAULT_NAMESPACE: &[u8] = b"_WAGERLINE_VAULT";

/// Draw ratios are expressed in basis points of the pooled stake.
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Number of participants that deposit into a wager.
pub const PARTICIPANTS: u64 = 2;

/// Derive the custody address of a wager's vault.
///
/// Any collaborator can locate the vault from the wager id alone.
pub fn vault_address(wager_id: u64) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(VAULT_NAMESPACE);
    hasher.update(&wager_id.to_be_bytes());
    hasher.finalize()
}

/// Lifecycle state of a wager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WagerState {
    Created = 0,
    /// Counterparty stake received; only ever held inside a `join` before activation.
    Funded = 1,
    Active = 2,
    Resolved = 3,
    Cancelled = 4,
    Expired = 5,
}

impl WagerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled | Self::Expired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Funded => "funded",
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl TryFrom<u8> for WagerState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Created,
            1 => Self::Funded,
            2 => Self::Active,
            3 => Self::Resolved,
            4 => Self::Cancelled,
            5 => Self::Expired,
            i => return Err(Error::InvalidEnum(i)),
        })
    }
}

impl fmt::Display for WagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Write for WagerState {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for WagerState {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Self::try_from(u8::read(reader)?)
    }
}

impl FixedSize for WagerState {
    const SIZE: usize = u8::SIZE;
}

/// The operations a wager accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operation {
    Initialize = 1,
    Join = 2,
    Cancel = 3,
    Resolve = 4,
    ClaimExpiry = 5,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Join => "join",
            Self::Cancel => "cancel",
            Self::Resolve => "resolve",
            Self::ClaimExpiry => "claim_expiry",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payout split asserted when a wager is resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The whole pool goes to one participant.
    Winner(PublicKey),
    /// The pool is split: `creator_bps / 10_000` to the creator, the rest to the counterparty.
    Draw { creator_bps: u16 },
}

impl Outcome {
    /// An even split of the pool.
    pub fn even_draw() -> Self {
        Self::Draw {
            creator_bps: BPS_DENOMINATOR / 2,
        }
    }
}

impl Write for Outcome {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Winner(winner) => {
                0u8.write(writer);
                winner.write(writer);
            }
            Self::Draw { creator_bps } => {
                1u8.write(writer);
                creator_bps.write(writer);
            }
        }
    }
}

impl Read for Outcome {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Self::Winner(PublicKey::read(reader)?)),
            1 => {
                let creator_bps = u16::read(reader)?;
                if creator_bps > BPS_DENOMINATOR {
                    return Err(Error::Invalid("Outcome", "draw ratio above 10000 bps"));
                }
                Ok(Self::Draw { creator_bps })
            }
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Outcome {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Winner(_) => PublicKey::SIZE,
                Self::Draw { .. } => u16::SIZE,
            }
    }
}

/// The durable record of a single wager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wager {
    pub id: u64,
    pub creator: PublicKey,
    pub counterparty: Option<PublicKey>,
    pub arbiter: Option<PublicKey>,
    pub stake: u64,
    pub state: WagerState,
    /// Unix seconds after which an unresolved wager may be expired.
    pub deadline: i64,
    pub outcome: Option<Outcome>,
    pub created_at: i64,
    /// Settlement time of the terminal transition, if any.
    pub resolved_at: Option<i64>,
}

impl Wager {
    pub fn new(
        id: u64,
        creator: PublicKey,
        arbiter: Option<PublicKey>,
        stake: u64,
        deadline: i64,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            creator,
            counterparty: None,
            arbiter,
            stake,
            state: WagerState::Created,
            deadline,
            outcome: None,
            created_at,
            resolved_at: None,
        }
    }

    /// Returns true if `public` deposited into this wager.
    pub fn is_participant(&self, public: &PublicKey) -> bool {
        self.creator == *public || self.counterparty.as_ref() == Some(public)
    }

    pub fn vault_address(&self) -> Digest {
        vault_address(self.id)
    }
}

impl Write for Wager {
    fn write(&self, writer: &mut impl BufMut) {
        WAGER_RECORD_VERSION.write(writer);
        self.id.write(writer);
        self.creator.write(writer);
        self.counterparty.write(writer);
        self.arbiter.write(writer);
        self.stake.write(writer);
        self.state.write(writer);
        self.deadline.write(writer);
        self.outcome.write(writer);
        self.created_at.write(writer);
        self.resolved_at.write(writer);
    }
}

impl Read for Wager {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let version = u8::read(reader)?;
        if version != WAGER_RECORD_VERSION {
            return Err(Error::Invalid("Wager", "unsupported record version"));
        }
        let wager = Self {
            id: u64::read(reader)?,
            creator: PublicKey::read(reader)?,
            counterparty: Option::<PublicKey>::read(reader)?,
            arbiter: Option::<PublicKey>::read(reader)?,
            stake: u64::read(reader)?,
            state: WagerState::read(reader)?,
            deadline: i64::read(reader)?,
            outcome: Option::<Outcome>::read(reader)?,
            created_at: i64::read(reader)?,
            resolved_at: Option::<i64>::read(reader)?,
        };
        if wager.outcome.is_some() && wager.state != WagerState::Resolved {
            return Err(Error::Invalid("Wager", "outcome set on unresolved wager"));
        }
        Ok(wager)
    }
}

impl EncodeSize for Wager {
    fn encode_size(&self) -> usize {
        WAGER_RECORD_VERSION.encode_size()
            + self.id.encode_size()
            + self.creator.encode_size()
            + self.counterparty.encode_size()
            + self.arbiter.encode_size()
            + self.stake.encode_size()
            + self.state.encode_size()
            + self.deadline.encode_size()
            + self.outcome.encode_size()
            + self.created_at.encode_size()
            + self.resolved_at.encode_size()
    }
}

/// Custody account of a single wager.
///
/// `deposited` and `paid_out` only ever grow; the balance is their difference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EscrowVault {
    pub wager_id: u64,
    pub deposited: u64,
    pub paid_out: u64,
}

impl EscrowVault {
    pub fn new(wager_id: u64) -> Self {
        Self {
            wager_id,
            deposited: 0,
            paid_out: 0,
        }
    }

    pub fn balance(&self) -> u64 {
        self.deposited.saturating_sub(self.paid_out)
    }
}

impl Write for EscrowVault {
    fn write(&self, writer: &mut impl BufMut) {
        VAULT_RECORD_VERSION.write(writer);
        self.wager_id.write(writer);
        self.deposited.write(writer);
        self.paid_out.write(writer);
    }
}

impl Read for EscrowVault {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let version = u8::read(reader)?;
        if version != VAULT_RECORD_VERSION {
            return Err(Error::Invalid("EscrowVault", "unsupported record version"));
        }
        let vault = Self {
            wager_id: u64::read(reader)?,
            deposited: u64::read(reader)?,
            paid_out: u64::read(reader)?,
        };
        if vault.paid_out > vault.deposited {
            return Err(Error::Invalid("EscrowVault", "paid out more than deposited"));
        }
        Ok(vault)
    }
}

impl EncodeSize for EscrowVault {
    fn encode_size(&self) -> usize {
        u8::SIZE + 3 * u64::SIZE
    }
}

/// A single transfer out of a vault.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payout {
    pub to: PublicKey,
    pub amount: u64,
}

impl Write for Payout {
    fn write(&self, writer: &mut impl BufMut) {
        self.to.write(writer);
        self.amount.write(writer);
    }
}

impl Read for Payout {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            to: PublicKey::read(reader)?,
            amount: u64::read(reader)?,
        })
    }
}

impl FixedSize for Payout {
    const SIZE: usize = PublicKey::SIZE + u64::SIZE;
}
