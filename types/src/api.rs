use crate::codec::{read_string, string_encode_size, write_string};
use crate::execution::{Event, Transaction, MAX_ERROR_MESSAGE_LENGTH};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, ReadRangeExt, Write};
use commonware_cryptography::{ed25519::PublicKey, sha256::Digest};

/// Maximum number of transactions that can be submitted in a single submission
pub const MAX_SUBMISSION_TRANSACTIONS: usize = 128;

/// Maximum number of events a single transaction can emit.
pub const MAX_RECEIPT_EVENTS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Submission {
    Transactions(Vec<Transaction>),
}

impl Write for Submission {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Submission::Transactions(txs) => {
                0u8.write(writer);
                txs.write(writer);
            }
        }
    }
}

impl Read for Submission {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Submission::Transactions(Vec::read_range(
                reader,
                1..=MAX_SUBMISSION_TRANSACTIONS,
            )?)),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Submission {
    fn encode_size(&self) -> usize {
        1 + match self {
            Submission::Transactions(txs) => txs.encode_size(),
        }
    }
}

/// What happened to a transaction once it was included in a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// The transition was applied; `events` are the state changes it produced.
    Applied { events: Vec<Event> },
    /// The transition was refused and left no trace besides the consumed nonce.
    Rejected { error_code: u8, message: String },
}

impl ReceiptStatus {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

impl Write for ReceiptStatus {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Applied { events } => {
                0u8.write(writer);
                events.write(writer);
            }
            Self::Rejected {
                error_code,
                message,
            } => {
                1u8.write(writer);
                error_code.write(writer);
                write_string(message, writer);
            }
        }
    }
}

impl Read for ReceiptStatus {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Self::Applied {
                events: Vec::read_range(reader, 0..=MAX_RECEIPT_EVENTS)?,
            }),
            1 => Ok(Self::Rejected {
                error_code: u8::read(reader)?,
                message: read_string(reader, MAX_ERROR_MESSAGE_LENGTH)?,
            }),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for ReceiptStatus {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::Applied { events } => events.encode_size(),
            Self::Rejected { message, .. } => u8::SIZE + string_encode_size(message),
        }
    }
}

/// Typed response for a submitted transaction, keyed by its digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub digest: Digest,
    pub public: PublicKey,
    pub nonce: u64,
    pub height: u64,
    pub status: ReceiptStatus,
}

impl Write for Receipt {
    fn write(&self, writer: &mut impl BufMut) {
        self.digest.write(writer);
        self.public.write(writer);
        self.nonce.write(writer);
        self.height.write(writer);
        self.status.write(writer);
    }
}

impl Read for Receipt {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            digest: Digest::read(reader)?,
            public: PublicKey::read(reader)?,
            nonce: u64::read(reader)?,
            height: u64::read(reader)?,
            status: ReceiptStatus::read(reader)?,
        })
    }
}

impl EncodeSize for Receipt {
    fn encode_size(&self) -> usize {
        Digest::SIZE + PublicKey::SIZE + u64::SIZE + u64::SIZE + self.status.encode_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Instruction;
    use commonware_codec::{DecodeExt, Encode};
    use commonware_cryptography::{ed25519::PrivateKey, Digestible, Signer};

    #[test]
    fn empty_submission_is_rejected() {
        let submission = Submission::Transactions(Vec::new());
        assert!(Submission::decode(submission.encode().as_ref()).is_err());
    }

    #[test]
    fn receipt_decodes() {
        let private = PrivateKey::from_seed(5);
        let tx = Transaction::sign(&private, 2, Instruction::Cancel { wager_id: 11 });
        let receipt = Receipt {
            digest: tx.digest(),
            public: tx.public.clone(),
            nonce: tx.nonce,
            height: 3,
            status: ReceiptStatus::Rejected {
                error_code: 2,
                message: "signer is not authorized for this operation".to_string(),
            },
        };
        let encoded = receipt.encode();
        assert_eq!(encoded.len(), receipt.encode_size());
        let decoded = Receipt::decode(encoded.as_ref()).expect("receipt");
        assert_eq!(decoded, receipt);
        assert!(!decoded.status.is_applied());
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512)) {
            let _ = Submission::decode(bytes.as_slice());
            let _ = Receipt::decode(bytes.as_slice());
            let _ = Transaction::decode(bytes.as_slice());
        }
    }
}
