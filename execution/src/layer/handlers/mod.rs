use super::*;

pub(super) fn rejected(transaction: &Transaction, err: &WagerError) -> Event {
    Event::TransactionRejected {
        public: transaction.public.clone(),
        nonce: transaction.nonce,
        wager_id: transaction.instruction.wager_id(),
        error_code: err.code(),
        message: err.to_string(),
    }
}

mod wager;
