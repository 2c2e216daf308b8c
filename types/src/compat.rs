#![cfg(test)]
use crate::execution::{Instruction, Key};
use crate::wager::{Outcome, WagerState};
use commonware_codec::Encode;

#[test]
fn instruction_encoding_is_stable() {
    let join = Instruction::Join {
        wager_id: 1,
        amount: 100,
    };
    assert_eq!(
        join.encode().as_ref(),
        &[2u8, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 100]
    );

    let initialize = Instruction::Initialize {
        wager_id: 1,
        stake: 100,
        deadline: 3_600,
        arbiter: None,
    };
    assert_eq!(
        initialize.encode().as_ref(),
        &[
            1u8, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 100, 0, 0, 0, 0, 0, 0, 0x0e, 0x10,
            0
        ]
    );

    assert_eq!(
        Instruction::ClaimExpiry { wager_id: 258 }.encode().as_ref(),
        &[5u8, 0, 0, 0, 0, 0, 0, 1, 2]
    );
}

#[test]
fn key_encoding_is_stable() {
    assert_eq!(Key::Commit.encode().as_ref(), &[4u8]);
    assert_eq!(
        Key::Wager(7).encode().as_ref(),
        &[2u8, 0, 0, 0, 0, 0, 0, 0, 7]
    );
}

#[test]
fn outcome_encoding_is_stable() {
    assert_eq!(Outcome::even_draw().encode().as_ref(), &[1u8, 0x13, 0x88]);
    assert_eq!(WagerState::Expired.encode().as_ref(), &[5u8]);
}
