//! Payout plans for terminal transitions.
//!
//! Every plan drains exactly the pool it is computed from: the amounts of the
//! returned payouts always sum to the vault balance at settlement.

use wagerline_types::{
    wager::{BPS_DENOMINATOR, PARTICIPANTS},
    ExecutionConfig, Outcome, Payout, Wager, WagerError,
};

/// Total funds held for an active wager.
pub fn pool(wager: &Wager) -> Result<u64, WagerError> {
    wager
        .stake
        .checked_mul(PARTICIPANTS)
        .ok_or(WagerError::ArithmeticOverflow)
}

/// Rejects outcomes that could never be settled against `wager`.
pub fn validate_outcome(
    config: &ExecutionConfig,
    wager: &Wager,
    outcome: &Outcome,
) -> Result<(), WagerError> {
    match outcome {
        Outcome::Winner(winner) if wager.is_participant(winner) => Ok(()),
        Outcome::Winner(_) => Err(WagerError::InvalidOutcome),
        Outcome::Draw { .. } if !config.allow_draws => Err(WagerError::InvalidOutcome),
        Outcome::Draw { creator_bps } if *creator_bps > BPS_DENOMINATOR => {
            Err(WagerError::InvalidOutcome)
        }
        Outcome::Draw { .. } => Ok(()),
    }
}

/// Splits the pool of an active wager according to `outcome`.
pub fn settle(wager: &Wager, outcome: &Outcome) -> Result<Vec<Payout>, WagerError> {
    let counterparty = wager
        .counterparty
        .clone()
        .ok_or(WagerError::InvalidOutcome)?;
    let pool = pool(wager)?;

    let payouts = match outcome {
        Outcome::Winner(winner) => vec![Payout {
            to: winner.clone(),
            amount: pool,
        }],
        Outcome::Draw { creator_bps } => {
            let creator_share = (pool as u128)
                .checked_mul(*creator_bps as u128)
                .map(|v| v / BPS_DENOMINATOR as u128)
                .and_then(|v| u64::try_from(v).ok())
                .ok_or(WagerError::ArithmeticOverflow)?;
            let counterparty_share = pool
                .checked_sub(creator_share)
                .ok_or(WagerError::ArithmeticOverflow)?;
            vec![
                Payout {
                    to: wager.creator.clone(),
                    amount: creator_share,
                },
                Payout {
                    to: counterparty,
                    amount: counterparty_share,
                },
            ]
        }
    };

    Ok(payouts.into_iter().filter(|p| p.amount > 0).collect())
}

/// Returns the creator's deposit of an unjoined wager.
pub fn refund_creator(wager: &Wager) -> Vec<Payout> {
    vec![Payout {
        to: wager.creator.clone(),
        amount: wager.stake,
    }]
}

/// Returns each deposit of an active wager to its depositor.
pub fn refund_all(wager: &Wager) -> Result<Vec<Payout>, WagerError> {
    let counterparty = wager
        .counterparty
        .clone()
        .ok_or(WagerError::VaultMismatch)?;
    Ok(vec![
        Payout {
            to: wager.creator.clone(),
            amount: wager.stake,
        },
        Payout {
            to: counterparty,
            amount: wager.stake,
        },
    ])
}

/// Sum of a payout plan.
pub fn total(payouts: &[Payout]) -> Result<u64, WagerError> {
    payouts.iter().try_fold(0u64, |acc, payout| {
        acc.checked_add(payout.amount)
            .ok_or(WagerError::ArithmeticOverflow)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::create_account_keypair;
    use proptest::prelude::*;
    use wagerline_types::WagerState;

    fn active(stake: u64) -> Wager {
        let (_, creator) = create_account_keypair(1);
        let (_, counterparty) = create_account_keypair(2);
        let mut wager = Wager::new(1, creator, None, stake, 3_600, 0);
        wager.counterparty = Some(counterparty);
        wager.state = WagerState::Active;
        wager
    }

    #[test]
    fn winner_takes_pool() {
        let wager = active(100);
        let winner = wager.counterparty.clone().unwrap();
        let payouts = settle(&wager, &Outcome::Winner(winner.clone())).unwrap();
        assert_eq!(
            payouts,
            vec![Payout {
                to: winner,
                amount: 200
            }]
        );
    }

    #[test]
    fn draw_rounds_toward_counterparty() {
        let wager = active(101);
        let payouts = settle(&wager, &Outcome::Draw { creator_bps: 3_333 }).unwrap();
        // 202 * 3333 / 10000 = 67.3266 -> 67
        assert_eq!(payouts[0].amount, 67);
        assert_eq!(payouts[1].amount, 135);
        assert_eq!(total(&payouts).unwrap(), 202);
    }

    #[test]
    fn one_sided_draw_skips_empty_payout() {
        let wager = active(50);
        let payouts = settle(&wager, &Outcome::Draw { creator_bps: 10_000 }).unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].to, wager.creator);
        assert_eq!(payouts[0].amount, 100);
    }

    #[test]
    fn pool_overflow_is_reported() {
        let wager = active(u64::MAX);
        assert_eq!(pool(&wager), Err(WagerError::ArithmeticOverflow));
        assert_eq!(
            settle(&wager, &Outcome::even_draw()),
            Err(WagerError::ArithmeticOverflow)
        );
    }

    #[test]
    fn outcome_validation() {
        let wager = active(10);
        let (_, outsider) = create_account_keypair(9);
        let config = ExecutionConfig::default();
        assert_eq!(
            validate_outcome(&config, &wager, &Outcome::Winner(outsider)),
            Err(WagerError::InvalidOutcome)
        );
        assert!(validate_outcome(&config, &wager, &Outcome::even_draw()).is_ok());
        assert_eq!(
            validate_outcome(&config, &wager, &Outcome::Draw { creator_bps: 10_001 }),
            Err(WagerError::InvalidOutcome)
        );

        let no_draws = ExecutionConfig {
            allow_draws: false,
            ..Default::default()
        };
        assert_eq!(
            validate_outcome(&no_draws, &wager, &Outcome::even_draw()),
            Err(WagerError::InvalidOutcome)
        );
    }

    #[test]
    fn expiry_refunds_each_side() {
        let wager = active(100);
        let payouts = refund_all(&wager).unwrap();
        assert_eq!(payouts.len(), 2);
        assert!(payouts.iter().all(|p| p.amount == 100));
        assert_eq!(total(&payouts).unwrap(), 200);
    }

    proptest! {
        #[test]
        fn draw_plan_conserves_pool(stake in 1u64..=u64::MAX / 2, bps in 0u16..=10_000) {
            let wager = active(stake);
            let payouts = settle(&wager, &Outcome::Draw { creator_bps: bps }).unwrap();
            prop_assert_eq!(total(&payouts).unwrap(), stake * 2);
        }
    }
}
