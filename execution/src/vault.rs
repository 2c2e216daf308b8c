//! Escrow custody.
//!
//! `deposit` and `payout` are the only places where principal balances or vault
//! records change. Both re-read the vault through the caller's state view and verify
//! it belongs to the wager being settled.

use crate::{layer::ApplyError, state, State};
use commonware_cryptography::ed25519::PublicKey;
use wagerline_types::{
    execution::{Event, Key, Value},
    vault_address, EscrowVault, WagerError,
};

/// Loads the vault of `wager_id`, if it exists.
pub async fn load<S: State>(s: &S, wager_id: u64) -> anyhow::Result<Option<EscrowVault>> {
    Ok(match s.get(&Key::Vault(vault_address(wager_id))).await? {
        Some(Value::Vault(vault)) => Some(vault),
        _ => None,
    })
}

async fn bound<S: State>(s: &S, wager_id: u64) -> Result<Option<EscrowVault>, ApplyError> {
    match load(s, wager_id).await? {
        Some(vault) if vault.wager_id != wager_id => Err(WagerError::VaultMismatch.into()),
        other => Ok(other),
    }
}

/// Moves `amount` from `from`'s free balance into the vault of `wager_id`.
pub async fn deposit<S: State>(
    s: &mut S,
    wager_id: u64,
    from: &PublicKey,
    amount: u64,
) -> Result<Event, ApplyError> {
    let available = state::balance(&*s, from).await?;
    let remaining = available
        .checked_sub(amount)
        .ok_or(WagerError::InsufficientBalance {
            available,
            required: amount,
        })?;

    let mut vault = bound(&*s, wager_id)
        .await?
        .unwrap_or_else(|| EscrowVault::new(wager_id));
    vault.deposited = vault
        .deposited
        .checked_add(amount)
        .ok_or(WagerError::ArithmeticOverflow)?;
    let vault_balance = vault.balance();

    s.insert(Key::Balance(from.clone()), Value::Balance(remaining))
        .await?;
    s.insert(Key::Vault(vault_address(wager_id)), Value::Vault(vault))
        .await?;

    Ok(Event::VaultDeposited {
        wager_id,
        from: from.clone(),
        amount,
        vault_balance,
    })
}

/// Moves `amount` out of the vault of `wager_id` into `to`'s free balance.
pub async fn payout<S: State>(
    s: &mut S,
    wager_id: u64,
    to: &PublicKey,
    amount: u64,
) -> Result<Event, ApplyError> {
    let mut vault = bound(&*s, wager_id)
        .await?
        .ok_or(WagerError::VaultMismatch)?;
    if amount > vault.balance() {
        return Err(WagerError::VaultMismatch.into());
    }
    vault.paid_out = vault
        .paid_out
        .checked_add(amount)
        .ok_or(WagerError::ArithmeticOverflow)?;
    let vault_balance = vault.balance();

    let credited = state::balance(&*s, to)
        .await?
        .checked_add(amount)
        .ok_or(WagerError::ArithmeticOverflow)?;

    s.insert(Key::Vault(vault_address(wager_id)), Value::Vault(vault))
        .await?;
    s.insert(Key::Balance(to.clone()), Value::Balance(credited))
        .await?;

    Ok(Event::VaultPaidOut {
        wager_id,
        to: to.clone(),
        amount,
        vault_balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{create_account_keypair, create_funded_state};
    use crate::Memory;
    use commonware_runtime::{deterministic::Runner, Runner as _};

    fn rejection(result: Result<Event, ApplyError>) -> WagerError {
        match result {
            Err(ApplyError::Rejected(err)) => err,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn deposit_then_payout_moves_funds() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let (_, alice) = create_account_keypair(1);
            let (_, bob) = create_account_keypair(2);
            let mut state = create_funded_state(&[(alice.clone(), 150)]);

            let event = deposit(&mut state, 4, &alice, 100).await.unwrap();
            assert_eq!(
                event,
                Event::VaultDeposited {
                    wager_id: 4,
                    from: alice.clone(),
                    amount: 100,
                    vault_balance: 100
                }
            );
            assert_eq!(state::balance(&state, &alice).await.unwrap(), 50);

            payout(&mut state, 4, &bob, 60).await.unwrap();
            let vault = load(&state, 4).await.unwrap().unwrap();
            assert_eq!(vault.deposited, 100);
            assert_eq!(vault.paid_out, 60);
            assert_eq!(vault.balance(), 40);
            assert_eq!(state::balance(&state, &bob).await.unwrap(), 60);
        });
    }

    #[test]
    fn deposit_requires_funds() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let (_, alice) = create_account_keypair(1);
            let mut state = create_funded_state(&[(alice.clone(), 10)]);
            assert_eq!(
                rejection(deposit(&mut state, 1, &alice, 11).await),
                WagerError::InsufficientBalance {
                    available: 10,
                    required: 11
                }
            );
            assert!(load(&state, 1).await.unwrap().is_none());
        });
    }

    #[test]
    fn payout_never_exceeds_balance() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let (_, alice) = create_account_keypair(1);
            let mut state = create_funded_state(&[(alice.clone(), 10)]);
            assert_eq!(
                rejection(payout(&mut state, 1, &alice, 1).await),
                WagerError::VaultMismatch
            );

            deposit(&mut state, 1, &alice, 10).await.unwrap();
            assert_eq!(
                rejection(payout(&mut state, 1, &alice, 11).await),
                WagerError::VaultMismatch
            );
        });
    }

    #[test]
    fn vault_bound_to_another_wager_is_refused() {
        let executor = Runner::default();
        executor.start(|_| async move {
            let (_, alice) = create_account_keypair(1);
            let mut state: Memory = create_funded_state(&[(alice.clone(), 10)]);
            state
                .insert(
                    Key::Vault(vault_address(1)),
                    Value::Vault(EscrowVault {
                        wager_id: 2,
                        deposited: 10,
                        paid_out: 0,
                    }),
                )
                .await
                .unwrap();
            assert_eq!(
                rejection(payout(&mut state, 1, &alice, 5).await),
                WagerError::VaultMismatch
            );
            assert_eq!(
                rejection(deposit(&mut state, 1, &alice, 5).await),
                WagerError::VaultMismatch
            );
        });
    }
}
