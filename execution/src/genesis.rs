//! Initial funding of principal balances.

use crate::state::{balance, height, State};
use anyhow::{anyhow, ensure, Result};
use commonware_cryptography::ed25519::PublicKey;
use tracing::info;
use wagerline_types::execution::{Key, Value};

/// Credits each `(principal, amount)` pair to its free balance.
///
/// Only allowed before the first block is applied; funds enter the system nowhere else.
/// Repeated principals are summed. Returns the total allocated.
pub async fn allocate<S: State>(state: &mut S, allocations: &[(PublicKey, u64)]) -> Result<u64> {
    let current = height(&*state).await?;
    ensure!(current == 0, "genesis allocation after height {current}");

    let mut total = 0u64;
    for (public, amount) in allocations {
        let credited = balance(&*state, public)
            .await?
            .checked_add(*amount)
            .ok_or_else(|| anyhow!("genesis balance overflow"))?;
        total = total
            .checked_add(*amount)
            .ok_or_else(|| anyhow!("genesis supply overflow"))?;
        state
            .insert(Key::Balance(public.clone()), Value::Balance(credited))
            .await?;
    }
    info!(accounts = allocations.len(), total, "allocated genesis balances");
    Ok(total)
}
