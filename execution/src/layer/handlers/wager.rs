use super::super::*;
use crate::{guard::AuthorizationGuard, resolution, vault};
use wagerline_types::{execution::Approval, Operation, Outcome, Payout, Wager, WagerState};

impl<'a, S: State> Layer<'a, S> {
    // === Wager Helpers ===

    async fn load_wager(&self, wager_id: u64) -> Result<Wager, ApplyError> {
        match self.get(&Key::Wager(wager_id)).await? {
            Some(Value::Wager(wager)) => Ok(wager),
            _ => Err(WagerError::WagerNotFound.into()),
        }
    }

    async fn store_wager(&mut self, wager: Wager) -> Result<(), ApplyError> {
        self.insert(Key::Wager(wager.id), Value::Wager(wager)).await?;
        Ok(())
    }

    /// Loads a wager and checks it is in `expected` before `operation` runs.
    ///
    /// Terminal wagers reject every operation with the state they ended in.
    async fn load_in_state(
        &self,
        wager_id: u64,
        expected: WagerState,
        operation: Operation,
    ) -> Result<Wager, ApplyError> {
        let wager = self.load_wager(wager_id).await?;
        if wager.state != expected {
            return Err(WagerError::invalid_transition(wager.state, operation).into());
        }
        Ok(wager)
    }

    async fn pay_out(
        &mut self,
        wager: &Wager,
        payouts: &[Payout],
        events: &mut Vec<Event>,
    ) -> Result<(), ApplyError> {
        let vault = vault::load(&*self, wager.id)
            .await?
            .ok_or(WagerError::VaultMismatch)?;
        if resolution::total(payouts)? != vault.balance() {
            return Err(WagerError::VaultMismatch.into());
        }
        for payout in payouts {
            events.push(vault::payout(self, wager.id, &payout.to, payout.amount).await?);
        }
        Ok(())
    }

    // === Wager Handlers ===

    pub(in crate::layer) async fn handle_initialize(
        &mut self,
        public: &PublicKey,
        wager_id: u64,
        stake: u64,
        deadline: i64,
        arbiter: Option<&PublicKey>,
    ) -> Result<Vec<Event>, ApplyError> {
        if let Some(Value::Wager(existing)) = self.get(&Key::Wager(wager_id)).await? {
            if existing.state.is_terminal() {
                return Err(
                    WagerError::invalid_transition(existing.state, Operation::Initialize).into(),
                );
            }
            return Err(WagerError::AlreadyInitialized.into());
        }
        if stake == 0 {
            return Err(WagerError::InvalidStake.into());
        }
        let window = deadline
            .checked_sub(self.now)
            .ok_or(WagerError::InvalidDeadline)?;
        if window <= 0 || (window as u64) > self.config.max_duration_secs {
            return Err(WagerError::InvalidDeadline.into());
        }
        AuthorizationGuard::new(&self.config).initialize(public, arbiter)?;

        let wager = Wager::new(
            wager_id,
            public.clone(),
            arbiter.cloned(),
            stake,
            deadline,
            self.now,
        );
        // Both stakes must fit in the vault once the wager is joined.
        resolution::pool(&wager)?;
        let deposited = vault::deposit(self, wager_id, public, stake).await?;
        self.store_wager(wager).await?;

        Ok(vec![
            Event::WagerInitialized {
                wager_id,
                creator: public.clone(),
                arbiter: arbiter.cloned(),
                stake,
                deadline,
            },
            deposited,
        ])
    }

    pub(in crate::layer) async fn handle_join(
        &mut self,
        public: &PublicKey,
        wager_id: u64,
        amount: u64,
    ) -> Result<Vec<Event>, ApplyError> {
        let mut wager = self.load_wager(wager_id).await?;
        match wager.state {
            WagerState::Created => {}
            WagerState::Funded | WagerState::Active => {
                return Err(WagerError::AlreadyFunded.into())
            }
            state => return Err(WagerError::invalid_transition(state, Operation::Join).into()),
        }
        AuthorizationGuard::new(&self.config).join(&wager, public, amount)?;
        if self.now > wager.deadline {
            return Err(WagerError::DeadlinePassed.into());
        }

        let deposited = vault::deposit(self, wager_id, public, amount).await?;
        wager.counterparty = Some(public.clone());
        wager.state = WagerState::Funded;

        // The deposit is confirmed within this transaction, so the wager activates
        // immediately and the funded state is never stored.
        let vault = vault::load(&*self, wager_id)
            .await?
            .ok_or(WagerError::VaultMismatch)?;
        if vault.balance() != resolution::pool(&wager)? {
            return Err(WagerError::VaultMismatch.into());
        }
        wager.state = WagerState::Active;
        self.store_wager(wager).await?;

        Ok(vec![
            deposited,
            Event::WagerActivated {
                wager_id,
                counterparty: public.clone(),
            },
        ])
    }

    pub(in crate::layer) async fn handle_cancel(
        &mut self,
        public: &PublicKey,
        wager_id: u64,
    ) -> Result<Vec<Event>, ApplyError> {
        let mut wager = self
            .load_in_state(wager_id, WagerState::Created, Operation::Cancel)
            .await?;
        AuthorizationGuard::new(&self.config).cancel(&wager, public)?;

        let payouts = resolution::refund_creator(&wager);
        let mut events = Vec::with_capacity(payouts.len() + 1);
        self.pay_out(&wager, &payouts, &mut events).await?;

        wager.state = WagerState::Cancelled;
        wager.resolved_at = Some(self.now);
        self.store_wager(wager).await?;

        events.push(Event::WagerCancelled { wager_id, payouts });
        Ok(events)
    }

    pub(in crate::layer) async fn handle_resolve(
        &mut self,
        public: &PublicKey,
        wager_id: u64,
        outcome: &Outcome,
        approvals: &[Approval],
    ) -> Result<Vec<Event>, ApplyError> {
        let mut wager = self
            .load_in_state(wager_id, WagerState::Active, Operation::Resolve)
            .await?;
        if self.now > wager.deadline {
            return Err(WagerError::DeadlinePassed.into());
        }
        AuthorizationGuard::new(&self.config).resolve(&wager, public, outcome, approvals)?;
        resolution::validate_outcome(&self.config, &wager, outcome)?;

        let payouts = resolution::settle(&wager, outcome)?;
        let mut events = Vec::with_capacity(payouts.len() + 1);
        self.pay_out(&wager, &payouts, &mut events).await?;

        wager.state = WagerState::Resolved;
        wager.outcome = Some(outcome.clone());
        wager.resolved_at = Some(self.now);
        self.store_wager(wager).await?;

        events.push(Event::WagerResolved {
            wager_id,
            outcome: outcome.clone(),
            payouts,
        });
        Ok(events)
    }

    pub(in crate::layer) async fn handle_claim_expiry(
        &mut self,
        public: &PublicKey,
        wager_id: u64,
    ) -> Result<Vec<Event>, ApplyError> {
        let mut wager = self
            .load_in_state(wager_id, WagerState::Active, Operation::ClaimExpiry)
            .await?;
        AuthorizationGuard::new(&self.config).claim_expiry(&wager, public)?;
        if self.now <= wager.deadline {
            return Err(WagerError::DeadlineNotReached.into());
        }

        let payouts = resolution::refund_all(&wager)?;
        let mut events = Vec::with_capacity(payouts.len() + 1);
        self.pay_out(&wager, &payouts, &mut events).await?;

        wager.state = WagerState::Expired;
        wager.resolved_at = Some(self.now);
        self.store_wager(wager).await?;

        events.push(Event::WagerExpired { wager_id, payouts });
        Ok(events)
    }
}
