//! Authorization checks for wager transitions.
//!
//! The guard never touches state. It answers whether a signer (plus any attached
//! co-signatures) may perform an operation on a wager as currently recorded.

use commonware_cryptography::ed25519::PublicKey;
use std::collections::BTreeSet;
use wagerline_types::{
    execution::Approval, ExecutionConfig, Outcome, ResolutionPolicy, Wager, WagerError,
};

pub struct AuthorizationGuard<'a> {
    config: &'a ExecutionConfig,
}

impl<'a> AuthorizationGuard<'a> {
    pub fn new(config: &'a ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn initialize(
        &self,
        creator: &PublicKey,
        arbiter: Option<&PublicKey>,
    ) -> Result<(), WagerError> {
        match (self.config.resolution, arbiter) {
            (ResolutionPolicy::ArbiterOnly, None) => return Err(WagerError::ArbiterRequired),
            (ResolutionPolicy::MutualOnly, Some(_)) => return Err(WagerError::ArbiterNotAllowed),
            _ => {}
        }
        if arbiter == Some(creator) {
            return Err(WagerError::Unauthorized);
        }
        Ok(())
    }

    pub fn join(&self, wager: &Wager, signer: &PublicKey, amount: u64) -> Result<(), WagerError> {
        if wager.counterparty.is_some() {
            return Err(WagerError::AlreadyFunded);
        }
        if wager.creator == *signer || wager.arbiter.as_ref() == Some(signer) {
            return Err(WagerError::Unauthorized);
        }
        if amount != wager.stake {
            return Err(WagerError::StakeMismatch {
                expected: wager.stake,
                got: amount,
            });
        }
        Ok(())
    }

    pub fn cancel(&self, wager: &Wager, signer: &PublicKey) -> Result<(), WagerError> {
        if wager.creator != *signer || wager.counterparty.is_some() {
            return Err(WagerError::Unauthorized);
        }
        Ok(())
    }

    pub fn claim_expiry(&self, wager: &Wager, signer: &PublicKey) -> Result<(), WagerError> {
        if wager.is_participant(signer) || wager.arbiter.as_ref() == Some(signer) {
            return Ok(());
        }
        Err(WagerError::Unauthorized)
    }

    /// Checks that `signer` (together with `approvals`) may assert `outcome`.
    ///
    /// With an arbiter on record only the arbiter may resolve. Without one, the
    /// creator and the counterparty must both have signed this exact outcome, either
    /// as the transaction signer or through an [`Approval`].
    pub fn resolve(
        &self,
        wager: &Wager,
        signer: &PublicKey,
        outcome: &Outcome,
        approvals: &[Approval],
    ) -> Result<(), WagerError> {
        match (self.config.resolution, wager.arbiter.as_ref()) {
            (ResolutionPolicy::MutualOnly, _) | (ResolutionPolicy::ArbiterOrMutual, None) => {
                self.mutual(wager, signer, outcome, approvals)
            }
            (_, Some(arbiter)) => {
                if arbiter == signer {
                    Ok(())
                } else {
                    Err(WagerError::Unauthorized)
                }
            }
            (ResolutionPolicy::ArbiterOnly, None) => Err(WagerError::ArbiterRequired),
        }
    }

    fn mutual(
        &self,
        wager: &Wager,
        signer: &PublicKey,
        outcome: &Outcome,
        approvals: &[Approval],
    ) -> Result<(), WagerError> {
        let Some(counterparty) = wager.counterparty.as_ref() else {
            return Err(WagerError::Unauthorized);
        };
        if !wager.is_participant(signer) {
            return Err(WagerError::Unauthorized);
        }

        let mut signers = BTreeSet::new();
        signers.insert(signer.clone());
        for approval in approvals {
            if !wager.is_participant(&approval.public) {
                return Err(WagerError::Unauthorized);
            }
            if !signers.insert(approval.public.clone()) {
                return Err(WagerError::Unauthorized);
            }
            if !approval.verify(wager.id, outcome) {
                return Err(WagerError::Unauthorized);
            }
        }

        if signers.contains(&wager.creator) && signers.contains(counterparty) {
            Ok(())
        } else {
            Err(WagerError::Unauthorized)
        }
    }
}
