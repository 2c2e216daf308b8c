use crate::Memory;
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    Signer,
};
use wagerline_types::execution::{Key, Value};

/// Creates an account keypair for Ed25519 signatures used by participants
pub fn create_account_keypair(seed: u64) -> (PrivateKey, PublicKey) {
    let private = PrivateKey::from_seed(seed);
    let public = private.public_key();
    (private, public)
}

/// Creates a state where each listed principal holds `balance` free funds.
pub fn create_funded_state(accounts: &[(PublicKey, u64)]) -> Memory {
    accounts
        .iter()
        .map(|(public, balance)| (Key::Balance(public.clone()), Value::Balance(*balance)))
        .collect()
}
