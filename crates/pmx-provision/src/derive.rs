//! Deterministic smart-wallet address derivation.
//!
//! The proxy wallet is created through a CREATE2 factory, so its address is
//! a pure function of the owning signer: same owner, same wallet, across
//! sessions and before deployment ever happens.

use alloy::primitives::{keccak256, Address, B256};

/// Factory parameters fixed by the exchange deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactoryParams {
    /// CREATE2 factory contract.
    pub factory: Address,
    /// keccak256 of the proxy init code.
    pub init_code_hash: B256,
}

/// Derive the smart-wallet address for an owner.
///
/// CREATE2: `address = keccak256(0xff ++ factory ++ salt ++ init_code_hash)[12..]`
/// with `salt = keccak256(owner)`.
pub fn derive_wallet_address(params: &FactoryParams, owner: Address) -> Address {
    let salt = keccak256(owner.as_slice());

    let mut data = Vec::with_capacity(1 + 20 + 32 + 32);
    data.push(0xff);
    data.extend_from_slice(params.factory.as_slice());
    data.extend_from_slice(salt.as_slice());
    data.extend_from_slice(params.init_code_hash.as_slice());

    Address::from_slice(&keccak256(&data)[12..])
}
