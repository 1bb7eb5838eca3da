//! Smart-wallet provisioning for the order pipeline.
//!
//! Derives the deterministic proxy wallet for an owning signer, deploys it
//! through the relayer, and grants the exchange contracts their token
//! allowances. All operations are idempotent; deployment status is cached
//! once true.

pub mod chain;
pub mod derive;
pub mod error;
pub mod provisioner;
pub mod relayer;

pub use chain::{ChainReader, DynChainReader, MockChainReader, RpcChainReader};
pub use derive::{derive_wallet_address, FactoryParams};
pub use error::{ProvisionError, ProvisionResult};
pub use provisioner::{ExchangeSpenders, SafeProvisioner, SmartWalletState};
pub use relayer::{
    mock::MockRelayer, AllowanceReceipt, DeployReceipt, DynRelayer, Relayer, RelayerClient,
};
