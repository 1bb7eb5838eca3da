//! Provisioning error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Relayer unavailable: {0}")]
    RelayerUnavailable(String),

    #[error("Smart wallet deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("Setting allowances failed: {0}")]
    AllowanceFailed(String),

    #[error("Smart wallet is not deployed yet")]
    NotDeployed,

    #[error("Chain RPC error: {0}")]
    Rpc(String),

    #[error("Store error: {0}")]
    Store(#[from] pmx_store::StoreError),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
