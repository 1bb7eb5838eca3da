//! Deposit flow error types.

use pmx_signer::SignerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DepositError {
    #[error("Invalid deposit amount: {0}")]
    InvalidAmount(String),

    #[error("Deposit backend error: {0}")]
    Backend(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Transfer rejected in wallet")]
    UserRejected,

    #[error("Deposit verification failed: {0}")]
    VerificationFailed(String),

    #[error("Deposit detection cancelled")]
    Cancelled,

    #[error("A detection poll is already running")]
    DetectionBusy,
}

impl From<SignerError> for DepositError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::UserRejected => Self::UserRejected,
            other => Self::Transfer(other.to_string()),
        }
    }
}

pub type DepositResult<T> = Result<T, DepositError>;
