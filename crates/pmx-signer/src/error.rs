//! Signer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    /// The user dismissed the wallet prompt. Terminal for the current
    /// attempt; never retried automatically.
    #[error("signature request rejected by user")]
    UserRejected,

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("transaction submission failed: {0}")]
    TransferFailed(String),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

impl SignerError {
    /// Whether this failure came from the user declining, as opposed to a
    /// system fault.
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, Self::UserRejected)
    }
}

pub type SignerResult<T> = Result<T, SignerError>;
