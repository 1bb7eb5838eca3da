//! Auth error types.

use pmx_signer::SignerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Could not obtain exchange credentials: {0}")]
    AcquisitionFailed(String),

    #[error("Signature request rejected by user")]
    UserRejected,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Store error: {0}")]
    Store(#[from] pmx_store::StoreError),
}

impl From<SignerError> for AuthError {
    fn from(err: SignerError) -> Self {
        match err {
            SignerError::UserRejected => Self::UserRejected,
            other => Self::Signing(other.to_string()),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
