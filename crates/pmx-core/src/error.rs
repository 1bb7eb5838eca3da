//! Error types for the order pipeline.

use crate::decimal::Shares;
use thiserror::Error;

/// Internal parse/validation failures for core types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unsupported tick size: {0}")]
    InvalidTickSize(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// The pipeline-facing failure taxonomy.
///
/// Every component classifies its failures into one of these variants at its
/// own boundary; nothing else crosses into the orchestration layer.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Wallet is on chain {actual}, expected chain {required}")]
    NetworkMismatch { required: u64, actual: u64 },

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: Shares, available: Shares },

    #[error("Order size {size} is below the exchange minimum of {min} shares")]
    OrderTooSmall { size: Shares, min: Shares },

    #[error("No liquidity to fill the order; consider a limit order")]
    NoLiquidity,

    #[error("Exchange credentials expired")]
    CredentialsExpired,

    #[error("Could not obtain exchange credentials: {0}")]
    CredentialAcquisitionFailed(String),

    #[error("Smart wallet deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("Setting token allowances failed: {0}")]
    AllowanceFailed(String),

    #[error("Signature request rejected in wallet")]
    UserRejectedSignature,

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Another order is already in flight")]
    Busy,

    #[error("Invalid trade parameters: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradeError {
    /// Whether re-invoking the same entry point is safe.
    ///
    /// Submission-stage rejections are excluded: a prior "failed" response
    /// may have been accepted by the exchange, so callers must reconcile
    /// against open orders before resubmitting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkMismatch { .. }
                | Self::InsufficientFunds(_)
                | Self::CredentialsExpired
                | Self::CredentialAcquisitionFailed(_)
                | Self::DeploymentFailed(_)
                | Self::AllowanceFailed(_)
                | Self::Busy
        )
    }

    /// The user dismissed a wallet prompt; terminal for this attempt, not a
    /// system error.
    pub fn is_user_cancel(&self) -> bool {
        matches!(self, Self::UserRejectedSignature)
    }

    /// Stable short label for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NetworkMismatch { .. } => "network-mismatch",
            Self::InsufficientFunds(_) => "insufficient-funds",
            Self::InsufficientShares { .. } => "insufficient-shares",
            Self::OrderTooSmall { .. } => "order-too-small",
            Self::NoLiquidity => "no-liquidity",
            Self::CredentialsExpired => "credentials-expired",
            Self::CredentialAcquisitionFailed(_) => "credential-acquisition-failed",
            Self::DeploymentFailed(_) => "deployment-failed",
            Self::AllowanceFailed(_) => "allowance-failed",
            Self::UserRejectedSignature => "user-rejected",
            Self::OrderRejected(_) => "order-rejected",
            Self::Busy => "busy",
            Self::InvalidParams(_) => "invalid-params",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
