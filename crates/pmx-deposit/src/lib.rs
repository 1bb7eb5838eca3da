//! Deposit-to-credit conversion flow.
//!
//! A state machine parallel to the trade pipeline: pick an amount and a
//! method, move funds (wallet-submitted or manual send), detect and verify
//! the transfer, and report credit, with bounded auto-detection, clean
//! cancellation, and success-latched idempotent verification.

pub mod backend;
pub mod error;
pub mod session;
pub mod verifier;

pub use backend::{
    BackendVerify, DepositBackend, DepositBackendClient, DepositInfo, DynDepositBackend,
    MockDepositBackend,
};
pub use error::{DepositError, DepositResult};
pub use session::{DepositSession, DepositStage};
pub use verifier::{
    DepositConfig, DepositObserver, DepositVerifier, NullDepositObserver, VerifyStatus,
};
