//! Wallet signer abstraction.
//!
//! The pipeline never touches private keys: every signature goes through
//! the [`WalletSigner`] trait, which an embedding application implements
//! over its wallet of choice (browser wallet bridge, hardware signer,
//! remote signing service). [`LocalSigner`] is the in-process
//! implementation used in development and tests.

pub mod error;
pub mod local;
pub mod mock;
pub mod wallet;

pub use error::{SignerError, SignerResult};
pub use local::LocalSigner;
pub use mock::MockSigner;
pub use wallet::{
    BoxFuture, DynWalletSigner, SignatureParts, TransferRequest, TypedDataRequest, WalletSigner,
};
