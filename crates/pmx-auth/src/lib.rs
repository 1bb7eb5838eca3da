//! Exchange API credential acquisition and caching.
//!
//! Credentials are obtained through a wallet-control attestation signature
//! (derive-first, create-fallback) and cached per (signer, context) pair
//! with a seven-day TTL. An auth failure downstream invalidates the whole
//! set so the next attempt re-links instead of retrying known-bad keys.

pub mod api;
pub mod attestation;
pub mod credentials;
pub mod error;
pub mod linker;
pub mod store;

pub use api::{ClobAuthApi, ClobAuthClient, DynClobAuthApi, L1AuthHeaders, MockAuthApi, RawApiCreds};
pub use attestation::{auth_typed_data, ATTESTATION_MESSAGE};
pub use credentials::{ApiSecret, CredContext, Credentials};
pub use error::{AuthError, AuthResult};
pub use linker::{Clock, CredentialLinker, SystemClock};
pub use store::CredentialStore;
