//! Order building, signing, and submission.
//!
//! Turns a sized trade into a signed exchange order: re-validates market
//! metadata, pre-checks sell balances on chain, signs the EIP-712 order
//! struct through the wallet signer, authenticates with the credential
//! HMAC, and classifies every refusal into the pipeline error taxonomy.

pub mod classify;
pub mod client;
pub mod eip712;
pub mod headers;
pub mod submitter;
pub mod wire;

pub use classify::classify_refusal;
pub use client::{BalanceAllowance, ClobApi, ClobClient, DynClobApi, MockClobApi, SubmitOutcome};
pub use eip712::{order_typed_data, Order, SignatureScheme};
pub use headers::{build_l2_headers, L2AuthHeaders};
pub use submitter::{ExecutorConfig, OrderSubmitter};
pub use wire::{
    order_amounts, OrderAmounts, PostOrderBody, PostOrderResponse, SignedOrderRequest,
    COLLATERAL_DECIMALS,
};
