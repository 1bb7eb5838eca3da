//! Core domain types for the prediction-market order pipeline.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `Price`, `Shares`, `Usd`: precision-safe numeric types
//! - `TradeParams`, `SizedOrder`: trade intents and their exchange-legal form
//! - `size_order`: the pure sizing function
//! - `TradeError`: the pipeline-wide failure taxonomy

pub mod decimal;
pub mod error;
pub mod order;
pub mod sizing;

pub use decimal::{Price, Shares, Usd};
pub use error::{CoreError, Result, TradeError};
pub use order::{
    OpenOrder, OrderKind, OrderResult, OrderStatus, Side, SizedOrder, TickSize, TokenId,
    TradeParams,
};
pub use sizing::{size_order, SizingConfig, SIZE_DECIMALS};
