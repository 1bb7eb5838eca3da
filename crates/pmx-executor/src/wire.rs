//! Order wire format and amount arithmetic.
//!
//! The exchange settles in a 6-decimal collateral token, so signed order
//! amounts are integers in base units: what the maker gives and what they
//! ask for in return. Buys give collateral and take shares; sells give
//! shares and take collateral.

use alloy::primitives::{Address, U256};
use pmx_core::{Price, Shares, Side, TradeError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places of the collateral and conditional tokens.
pub const COLLATERAL_DECIMALS: u32 = 6;

/// Maker/taker amounts in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderAmounts {
    pub maker_amount: U256,
    pub taker_amount: U256,
}

fn to_base_units(value: Decimal) -> Result<U256, TradeError> {
    let scaled = (value * Decimal::from(10u64.pow(COLLATERAL_DECIMALS))).trunc();
    scaled
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| TradeError::Internal(format!("amount {value} out of range")))
}

/// Compute signed-order amounts for a sized order.
///
/// The collateral leg is the notional rounded to cents, matching the cost
/// the sizer reconciled against.
pub fn order_amounts(side: Side, size: Shares, price: Price) -> Result<OrderAmounts, TradeError> {
    let cost = size.notional(price).round_cents();
    let (maker, taker) = match side {
        Side::Buy => (cost.inner(), size.inner()),
        Side::Sell => (size.inner(), cost.inner()),
    };
    Ok(OrderAmounts {
        maker_amount: to_base_units(maker)?,
        taker_amount: to_base_units(taker)?,
    })
}

/// Signed order payload as the exchange expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrderRequest {
    pub salt: u64,
    pub maker: Address,
    pub signer: Address,
    pub taker: Address,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    /// "BUY" or "SELL".
    pub side: String,
    pub signature_type: u8,
    pub signature: String,
}

/// Request body for the order endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOrderBody {
    pub order: SignedOrderRequest,
    /// API key of the submitting credential set.
    pub owner: String,
    /// Execution semantics: "FAK", "FOK", or "GTC".
    #[serde(rename = "orderType")]
    pub order_type: String,
}

/// Success-shaped response from the order endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostOrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "orderID")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "errorMsg")]
    pub error_msg: Option<String>,
    /// Filled maker-side amount, human units.
    #[serde(default, rename = "makingAmount")]
    pub making_amount: Option<String>,
    /// Filled taker-side amount, human units.
    #[serde(default, rename = "takingAmount")]
    pub taking_amount: Option<String>,
}

impl PostOrderResponse {
    /// Shares filled, derived from the side-dependent fill fields.
    pub fn filled_shares(&self, side: Side) -> Option<Shares> {
        let raw = match side {
            Side::Buy => self.taking_amount.as_deref(),
            Side::Sell => self.making_amount.as_deref(),
        }?;
        raw.parse::<Decimal>().ok().map(Shares::new)
    }
}
