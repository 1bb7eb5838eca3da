//! Order-related domain types.
//!
//! Trade intents, tick sizes, execution semantics, and submission results
//! for the outcome-token CLOB.

use crate::decimal::{Price, Shares, Usd};
use crate::error::{CoreError, TradeError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation used by the exchange ("BUY" / "SELL").
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Numeric side index in the signed order struct (0 = buy, 1 = sell).
    pub fn as_index(&self) -> u8 {
        match self {
            Self::Buy => 0,
            Self::Sell => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution semantics requested at submission.
///
/// Market orders go out as fill-and-kill; resting orders as good-til-cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    /// Good-til-cancelled (resting limit order).
    #[default]
    Gtc,
    /// Fill-and-kill: fill what is available, cancel the rest.
    Fak,
    /// Fill-or-kill: all-or-nothing.
    Fok,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gtc => write!(f, "GTC"),
            Self::Fak => write!(f, "FAK"),
            Self::Fok => write!(f, "FOK"),
        }
    }
}

/// Minimum price increment a market accepts.
///
/// Determines the decimal precision prices are rounded to. Parsed from the
/// exchange's tick-size endpoint at the boundary; unsupported increments are
/// rejected there rather than propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub enum TickSize {
    /// 0.1: one price decimal.
    Tenth,
    /// 0.01: two price decimals.
    Hundredth,
    /// 0.001: three price decimals.
    Thousandth,
    /// 0.0001: four price decimals.
    TenThousandth,
}

impl TickSize {
    /// Number of decimal places a price may carry at this tick size.
    pub fn price_decimals(&self) -> u32 {
        match self {
            Self::Tenth => 1,
            Self::Hundredth => 2,
            Self::Thousandth => 3,
            Self::TenThousandth => 4,
        }
    }

    /// The tick increment as a decimal.
    pub fn increment(&self) -> Decimal {
        match self {
            Self::Tenth => Decimal::new(1, 1),
            Self::Hundredth => Decimal::new(1, 2),
            Self::Thousandth => Decimal::new(1, 3),
            Self::TenThousandth => Decimal::new(1, 4),
        }
    }
}

impl TryFrom<Decimal> for TickSize {
    type Error = CoreError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        let normalized = value.normalize();
        if normalized == Decimal::new(1, 1) {
            Ok(Self::Tenth)
        } else if normalized == Decimal::new(1, 2) {
            Ok(Self::Hundredth)
        } else if normalized == Decimal::new(1, 3) {
            Ok(Self::Thousandth)
        } else if normalized == Decimal::new(1, 4) {
            Ok(Self::TenThousandth)
        } else {
            Err(CoreError::InvalidTickSize(value.to_string()))
        }
    }
}

impl From<TickSize> for Decimal {
    fn from(tick: TickSize) -> Self {
        tick.increment()
    }
}

impl fmt::Display for TickSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.increment())
    }
}

/// Identifier of an outcome token on the exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TokenId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TokenId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single requested trade, as expressed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeParams {
    /// Outcome token to trade.
    pub token_id: TokenId,
    /// Buy or sell.
    pub side: Side,
    /// Dollar amount to spend (buy) or proceeds target (sell).
    pub amount: Usd,
    /// Limit price as a probability in (0, 1).
    pub price: Price,
    /// Market order (fill-and-kill) vs resting limit order.
    pub is_market_order: bool,
    /// Client-known tick size; re-validated against the exchange at submission.
    pub tick_size: TickSize,
    /// Market settles through the negative-risk adapter.
    pub neg_risk: bool,
}

impl TradeParams {
    /// Validate the user intent before any sizing or I/O.
    pub fn validate(&self) -> Result<(), TradeError> {
        if !self.amount.is_positive() {
            return Err(TradeError::InvalidParams(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if !self.price.is_valid_probability() {
            return Err(TradeError::InvalidParams(format!(
                "price must be within (0, 1), got {}",
                self.price
            )));
        }
        Ok(())
    }

    /// Execution semantics for this trade.
    pub fn order_kind(&self) -> OrderKind {
        if self.is_market_order {
            OrderKind::Fak
        } else {
            OrderKind::Gtc
        }
    }
}

/// Exchange-legal order derived from [`TradeParams`] by the sizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizedOrder {
    /// Price rounded to the market's tick precision.
    pub rounded_price: Price,
    /// Share quantity at two-decimal precision.
    pub size: Shares,
    /// The notional the caller asked for, rounded to cents.
    pub target_cost: Usd,
}

impl SizedOrder {
    /// Notional this order would fill at its rounded price.
    pub fn actual_cost(&self) -> Usd {
        self.size.notional(self.rounded_price).round_cents()
    }
}

/// Status of an accepted order, as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Resting on the book.
    Live,
    /// Fully matched on arrival.
    Matched,
    /// Accepted but queued by the exchange (subsidy/delay mechanisms).
    Delayed,
    /// Status string the exchange added after this client was written.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Matched => write!(f, "matched"),
            Self::Delayed => write!(f, "delayed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of a successful submission.
///
/// Failures are carried by [`TradeError`]; an `OrderResult` always has an
/// order id, so "success implies order id" holds by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    /// Exchange-assigned order id.
    pub order_id: String,
    /// Post-submission status.
    pub status: OrderStatus,
    /// Size requested at submission.
    pub requested: Shares,
    /// Size actually filled, when the exchange reports it (FAK fills).
    pub filled: Option<Shares>,
    /// Raw response body, preserved for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl OrderResult {
    /// A fill-and-kill order that filled less than requested.
    ///
    /// Normal behavior for FAK, reported as informational rather than error.
    pub fn is_partial_fill(&self) -> bool {
        match self.filled {
            Some(filled) => filled < self.requested,
            None => false,
        }
    }
}

/// An order currently resting on the book, from the open-orders endpoint.
///
/// Used to reconcile ambiguous submission failures: a "failed" response may
/// have been accepted by the exchange, so callers match against open orders
/// before retrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: String,
    pub token_id: TokenId,
    pub side: Side,
    pub price: Price,
    pub original_size: Shares,
    pub remaining_size: Shares,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_wire_format() {
        assert_eq!(Side::Buy.as_str(), "BUY");
        assert_eq!(Side::Sell.as_str(), "SELL");
        assert_eq!(Side::Buy.as_index(), 0);
        assert_eq!(Side::Sell.as_index(), 1);
    }

    #[test]
    fn test_tick_size_decimals() {
        assert_eq!(TickSize::Tenth.price_decimals(), 1);
        assert_eq!(TickSize::Hundredth.price_decimals(), 2);
        assert_eq!(TickSize::Thousandth.price_decimals(), 3);
        assert_eq!(TickSize::TenThousandth.price_decimals(), 4);
    }

    #[test]
    fn test_tick_size_from_decimal() {
        assert_eq!(TickSize::try_from(dec!(0.01)).unwrap(), TickSize::Hundredth);
        assert_eq!(TickSize::try_from(dec!(0.1000)).unwrap(), TickSize::Tenth);
        assert!(TickSize::try_from(dec!(0.05)).is_err());
        assert!(TickSize::try_from(dec!(0)).is_err());
    }

    #[test]
    fn test_tick_size_serde_round_trip() {
        let json = serde_json::to_string(&TickSize::Thousandth).unwrap();
        assert_eq!(json, "0.001");
        let parsed: TickSize = serde_json::from_str("0.01").unwrap();
        assert_eq!(parsed, TickSize::Hundredth);
    }

    fn params(amount: Decimal, price: Decimal) -> TradeParams {
        TradeParams {
            token_id: TokenId::from("123456"),
            side: Side::Buy,
            amount: Usd::new(amount),
            price: Price::new(price),
            is_market_order: false,
            tick_size: TickSize::Hundredth,
            neg_risk: false,
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(params(dec!(25), dec!(0.37)).validate().is_ok());
        assert!(params(dec!(0), dec!(0.37)).validate().is_err());
        assert!(params(dec!(-5), dec!(0.37)).validate().is_err());
        assert!(params(dec!(25), dec!(0)).validate().is_err());
        assert!(params(dec!(25), dec!(1)).validate().is_err());
    }

    #[test]
    fn test_order_kind_for_market_orders() {
        let mut p = params(dec!(25), dec!(0.37));
        assert_eq!(p.order_kind(), OrderKind::Gtc);
        p.is_market_order = true;
        assert_eq!(p.order_kind(), OrderKind::Fak);
    }

    #[test]
    fn test_partial_fill_detection() {
        let mut result = OrderResult {
            order_id: "0xabc".to_string(),
            status: OrderStatus::Matched,
            requested: Shares::new(dec!(100)),
            filled: Some(Shares::new(dec!(60))),
            raw: None,
        };
        assert!(result.is_partial_fill());

        result.filled = Some(Shares::new(dec!(100)));
        assert!(!result.is_partial_fill());

        result.filled = None;
        assert!(!result.is_partial_fill());
    }

    #[test]
    fn test_order_status_unknown_variant() {
        let status: OrderStatus = serde_json::from_str("\"somethingnew\"").unwrap();
        assert_eq!(status, OrderStatus::Unknown);
    }
}
