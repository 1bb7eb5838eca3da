//! Order sizing: converting a dollar intent into an exchange-legal order.
//!
//! Pure arithmetic, no I/O. The sizer honors the market's tick precision,
//! the exchange minimum order size, the market-order minimum notional, and
//! a target-cost reconciliation invariant: the order's notional at its
//! rounded price is never silently short of what the user asked for.

use crate::decimal::{Shares, Usd};
use crate::error::TradeError;
use crate::order::{Side, SizedOrder, TradeParams};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Share quantities always carry two decimal places.
pub const SIZE_DECIMALS: u32 = 2;

/// Exchange-imposed sizing floors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingConfig {
    /// Minimum order size in shares.
    pub min_order_size: Shares,
    /// Minimum notional for market orders.
    pub min_market_notional: Usd,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_order_size: Shares(dec!(5)),
            min_market_notional: Usd(dec!(1.00)),
        }
    }
}

/// Size a trade intent into an exchange-legal `(price, size)` pair.
///
/// Steps:
/// 1. Round the price half-up to the tick's decimal count, clamped into the
///    legal `[tick, 1 - tick]` band.
/// 2. Round the dollar amount to cents; market orders are lifted to the
///    exchange minimum notional.
/// 3. Derive the share quantity at two decimals, rounded down for market
///    sells so a "sell all" never promises shares not held.
/// 4. Reconcile: while the notional at the rounded price comes up short of
///    the target, grow the size one hundredth at a time. In practice this
///    only fires on the floor path of market sells, and by at most one step.
/// 5. Reject sizes below the exchange minimum.
pub fn size_order(params: &TradeParams, cfg: &SizingConfig) -> Result<SizedOrder, TradeError> {
    params.validate()?;

    let tick = params.tick_size.increment();
    let mut rounded_price = params.price.round_dp(params.tick_size.price_decimals());
    if rounded_price.inner() < tick {
        rounded_price = tick.into();
    } else if rounded_price.inner() > Decimal::ONE - tick {
        rounded_price = (Decimal::ONE - tick).into();
    }

    let mut target_cost = params.amount.round_cents();
    if params.is_market_order && target_cost < cfg.min_market_notional {
        target_cost = cfg.min_market_notional;
    }

    let raw_size = Shares::new(target_cost.inner() / rounded_price.inner());
    let market_sell = params.is_market_order && params.side == Side::Sell;
    let mut size = if market_sell {
        raw_size.floor_dp(SIZE_DECIMALS)
    } else {
        raw_size.round_dp(SIZE_DECIMALS)
    };

    let step = Decimal::new(1, SIZE_DECIMALS);
    while size.notional(rounded_price).round_cents() < target_cost {
        size = Shares::new(size.inner() + step);
    }

    if size < cfg.min_order_size {
        return Err(TradeError::OrderTooSmall {
            size,
            min: cfg.min_order_size,
        });
    }

    Ok(SizedOrder {
        rounded_price,
        size,
        target_cost,
    })
}
