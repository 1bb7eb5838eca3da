//! Pipeline configuration.

use alloy::primitives::Address;
use pmx_core::{Shares, SizingConfig, Usd};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Trade pipeline configuration.
///
/// Loadable from TOML; every tunable has a serde default so partial files
/// work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Chain the exchange trades on.
    #[serde(default = "default_required_chain_id")]
    pub required_chain_id: u64,

    /// Collateral token used for buy-side balance checks.
    pub collateral: Address,

    /// How long terminal stages stay visible before resetting to idle (ms).
    #[serde(default = "default_stage_reset_delay_ms")]
    pub stage_reset_delay_ms: u64,

    /// Exchange minimum order size in shares.
    #[serde(default = "default_min_order_size")]
    pub min_order_size: Decimal,

    /// Exchange minimum notional for market orders.
    #[serde(default = "default_min_market_notional")]
    pub min_market_notional: Decimal,
}

fn default_required_chain_id() -> u64 {
    137
}

fn default_stage_reset_delay_ms() -> u64 {
    2_000
}

fn default_min_order_size() -> Decimal {
    dec!(5)
}

fn default_min_market_notional() -> Decimal {
    dec!(1.00)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            required_chain_id: default_required_chain_id(),
            collateral: Address::ZERO,
            stage_reset_delay_ms: default_stage_reset_delay_ms(),
            min_order_size: default_min_order_size(),
            min_market_notional: default_min_market_notional(),
        }
    }
}

impl PipelineConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&raw)?)
    }

    /// Sizing floors as the sizer consumes them.
    pub fn sizing(&self) -> SizingConfig {
        SizingConfig {
            min_order_size: Shares::new(self.min_order_size),
            min_market_notional: Usd::new(self.min_market_notional),
        }
    }

    pub fn stage_reset_delay(&self) -> Duration {
        Duration::from_millis(self.stage_reset_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"collateral = "0x2791bca1f2de4661ed88a30c99a7a9449aa84174""#,
        )
        .unwrap();

        assert_eq!(config.required_chain_id, 137);
        assert_eq!(config.stage_reset_delay_ms, 2_000);
        assert_eq!(config.min_order_size, dec!(5));
        assert_eq!(config.sizing().min_order_size.inner(), dec!(5));
    }

    #[test]
    fn test_overrides_apply() {
        let config = PipelineConfig::from_toml_str(
            r#"
            required_chain_id = 80002
            collateral = "0x2791bca1f2de4661ed88a30c99a7a9449aa84174"
            stage_reset_delay_ms = 500
            min_order_size = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.required_chain_id, 80002);
        assert_eq!(config.stage_reset_delay(), Duration::from_millis(500));
        assert_eq!(config.min_order_size, dec!(15));
    }

    #[test]
    fn test_missing_collateral_is_an_error() {
        assert!(PipelineConfig::from_toml_str("required_chain_id = 137").is_err());
    }
}
