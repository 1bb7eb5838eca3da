//! Trade pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Orchestration state of a trade, linear with an error escape from every
/// stage. Terminal stages auto-reset to `Idle` after a display delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradeStage {
    #[default]
    Idle,
    SwitchingNetwork,
    CheckingBalance,
    LinkingWallet,
    DeployingSafe,
    SettingAllowances,
    SigningOrder,
    SubmittingOrder,
    Completed,
    Error,
}

impl TradeStage {
    /// Human-readable progress message for UI consumption.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::SwitchingNetwork => "Switching network...",
            Self::CheckingBalance => "Checking balance...",
            Self::LinkingWallet => "Linking wallet to the exchange...",
            Self::DeployingSafe => "Setting up your trading wallet...",
            Self::SettingAllowances => "Approving exchange contracts...",
            Self::SigningOrder => "Confirm the order in your wallet...",
            Self::SubmittingOrder => "Submitting order...",
            Self::Completed => "Order placed",
            Self::Error => "Order failed",
        }
    }

    /// Whether the stage ends a trade attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for TradeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::SwitchingNetwork => "switching-network",
            Self::CheckingBalance => "checking-balance",
            Self::LinkingWallet => "linking-wallet",
            Self::DeployingSafe => "deploying-safe",
            Self::SettingAllowances => "setting-allowances",
            Self::SigningOrder => "signing-order",
            Self::SubmittingOrder => "submitting-order",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(TradeStage::Completed.is_terminal());
        assert!(TradeStage::Error.is_terminal());
        assert!(!TradeStage::Idle.is_terminal());
        assert!(!TradeStage::SubmittingOrder.is_terminal());
    }

    #[test]
    fn test_display_is_kebab_case() {
        assert_eq!(TradeStage::DeployingSafe.to_string(), "deploying-safe");
        assert_eq!(TradeStage::SwitchingNetwork.to_string(), "switching-network");
    }

    #[test]
    fn test_default_is_idle() {
        assert_eq!(TradeStage::default(), TradeStage::Idle);
    }
}
