//! Deposit session state.

use crate::error::{DepositError, DepositResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a deposit-to-credit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepositStage {
    /// Choosing how much to deposit.
    Amount,
    /// Choosing between quick transfer and manual send.
    MethodSelect,
    /// Wallet-submitted transfer in progress.
    QuickTransfer,
    /// Waiting for a manually sent transfer.
    ManualSend,
    /// Polling the indexer for the incoming transfer.
    Detecting,
    /// Verifying a known transaction signature.
    Verifying,
    Success,
    Error,
}

impl DepositStage {
    /// Human-readable progress message for UI consumption.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Amount => "Enter deposit amount",
            Self::MethodSelect => "Choose a deposit method",
            Self::QuickTransfer => "Confirm the transfer in your wallet...",
            Self::ManualSend => "Send funds to the deposit address",
            Self::Detecting => "Watching for your deposit...",
            Self::Verifying => "Verifying deposit...",
            Self::Success => "Deposit credited",
            Self::Error => "Deposit failed",
        }
    }
}

impl fmt::Display for DepositStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Amount => write!(f, "amount"),
            Self::MethodSelect => write!(f, "method-select"),
            Self::QuickTransfer => write!(f, "quick-transfer"),
            Self::ManualSend => write!(f, "manual-send"),
            Self::Detecting => write!(f, "detecting"),
            Self::Verifying => write!(f, "verifying"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single deposit-to-credit conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositSession {
    /// Wallet the credits accrue to.
    pub wallet_address: String,
    /// Address the user sends funds to.
    pub deposit_address: String,
    /// Token accepted at the deposit address.
    pub token_mint: String,
    /// Conversion rate from deposited tokens to internal credit.
    pub credits_per_token: Decimal,
    /// Deposit amount in tokens.
    pub amount: Decimal,
    /// Transaction signature once known.
    pub tx_signature: Option<String>,
    /// Current stage.
    pub stage: DepositStage,
}

impl DepositSession {
    pub fn new(
        wallet_address: impl Into<String>,
        deposit_address: impl Into<String>,
        token_mint: impl Into<String>,
        credits_per_token: Decimal,
        amount: Decimal,
    ) -> DepositResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(DepositError::InvalidAmount(format!(
                "amount must be positive, got {amount}"
            )));
        }
        Ok(Self {
            wallet_address: wallet_address.into(),
            deposit_address: deposit_address.into(),
            token_mint: token_mint.into(),
            credits_per_token,
            amount,
            tx_signature: None,
            stage: DepositStage::Amount,
        })
    }

    /// Credits this deposit should yield: `floor(amount * credits_per_token)`.
    pub fn expected_credits(&self) -> u64 {
        (self.amount * self.credits_per_token)
            .floor()
            .to_u64()
            .unwrap_or(0)
    }
}
