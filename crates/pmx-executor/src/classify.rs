//! Exchange response classification.
//!
//! Refusals are mapped into the pipeline error taxonomy at this boundary
//! and nowhere else. Structured error codes are preferred; wording-based
//! matching is the last resort and a known fragility, since the exchange
//! can rephrase messages without notice.

use pmx_core::TradeError;
use serde::Deserialize;

/// Error-shaped body from the exchange.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "errorMsg", alias = "message")]
    error: Option<String>,
    #[serde(default, rename = "errorCode")]
    error_code: Option<String>,
}

/// Classify a refused submission into the error taxonomy.
pub fn classify_refusal(status: u16, body: &str) -> TradeError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .unwrap_or_else(|| if body.is_empty() { format!("HTTP {status}") } else { body.to_string() });

    if let Some(code) = parsed.error_code.as_deref() {
        match code {
            "FOK_ORDER_NOT_FILLED_ERROR" | "MARKET_ORDER_NOT_FILLED_ERROR" => {
                return TradeError::NoLiquidity
            }
            "INVALID_ORDER_NOT_ENOUGH_BALANCE" => {
                return TradeError::InsufficientFunds(message)
            }
            "INVALID_API_KEY" | "API_KEY_EXPIRED" | "UNAUTHORIZED" => {
                return TradeError::CredentialsExpired
            }
            _ => {}
        }
    }

    if status == 401 || status == 403 {
        return TradeError::CredentialsExpired;
    }

    // Fallback: wording-based classification of free-text errors.
    let lowered = message.to_lowercase();
    if lowered.contains("no match")
        || lowered.contains("not filled")
        || lowered.contains("fok order")
    {
        TradeError::NoLiquidity
    } else if lowered.contains("balance") || lowered.contains("allowance") {
        TradeError::InsufficientFunds(message)
    } else if lowered.contains("api key")
        || lowered.contains("api credentials")
        || lowered.contains("unauthorized")
    {
        TradeError::CredentialsExpired
    } else {
        TradeError::OrderRejected(message)
    }
}
