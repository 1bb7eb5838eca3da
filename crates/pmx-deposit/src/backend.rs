//! Deposit/credit backend client.
//!
//! The backend sits behind a serverless function boundary and exposes three
//! JSON actions. `verify-deposit` is the only credit-mutating call; it is
//! idempotent keyed by transaction signature on the ledger side, but the
//! client still never re-calls it after an observed success.

use crate::error::{DepositError, DepositResult};
use pmx_signer::BoxFuture;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for backend requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deposit routing information for a wallet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DepositInfo {
    #[serde(rename = "depositAddress")]
    pub deposit_address: String,
    #[serde(rename = "tokenMint")]
    pub token_mint: String,
    #[serde(rename = "creditsPerToken")]
    pub credits_per_token: Decimal,
}

/// Terminal or retryable verification status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendVerify {
    /// The ledger credited the deposit.
    Credited { credits: u64 },
    /// Not confirmed yet; retry later, never treat as failure.
    Pending,
    /// The ledger rejected the transaction.
    Failed { reason: String },
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: String,
    #[serde(default)]
    credits: Option<u64>,
    #[serde(default)]
    reason: Option<String>,
}

impl From<VerifyResponse> for BackendVerify {
    fn from(response: VerifyResponse) -> Self {
        match response.status.as_str() {
            "success" => Self::Credited {
                credits: response.credits.unwrap_or(0),
            },
            "pending" => Self::Pending,
            _ => Self::Failed {
                reason: response
                    .reason
                    .unwrap_or_else(|| format!("status {}", response.status)),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    wallet: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<&'a str>,
}

/// Deposit backend operations.
pub trait DepositBackend: Send + Sync {
    /// Deposit address and conversion rate for a wallet.
    fn get_deposit_address(&self, wallet: String) -> BoxFuture<'_, DepositResult<DepositInfo>>;

    /// Verify a transfer by its transaction signature.
    fn verify_deposit(
        &self,
        wallet: String,
        signature: String,
    ) -> BoxFuture<'_, DepositResult<BackendVerify>>;

    /// Look the wallet's incoming transfer up on the indexer.
    fn find_deposit(&self, wallet: String) -> BoxFuture<'_, DepositResult<Option<String>>>;
}

/// Shared handle to a `DepositBackend` trait object.
pub type DynDepositBackend = Arc<dyn DepositBackend>;

/// HTTP implementation against the serverless endpoint.
pub struct DepositBackendClient {
    client: Client,
    endpoint: String,
}

impl DepositBackendClient {
    pub fn new(endpoint: impl Into<String>) -> DepositResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| DepositError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        request: &ActionRequest<'_>,
    ) -> DepositResult<T> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| DepositError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DepositError::Backend(format!(
                "{}: HTTP {status}: {body}",
                request.action
            )));
        }
        response
            .json()
            .await
            .map_err(|e| DepositError::Backend(e.to_string()))
    }
}

impl DepositBackend for DepositBackendClient {
    fn get_deposit_address(&self, wallet: String) -> BoxFuture<'_, DepositResult<DepositInfo>> {
        Box::pin(async move {
            debug!(%wallet, "fetching deposit address");
            self.post(&ActionRequest {
                action: "get-deposit-address",
                wallet: &wallet,
                signature: None,
            })
            .await
        })
    }

    fn verify_deposit(
        &self,
        wallet: String,
        signature: String,
    ) -> BoxFuture<'_, DepositResult<BackendVerify>> {
        Box::pin(async move {
            info!(%wallet, %signature, "verifying deposit");
            let response: VerifyResponse = self
                .post(&ActionRequest {
                    action: "verify-deposit",
                    wallet: &wallet,
                    signature: Some(&signature),
                })
                .await?;
            Ok(BackendVerify::from(response))
        })
    }

    fn find_deposit(&self, wallet: String) -> BoxFuture<'_, DepositResult<Option<String>>> {
        Box::pin(async move {
            debug!(%wallet, "looking up deposit on indexer");
            let response: FindResponse = self
                .post(&ActionRequest {
                    action: "find-deposit",
                    wallet: &wallet,
                    signature: None,
                })
                .await?;
            Ok(response.signature)
        })
    }
}

/// Scripted `DepositBackend` for tests.
pub struct MockDepositBackend {
    pub info: parking_lot::Mutex<DepositInfo>,
    /// Verification results consumed in order; the last one repeats.
    pub verify_results: parking_lot::Mutex<Vec<BackendVerify>>,
    /// Find results consumed in order; `None` repeats once exhausted.
    pub find_results: parking_lot::Mutex<Vec<Option<String>>>,
    pub verify_calls: std::sync::atomic::AtomicUsize,
    pub find_calls: std::sync::atomic::AtomicUsize,
}

impl Default for MockDepositBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDepositBackend {
    pub fn new() -> Self {
        Self {
            info: parking_lot::Mutex::new(DepositInfo {
                deposit_address: "0xdeposit".to_string(),
                token_mint: format!("{:#x}", alloy::primitives::Address::repeat_byte(0x77)),
                credits_per_token: Decimal::from(100),
            }),
            verify_results: parking_lot::Mutex::new(vec![BackendVerify::Credited {
                credits: 1000,
            }]),
            find_results: parking_lot::Mutex::new(Vec::new()),
            verify_calls: std::sync::atomic::AtomicUsize::new(0),
            find_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl DepositBackend for MockDepositBackend {
    fn get_deposit_address(&self, _wallet: String) -> BoxFuture<'_, DepositResult<DepositInfo>> {
        Box::pin(async move { Ok(self.info.lock().clone()) })
    }

    fn verify_deposit(
        &self,
        _wallet: String,
        _signature: String,
    ) -> BoxFuture<'_, DepositResult<BackendVerify>> {
        Box::pin(async move {
            self.verify_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut results = self.verify_results.lock();
            Ok(if results.len() > 1 {
                results.remove(0)
            } else {
                results
                    .first()
                    .cloned()
                    .unwrap_or(BackendVerify::Pending)
            })
        })
    }

    fn find_deposit(&self, _wallet: String) -> BoxFuture<'_, DepositResult<Option<String>>> {
        Box::pin(async move {
            self.find_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let mut results = self.find_results.lock();
            Ok(if results.is_empty() {
                None
            } else {
                results.remove(0)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_response_mapping() {
        let success: VerifyResponse =
            serde_json::from_str(r#"{"status":"success","credits":2500}"#).unwrap();
        assert_eq!(
            BackendVerify::from(success),
            BackendVerify::Credited { credits: 2500 }
        );

        let pending: VerifyResponse = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(BackendVerify::from(pending), BackendVerify::Pending);

        let failed: VerifyResponse =
            serde_json::from_str(r#"{"status":"failed","reason":"wrong token"}"#).unwrap();
        assert_eq!(
            BackendVerify::from(failed),
            BackendVerify::Failed {
                reason: "wrong token".to_string()
            }
        );
    }

    #[test]
    fn test_action_request_shape() {
        let request = ActionRequest {
            action: "verify-deposit",
            wallet: "0xw",
            signature: Some("0xsig"),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"action":"verify-deposit","wallet":"0xw","signature":"0xsig"}"#
        );

        let request = ActionRequest {
            action: "find-deposit",
            wallet: "0xw",
            signature: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("signature"));
    }
}
