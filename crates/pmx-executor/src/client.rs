//! CLOB REST client.
//!
//! Market metadata is always fetched fresh at submission time: markets get
//! reclassified (tick size, negative-risk status) and client-side
//! assumptions go stale. Authenticated endpoints take the L2 header set.

use crate::headers::L2AuthHeaders;
use crate::wire::{PostOrderBody, PostOrderResponse};
use pmx_core::{OpenOrder, Price, Shares, Side, TickSize, TokenId, TradeError, Usd};
use pmx_signer::BoxFuture;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for exchange requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a submission attempt at the transport level.
///
/// `Refused` carries the raw status and body for classification; transport
/// failures (timeouts, connection errors) surface as `TradeError::Internal`.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Accepted(PostOrderResponse),
    Refused { status: u16, body: String },
}

/// Collateral balance and exchange allowance for a funder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceAllowance {
    pub balance: Usd,
    pub allowance: Usd,
}

/// Exchange REST operations the submitter depends on.
pub trait ClobApi: Send + Sync {
    /// Authoritative tick size for a token's market.
    fn tick_size(&self, token: TokenId) -> BoxFuture<'_, Result<TickSize, TradeError>>;

    /// Whether the token's market settles through the neg-risk adapter.
    fn neg_risk(&self, token: TokenId) -> BoxFuture<'_, Result<bool, TradeError>>;

    /// Submit a signed order.
    fn post_order(
        &self,
        body: PostOrderBody,
        headers: L2AuthHeaders,
    ) -> BoxFuture<'_, Result<SubmitOutcome, TradeError>>;

    /// Collateral balance/allowance for the authenticated funder.
    fn balance_allowance(
        &self,
        headers: L2AuthHeaders,
    ) -> BoxFuture<'_, Result<BalanceAllowance, TradeError>>;

    /// Orders currently resting on the book, optionally per token.
    fn open_orders(
        &self,
        headers: L2AuthHeaders,
        token: Option<TokenId>,
    ) -> BoxFuture<'_, Result<Vec<OpenOrder>, TradeError>>;

    /// Cancel a resting order.
    fn cancel_order(
        &self,
        headers: L2AuthHeaders,
        order_id: String,
    ) -> BoxFuture<'_, Result<(), TradeError>>;
}

/// Shared handle to a `ClobApi` trait object.
pub type DynClobApi = Arc<dyn ClobApi>;

#[derive(Debug, Deserialize)]
struct TickSizeResponse {
    #[serde(rename = "minimum_tick_size")]
    minimum_tick_size: Decimal,
}

#[derive(Debug, Deserialize)]
struct NegRiskResponse {
    #[serde(rename = "neg_risk")]
    neg_risk: bool,
}

#[derive(Debug, Deserialize)]
struct BalanceAllowanceResponse {
    /// Base units of the 6-decimal collateral token.
    balance: String,
    #[serde(default)]
    allowance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenOrderRaw {
    id: String,
    asset_id: String,
    side: Side,
    price: Decimal,
    original_size: Decimal,
    size_matched: Decimal,
}

impl From<OpenOrderRaw> for OpenOrder {
    fn from(raw: OpenOrderRaw) -> Self {
        Self {
            order_id: raw.id,
            token_id: TokenId::from(raw.asset_id),
            side: raw.side,
            price: Price::new(raw.price),
            original_size: Shares::new(raw.original_size),
            remaining_size: Shares::new(raw.original_size - raw.size_matched),
        }
    }
}

/// HTTP implementation of [`ClobApi`].
pub struct ClobClient {
    client: Client,
    base_url: String,
}

impl ClobClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, TradeError> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| TradeError::Internal(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn authed(
        request: reqwest::RequestBuilder,
        headers: &L2AuthHeaders,
    ) -> reqwest::RequestBuilder {
        request
            .header("POLY_ADDRESS", &headers.address)
            .header("POLY_SIGNATURE", &headers.signature)
            .header("POLY_TIMESTAMP", &headers.timestamp)
            .header("POLY_API_KEY", &headers.api_key)
            .header("POLY_PASSPHRASE", &headers.passphrase)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, TradeError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TradeError::Internal(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradeError::Internal(format!("GET {path}: HTTP {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| TradeError::Internal(e.to_string()))
    }

    fn base_units_to_usd(raw: &str) -> Usd {
        let base: Decimal = raw.parse().unwrap_or(Decimal::ZERO);
        Usd::new(base / Decimal::from(1_000_000u64))
    }
}

impl ClobApi for ClobClient {
    fn tick_size(&self, token: TokenId) -> BoxFuture<'_, Result<TickSize, TradeError>> {
        Box::pin(async move {
            let response: TickSizeResponse = self
                .get_json(&format!("/tick-size?token_id={token}"))
                .await?;
            TickSize::try_from(response.minimum_tick_size)
                .map_err(|e| TradeError::Internal(e.to_string()))
        })
    }

    fn neg_risk(&self, token: TokenId) -> BoxFuture<'_, Result<bool, TradeError>> {
        Box::pin(async move {
            let response: NegRiskResponse =
                self.get_json(&format!("/neg-risk?token_id={token}")).await?;
            Ok(response.neg_risk)
        })
    }

    fn post_order(
        &self,
        body: PostOrderBody,
        headers: L2AuthHeaders,
    ) -> BoxFuture<'_, Result<SubmitOutcome, TradeError>> {
        Box::pin(async move {
            info!(token = %body.order.token_id, side = %body.order.side, "submitting order");
            let url = format!("{}/order", self.base_url);
            let response = Self::authed(self.client.post(&url), &headers)
                .json(&body)
                .send()
                .await
                .map_err(|e| TradeError::Internal(e.to_string()))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| TradeError::Internal(e.to_string()))?;

            if !status.is_success() {
                debug!(%status, "order refused");
                return Ok(SubmitOutcome::Refused {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let parsed: PostOrderResponse = serde_json::from_str(&text)
                .map_err(|e| TradeError::Internal(format!("unparseable order response: {e}")))?;
            Ok(SubmitOutcome::Accepted(parsed))
        })
    }

    fn balance_allowance(
        &self,
        headers: L2AuthHeaders,
    ) -> BoxFuture<'_, Result<BalanceAllowance, TradeError>> {
        Box::pin(async move {
            let url = format!(
                "{}/balance-allowance?asset_type=COLLATERAL",
                self.base_url
            );
            let response = Self::authed(self.client.get(&url), &headers)
                .send()
                .await
                .map_err(|e| TradeError::Internal(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(TradeError::CredentialsExpired);
            }
            if !status.is_success() {
                return Err(TradeError::Internal(format!("balance check: HTTP {status}")));
            }

            let body: BalanceAllowanceResponse = response
                .json()
                .await
                .map_err(|e| TradeError::Internal(e.to_string()))?;
            Ok(BalanceAllowance {
                balance: Self::base_units_to_usd(&body.balance),
                allowance: body
                    .allowance
                    .as_deref()
                    .map(Self::base_units_to_usd)
                    .unwrap_or(Usd::ZERO),
            })
        })
    }

    fn open_orders(
        &self,
        headers: L2AuthHeaders,
        token: Option<TokenId>,
    ) -> BoxFuture<'_, Result<Vec<OpenOrder>, TradeError>> {
        Box::pin(async move {
            let mut url = format!("{}/data/orders", self.base_url);
            if let Some(token) = &token {
                url.push_str(&format!("?asset_id={token}"));
            }
            let response = Self::authed(self.client.get(&url), &headers)
                .send()
                .await
                .map_err(|e| TradeError::Internal(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(TradeError::CredentialsExpired);
            }
            if !status.is_success() {
                return Err(TradeError::Internal(format!("open orders: HTTP {status}")));
            }

            let raw: Vec<OpenOrderRaw> = response
                .json()
                .await
                .map_err(|e| TradeError::Internal(e.to_string()))?;
            Ok(raw.into_iter().map(OpenOrder::from).collect())
        })
    }

    fn cancel_order(
        &self,
        headers: L2AuthHeaders,
        order_id: String,
    ) -> BoxFuture<'_, Result<(), TradeError>> {
        Box::pin(async move {
            info!(%order_id, "cancelling order");
            let url = format!("{}/order", self.base_url);
            let response = Self::authed(self.client.delete(&url), &headers)
                .json(&serde_json::json!({ "orderID": order_id }))
                .send()
                .await
                .map_err(|e| TradeError::Internal(e.to_string()))?;

            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(TradeError::CredentialsExpired);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TradeError::OrderRejected(format!(
                    "cancel failed: HTTP {status}: {body}"
                )));
            }
            Ok(())
        })
    }
}

/// Scripted `ClobApi` for tests.
pub struct MockClobApi {
    pub tick: parking_lot::Mutex<TickSize>,
    pub neg_risk: parking_lot::Mutex<bool>,
    pub submit_outcome: parking_lot::Mutex<SubmitOutcome>,
    pub balance: parking_lot::Mutex<BalanceAllowance>,
    pub open: parking_lot::Mutex<Vec<OpenOrder>>,
    pub last_post: parking_lot::Mutex<Option<(PostOrderBody, L2AuthHeaders)>>,
    pub post_calls: std::sync::atomic::AtomicUsize,
    pub cancelled: parking_lot::Mutex<Vec<String>>,
}

impl Default for MockClobApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClobApi {
    pub fn new() -> Self {
        Self {
            tick: parking_lot::Mutex::new(TickSize::Hundredth),
            neg_risk: parking_lot::Mutex::new(false),
            submit_outcome: parking_lot::Mutex::new(SubmitOutcome::Accepted(PostOrderResponse {
                success: true,
                order_id: Some("0xorder".to_string()),
                status: Some("live".to_string()),
                error_msg: None,
                making_amount: None,
                taking_amount: None,
            })),
            balance: parking_lot::Mutex::new(BalanceAllowance {
                balance: Usd::new(Decimal::from(1_000)),
                allowance: Usd::new(Decimal::from(1_000)),
            }),
            open: parking_lot::Mutex::new(Vec::new()),
            last_post: parking_lot::Mutex::new(None),
            post_calls: std::sync::atomic::AtomicUsize::new(0),
            cancelled: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn set_submit_outcome(&self, outcome: SubmitOutcome) {
        *self.submit_outcome.lock() = outcome;
    }
}

impl ClobApi for MockClobApi {
    fn tick_size(&self, _token: TokenId) -> BoxFuture<'_, Result<TickSize, TradeError>> {
        Box::pin(async move { Ok(*self.tick.lock()) })
    }

    fn neg_risk(&self, _token: TokenId) -> BoxFuture<'_, Result<bool, TradeError>> {
        Box::pin(async move { Ok(*self.neg_risk.lock()) })
    }

    fn post_order(
        &self,
        body: PostOrderBody,
        headers: L2AuthHeaders,
    ) -> BoxFuture<'_, Result<SubmitOutcome, TradeError>> {
        Box::pin(async move {
            self.post_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            *self.last_post.lock() = Some((body, headers));
            Ok(self.submit_outcome.lock().clone())
        })
    }

    fn balance_allowance(
        &self,
        _headers: L2AuthHeaders,
    ) -> BoxFuture<'_, Result<BalanceAllowance, TradeError>> {
        Box::pin(async move { Ok(*self.balance.lock()) })
    }

    fn open_orders(
        &self,
        _headers: L2AuthHeaders,
        token: Option<TokenId>,
    ) -> BoxFuture<'_, Result<Vec<OpenOrder>, TradeError>> {
        Box::pin(async move {
            let orders = self.open.lock().clone();
            Ok(match token {
                Some(token) => orders
                    .into_iter()
                    .filter(|o| o.token_id == token)
                    .collect(),
                None => orders,
            })
        })
    }

    fn cancel_order(
        &self,
        _headers: L2AuthHeaders,
        order_id: String,
    ) -> BoxFuture<'_, Result<(), TradeError>> {
        Box::pin(async move {
            self.cancelled.lock().push(order_id);
            Ok(())
        })
    }
}
