//! Order submission.
//!
//! Builds the signed order from a sized trade, re-validating market
//! metadata against the exchange first, pre-checking on-chain share balance
//! for sells, and classifying every refusal into the error taxonomy.

use crate::classify::classify_refusal;
use crate::client::{BalanceAllowance, DynClobApi, SubmitOutcome};
use crate::eip712::{order_typed_data, Order, SignatureScheme};
use crate::headers::build_l2_headers;
use crate::wire::{order_amounts, PostOrderBody, SignedOrderRequest, COLLATERAL_DECIMALS};
use alloy::primitives::{Address, U256};
use pmx_auth::{Clock, Credentials, SystemClock};
use pmx_core::{
    size_order, OpenOrder, OrderResult, OrderStatus, Price, Shares, Side, SizedOrder,
    SizingConfig, TokenId, TradeError, TradeParams,
};
use pmx_provision::DynChainReader;
use pmx_signer::{SignerError, WalletSigner};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Executor configuration.
///
/// The sell tolerance is a product decision, not a derived constant, so it
/// stays configurable here rather than hard-coded at the call site.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub chain_id: u64,
    /// Base exchange contract (EIP-712 verifying contract).
    pub exchange: Address,
    /// Negative-risk exchange contract.
    pub neg_risk_exchange: Address,
    /// Conditional-token (ERC-1155) contract holding outcome shares.
    pub conditional_tokens: Address,
    /// Fraction of a sell that may exceed the on-chain balance before the
    /// order is refused instead of capped. Absorbs precision drift from
    /// "sell all" flows.
    pub sell_tolerance: Decimal,
    /// Decimals a capped sell size is floored to.
    pub sell_cap_decimals: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            chain_id: 137,
            exchange: Address::ZERO,
            neg_risk_exchange: Address::ZERO,
            conditional_tokens: Address::ZERO,
            sell_tolerance: dec!(0.01),
            sell_cap_decimals: COLLATERAL_DECIMALS,
        }
    }
}

/// Builds, signs, and submits orders.
pub struct OrderSubmitter {
    api: DynClobApi,
    chain: DynChainReader,
    config: ExecutorConfig,
    clock: Arc<dyn Clock>,
}

impl OrderSubmitter {
    pub fn new(api: DynClobApi, chain: DynChainReader, config: ExecutorConfig) -> Self {
        Self::with_clock(api, chain, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        api: DynClobApi,
        chain: DynChainReader,
        config: ExecutorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            chain,
            config,
            clock,
        }
    }

    /// Submit a sized order.
    ///
    /// Market metadata (neg-risk flag, tick size) is re-fetched rather than
    /// trusted from the caller, since markets change classification. A tick-size
    /// disagreement re-sizes the order from the original params before
    /// signing.
    pub async fn submit(
        &self,
        signer: &dyn WalletSigner,
        credentials: &Credentials,
        funder: Address,
        params: &TradeParams,
        sized: SizedOrder,
    ) -> Result<OrderResult, TradeError> {
        let token = params.token_id.clone();

        let (neg_risk, tick_size) = tokio::try_join!(
            self.api.neg_risk(token.clone()),
            self.api.tick_size(token.clone())
        )?;

        let mut sized = if tick_size != params.tick_size {
            warn!(
                token = %token,
                assumed = %params.tick_size,
                authoritative = %tick_size,
                "tick size changed, re-sizing order"
            );
            let corrected = TradeParams {
                tick_size,
                ..params.clone()
            };
            size_order(&corrected, &SizingConfig::default())?
        } else {
            sized
        };

        if params.side == Side::Sell {
            sized.size = self.cap_sell_size(funder, &token, sized.size).await?;
        }

        let amounts = order_amounts(params.side, sized.size, sized.rounded_price)?;
        let signer_address = signer.address();
        let scheme = SignatureScheme::for_funder(signer_address, funder);
        let token_u256 = U256::from_str(token.as_str())
            .map_err(|_| TradeError::InvalidParams(format!("token id {token} is not numeric")))?;
        let salt = uuid::Uuid::new_v4().as_u128() as u64;

        let order = Order {
            salt: U256::from(salt),
            maker: funder,
            signer: signer_address,
            taker: Address::ZERO,
            tokenId: token_u256,
            makerAmount: amounts.maker_amount,
            takerAmount: amounts.taker_amount,
            expiration: U256::ZERO,
            nonce: U256::ZERO,
            feeRateBps: U256::ZERO,
            side: params.side.as_index(),
            signatureType: scheme.as_u8(),
        };

        let verifying_contract = if neg_risk {
            self.config.neg_risk_exchange
        } else {
            self.config.exchange
        };

        let request = order_typed_data(&order, self.config.chain_id, verifying_contract);
        let signature = signer.sign_typed_data(request).await.map_err(|e| match e {
            SignerError::UserRejected => TradeError::UserRejectedSignature,
            other => TradeError::Internal(other.to_string()),
        })?;

        let body = PostOrderBody {
            order: SignedOrderRequest {
                salt,
                maker: funder,
                signer: signer_address,
                taker: Address::ZERO,
                token_id: token.to_string(),
                maker_amount: amounts.maker_amount.to_string(),
                taker_amount: amounts.taker_amount.to_string(),
                expiration: "0".to_string(),
                nonce: "0".to_string(),
                fee_rate_bps: "0".to_string(),
                side: params.side.as_str().to_string(),
                signature_type: scheme.as_u8(),
                signature: signature.to_hex(),
            },
            owner: credentials.api_key.clone(),
            order_type: params.order_kind().to_string(),
        };

        let body_json = serde_json::to_string(&body)
            .map_err(|e| TradeError::Internal(e.to_string()))?;
        let headers = build_l2_headers(
            credentials,
            "POST",
            "/order",
            Some(&body_json),
            self.clock.now_ms() / 1000,
        )?;

        match self.api.post_order(body, headers).await? {
            SubmitOutcome::Accepted(response) if response.success => {
                let order_id = response.order_id.clone().ok_or_else(|| {
                    TradeError::OrderRejected("accepted without an order id".to_string())
                })?;
                let filled = response.filled_shares(params.side);
                let result = OrderResult {
                    order_id,
                    status: parse_status(response.status.as_deref()),
                    requested: sized.size,
                    filled,
                    raw: serde_json::to_value(&response).ok(),
                };
                if result.is_partial_fill() {
                    // Normal FAK behavior, reported as informational.
                    info!(
                        order_id = %result.order_id,
                        requested = %result.requested,
                        filled = ?result.filled,
                        "order partially filled"
                    );
                } else {
                    info!(order_id = %result.order_id, status = %result.status, "order accepted");
                }
                Ok(result)
            }
            SubmitOutcome::Accepted(response) => {
                let raw = serde_json::to_string(&response).unwrap_or_default();
                debug!(%raw, "order refused in accepted envelope");
                Err(classify_refusal(200, &raw))
            }
            SubmitOutcome::Refused { status, body } => Err(classify_refusal(status, &body)),
        }
    }

    /// Collateral balance and allowance for the credential's funder.
    pub async fn collateral_balance(
        &self,
        credentials: &Credentials,
    ) -> Result<BalanceAllowance, TradeError> {
        let headers = build_l2_headers(
            credentials,
            "GET",
            "/balance-allowance",
            None,
            self.clock.now_ms() / 1000,
        )?;
        self.api.balance_allowance(headers).await
    }

    /// Orders currently resting on the book.
    pub async fn open_orders(
        &self,
        credentials: &Credentials,
        token: Option<TokenId>,
    ) -> Result<Vec<OpenOrder>, TradeError> {
        let headers = build_l2_headers(
            credentials,
            "GET",
            "/data/orders",
            None,
            self.clock.now_ms() / 1000,
        )?;
        self.api.open_orders(headers, token).await
    }

    /// Match an open order by token, side, and price.
    ///
    /// Used to reconcile an ambiguous submission failure before any retry:
    /// a "failed" response may have been accepted, and resubmitting blindly
    /// would double the position.
    pub async fn find_open_order(
        &self,
        credentials: &Credentials,
        token: &TokenId,
        side: Side,
        price: Price,
    ) -> Result<Option<OpenOrder>, TradeError> {
        let orders = self.open_orders(credentials, Some(token.clone())).await?;
        Ok(orders
            .into_iter()
            .find(|o| o.side == side && o.price == price))
    }

    /// Cancel a resting order.
    pub async fn cancel_order(
        &self,
        credentials: &Credentials,
        order_id: &str,
    ) -> Result<(), TradeError> {
        let headers = build_l2_headers(
            credentials,
            "DELETE",
            "/order",
            None,
            self.clock.now_ms() / 1000,
        )?;
        self.api.cancel_order(headers, order_id.to_string()).await
    }

    /// Cap a sell to the funder's on-chain share balance.
    ///
    /// A shortfall within the tolerance band is treated as precision drift
    /// from a "sell all" flow and capped down; beyond it the sell fails.
    async fn cap_sell_size(
        &self,
        funder: Address,
        token: &TokenId,
        requested: Shares,
    ) -> Result<Shares, TradeError> {
        let id = U256::from_str(token.as_str())
            .map_err(|_| TradeError::InvalidParams(format!("token id {token} is not numeric")))?;

        let raw = self
            .chain
            .erc1155_balance(self.config.conditional_tokens, funder, id)
            .await
            .map_err(|e| TradeError::Internal(e.to_string()))?;
        let raw: u128 = raw
            .try_into()
            .map_err(|_| TradeError::Internal("share balance out of range".to_string()))?;
        let balance = Shares::new(Decimal::from_i128_with_scale(
            raw as i128,
            COLLATERAL_DECIMALS,
        ));

        if balance >= requested {
            return Ok(requested);
        }

        let shortfall = requested - balance;
        let allowed = requested.inner() * self.config.sell_tolerance;
        if shortfall.inner() <= allowed {
            let capped = balance.floor_dp(self.config.sell_cap_decimals);
            warn!(
                %requested,
                %balance,
                %capped,
                "sell size exceeds balance within tolerance, capping"
            );
            Ok(capped)
        } else {
            Err(TradeError::InsufficientShares {
                requested,
                available: balance,
            })
        }
    }
}

fn parse_status(status: Option<&str>) -> OrderStatus {
    match status {
        Some("live") => OrderStatus::Live,
        Some("matched") => OrderStatus::Matched,
        Some("delayed") => OrderStatus::Delayed,
        _ => OrderStatus::Unknown,
    }
}
