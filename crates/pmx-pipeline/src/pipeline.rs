//! The trade pipeline.
//!
//! Sequences sizing, network and balance guards, smart-wallet provisioning,
//! credential linking, and submission in strict order, with every stage
//! transition pushed to the observer and at most one order in flight per
//! pipeline instance.

use crate::config::PipelineConfig;
use crate::observer::StageObserver;
use crate::stage::TradeStage;
use crate::switcher::DynChainSwitcher;
use pmx_auth::{AuthError, CredentialLinker, CredentialStore};
use pmx_core::{OrderResult, Side, TradeError, TradeParams};
use pmx_executor::OrderSubmitter;
use pmx_provision::{DynChainReader, ProvisionError, SafeProvisioner};
use pmx_signer::{
    BoxFuture, DynWalletSigner, SignatureParts, SignerResult, TransferRequest, TypedDataRequest,
    WalletSigner,
};
use pmx_telemetry::metrics;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External collaborators the pipeline sequences.
pub struct PipelineDeps {
    pub signer: DynWalletSigner,
    pub switcher: DynChainSwitcher,
    pub provisioner: Arc<SafeProvisioner>,
    pub linker: Arc<CredentialLinker>,
    pub submitter: Arc<OrderSubmitter>,
    pub credentials: Arc<CredentialStore>,
    pub chain: DynChainReader,
}

/// Client-side order pipeline for one trading session.
pub struct TradePipeline {
    config: PipelineConfig,
    deps: PipelineDeps,
    observer: Arc<dyn StageObserver>,
    stage: Arc<parking_lot::Mutex<TradeStage>>,
    /// Bumped per trade so a stale reset timer can't clobber a new trade.
    generation: Arc<AtomicU64>,
    /// Single-flight guard: at most one order in flight per session.
    in_flight: AtomicBool,
}

impl TradePipeline {
    pub fn new(
        config: PipelineConfig,
        deps: PipelineDeps,
        observer: Arc<dyn StageObserver>,
    ) -> Self {
        Self {
            config,
            deps,
            observer,
            stage: Arc::new(parking_lot::Mutex::new(TradeStage::Idle)),
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Current stage, for hosts that poll instead of observing.
    pub fn current_stage(&self) -> TradeStage {
        *self.stage.lock()
    }

    /// Place an order.
    ///
    /// A second call while one is pending is rejected with `Busy` at the
    /// entry point, never queued.
    pub async fn place_order(&self, params: TradeParams) -> Result<OrderResult, TradeError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("rejecting order: another is in flight");
            metrics::ORDERS_FAILED_TOTAL
                .with_label_values(&[TradeError::Busy.label()])
                .inc();
            return Err(TradeError::Busy);
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        metrics::ORDER_IN_FLIGHT.set(1);
        metrics::ORDERS_SUBMITTED_TOTAL
            .with_label_values(&[params.side.as_str(), &params.order_kind().to_string()])
            .inc();
        let started = std::time::Instant::now();

        let result = self.run(&params).await;

        metrics::PLACE_ORDER_SECONDS.observe(started.elapsed().as_secs_f64());
        metrics::ORDER_IN_FLIGHT.set(0);
        if let Err(err) = &result {
            metrics::ORDERS_FAILED_TOTAL
                .with_label_values(&[err.label()])
                .inc();
        }

        match &result {
            Ok(order) => {
                info!(order_id = %order.order_id, "trade completed");
                self.set_stage(TradeStage::Completed, TradeStage::Completed.message());
            }
            Err(TradeError::UserRejectedSignature) => {
                // A dismissed prompt is a cancellation, not a system error.
                info!("trade cancelled in wallet");
                self.set_stage(TradeStage::Error, TradeError::UserRejectedSignature.to_string().as_str());
            }
            Err(err) => {
                warn!(%err, "trade failed");
                self.set_stage(TradeStage::Error, &err.to_string());
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
        self.schedule_idle_reset();
        result
    }

    async fn run(&self, params: &TradeParams) -> Result<OrderResult, TradeError> {
        params.validate()?;
        let sized = pmx_core::size_order(params, &self.config.sizing())?;

        // Network guard: only entered when the wallet is on the wrong chain.
        let active = self.deps.switcher.active_chain();
        if active != self.config.required_chain_id {
            self.set_stage(TradeStage::SwitchingNetwork, TradeStage::SwitchingNetwork.message());
            self.deps
                .switcher
                .switch_to(self.config.required_chain_id)
                .await?;
        }

        let owner = self.deps.signer.address();
        let funder = self.deps.provisioner.wallet_address(owner);

        // Buy-side funds check before any wallet prompt. Sells check share
        // balance at submission instead.
        self.set_stage(TradeStage::CheckingBalance, TradeStage::CheckingBalance.message());
        if params.side == Side::Buy {
            let raw = self
                .deps
                .chain
                .erc20_balance(self.config.collateral, funder)
                .await
                .map_err(|e| TradeError::Internal(e.to_string()))?;
            let raw: u128 = raw
                .try_into()
                .map_err(|_| TradeError::Internal("collateral balance out of range".into()))?;
            let balance = Decimal::from_i128_with_scale(raw as i128, 6);
            if balance < sized.target_cost.inner() {
                return Err(TradeError::InsufficientFunds(format!(
                    "balance {balance} is below order cost {}",
                    sized.target_cost
                )));
            }
        }

        let state = self
            .deps
            .provisioner
            .state(owner)
            .await
            .map_err(|e| TradeError::Internal(e.to_string()))?;

        self.set_stage(TradeStage::LinkingWallet, TradeStage::LinkingWallet.message());
        let credentials = match self
            .deps
            .linker
            .link(self.deps.signer.as_ref(), Some(funder))
            .await
        {
            Ok(credentials) => {
                metrics::CREDENTIAL_LINKS_TOTAL
                    .with_label_values(&["linked"])
                    .inc();
                credentials
            }
            Err(err) => {
                metrics::CREDENTIAL_LINKS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                return Err(auth_to_trade(err));
            }
        };

        // Provisioning guards: skipped entirely when already satisfied, so
        // repeat trades make no redundant relayer calls.
        if !state.is_deployed {
            self.set_stage(TradeStage::DeployingSafe, TradeStage::DeployingSafe.message());
            self.deps
                .provisioner
                .deploy(owner)
                .await
                .map_err(provision_deploy_to_trade)?;
        }
        if !state.has_allowances {
            self.set_stage(
                TradeStage::SettingAllowances,
                TradeStage::SettingAllowances.message(),
            );
            self.deps
                .provisioner
                .set_allowances(owner)
                .await
                .map_err(provision_allowance_to_trade)?;
        }

        self.set_stage(TradeStage::SigningOrder, TradeStage::SigningOrder.message());
        let on_signed = || {
            self.set_stage(
                TradeStage::SubmittingOrder,
                TradeStage::SubmittingOrder.message(),
            );
        };
        let observed = ObservedSigner {
            inner: self.deps.signer.as_ref(),
            on_signed: &on_signed,
        };

        let result = self
            .deps
            .submitter
            .submit(&observed, &credentials, funder, params, sized)
            .await;

        if matches!(&result, Err(TradeError::CredentialsExpired)) {
            // Drop the known-bad credentials so the next attempt re-links
            // instead of retrying them.
            if let Err(err) = self.deps.credentials.invalidate(owner) {
                warn!(%err, "failed to invalidate expired credentials");
            }
        }

        result
    }

    fn set_stage(&self, stage: TradeStage, message: &str) {
        *self.stage.lock() = stage;
        self.observer.stage_changed(stage, message);
    }

    /// Return to idle after the display delay, unless a newer trade has
    /// started in the meantime.
    fn schedule_idle_reset(&self) {
        let stage = Arc::clone(&self.stage);
        let observer = Arc::clone(&self.observer);
        let generation = Arc::clone(&self.generation);
        let expected = generation.load(Ordering::SeqCst);
        let delay = self.config.stage_reset_delay();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if generation.load(Ordering::SeqCst) == expected {
                *stage.lock() = TradeStage::Idle;
                observer.stage_changed(TradeStage::Idle, TradeStage::Idle.message());
            }
        });
    }
}

/// Signer wrapper that reports when the order signature lands, so the
/// observer sees signing-order and submitting-order as distinct stages.
struct ObservedSigner<'a> {
    inner: &'a dyn WalletSigner,
    on_signed: &'a (dyn Fn() + Sync),
}

impl WalletSigner for ObservedSigner<'_> {
    fn address(&self) -> alloy::primitives::Address {
        self.inner.address()
    }

    fn sign_typed_data(
        &self,
        request: TypedDataRequest,
    ) -> BoxFuture<'_, SignerResult<SignatureParts>> {
        Box::pin(async move {
            let signature = self.inner.sign_typed_data(request).await?;
            (self.on_signed)();
            Ok(signature)
        })
    }

    fn send_transfer(&self, request: TransferRequest) -> BoxFuture<'_, SignerResult<String>> {
        self.inner.send_transfer(request)
    }
}

fn auth_to_trade(err: AuthError) -> TradeError {
    match err {
        AuthError::UserRejected => TradeError::UserRejectedSignature,
        AuthError::AcquisitionFailed(msg) => TradeError::CredentialAcquisitionFailed(msg),
        AuthError::HttpClient(msg) => TradeError::CredentialAcquisitionFailed(msg),
        AuthError::Signing(msg) => TradeError::Internal(msg),
        AuthError::Store(err) => TradeError::Internal(err.to_string()),
    }
}

fn provision_deploy_to_trade(err: ProvisionError) -> TradeError {
    TradeError::DeploymentFailed(err.to_string())
}

fn provision_allowance_to_trade(err: ProvisionError) -> TradeError {
    match err {
        ProvisionError::NotDeployed => TradeError::DeploymentFailed(err.to_string()),
        other => TradeError::AllowanceFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::RecordingObserver;
    use crate::switcher::{ChainSwitcher, MockChainSwitcher};
    use alloy::primitives::{Address, B256, U256};
    use pmx_auth::MockAuthApi;
    use pmx_core::{OrderStatus, Price, TickSize, TokenId, Usd};
    use pmx_executor::{ExecutorConfig, MockClobApi, PostOrderResponse, SubmitOutcome};
    use pmx_provision::{
        derive_wallet_address, ExchangeSpenders, FactoryParams, MockChainReader, MockRelayer,
    };
    use pmx_signer::MockSigner;
    use pmx_store::MemoryStore;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const OWNER: Address = Address::repeat_byte(0xaa);

    fn factory() -> FactoryParams {
        FactoryParams {
            factory: Address::repeat_byte(0xfa),
            init_code_hash: B256::repeat_byte(0x1c),
        }
    }

    struct Harness {
        signer: Arc<MockSigner>,
        switcher: Arc<MockChainSwitcher>,
        relayer: Arc<MockRelayer>,
        chain: Arc<MockChainReader>,
        clob: Arc<MockClobApi>,
        auth: Arc<MockAuthApi>,
        store: Arc<MemoryStore>,
        observer: Arc<RecordingObserver>,
    }

    impl Harness {
        fn new() -> Self {
            let chain = MockChainReader::new();
            // 1000 USDC and 1000 shares available by default.
            chain.set_erc20_balance(U256::from(1_000_000_000u64));
            chain.set_erc1155_balance(U256::from(1_000_000_000u64));

            let auth = MockAuthApi::new();
            auth.set_derive_result(MockAuthApi::complete_creds("derived"));

            Self {
                signer: Arc::new(MockSigner::new(OWNER)),
                switcher: Arc::new(MockChainSwitcher::new(137)),
                relayer: Arc::new(MockRelayer::new(derive_wallet_address(&factory(), OWNER))),
                chain: Arc::new(chain),
                clob: Arc::new(MockClobApi::new()),
                auth: Arc::new(auth),
                store: Arc::new(MemoryStore::new()),
                observer: Arc::new(RecordingObserver::new()),
            }
        }

        fn config() -> PipelineConfig {
            PipelineConfig {
                required_chain_id: 137,
                collateral: Address::repeat_byte(0x04),
                stage_reset_delay_ms: 20,
                ..PipelineConfig::default()
            }
        }

        fn pipeline(&self) -> Arc<TradePipeline> {
            let spenders = ExchangeSpenders {
                exchange: Address::repeat_byte(0x01),
                neg_risk_exchange: Address::repeat_byte(0x02),
                neg_risk_adapter: Address::repeat_byte(0x03),
            };
            let provisioner = Arc::new(SafeProvisioner::new(
                factory(),
                spenders,
                self.relayer.clone(),
                self.chain.clone(),
                self.store.clone(),
            ));
            let linker = Arc::new(CredentialLinker::new(
                self.auth.clone(),
                CredentialStore::new(self.store.clone()),
                137,
            ));
            let submitter = Arc::new(OrderSubmitter::new(
                self.clob.clone(),
                self.chain.clone(),
                ExecutorConfig {
                    chain_id: 137,
                    exchange: Address::repeat_byte(0x01),
                    neg_risk_exchange: Address::repeat_byte(0x02),
                    conditional_tokens: Address::repeat_byte(0x05),
                    ..ExecutorConfig::default()
                },
            ));

            Arc::new(TradePipeline::new(
                Self::config(),
                PipelineDeps {
                    signer: self.signer.clone(),
                    switcher: self.switcher.clone(),
                    provisioner,
                    linker,
                    submitter,
                    credentials: Arc::new(CredentialStore::new(self.store.clone())),
                    chain: self.chain.clone(),
                },
                self.observer.clone(),
            ))
        }
    }

    fn buy_params() -> TradeParams {
        TradeParams {
            token_id: TokenId::from("7000"),
            side: Side::Buy,
            amount: Usd::new(dec!(25)),
            price: Price::new(dec!(0.37)),
            is_market_order: false,
            tick_size: TickSize::Hundredth,
            neg_risk: false,
        }
    }

    #[tokio::test]
    async fn test_first_trade_runs_every_stage_in_order() {
        let h = Harness::new();
        let pipeline = h.pipeline();

        let result = pipeline.place_order(buy_params()).await.unwrap();
        assert_eq!(result.order_id, "0xorder");
        assert_eq!(result.status, OrderStatus::Live);

        assert_eq!(
            h.observer.stages(),
            vec![
                TradeStage::CheckingBalance,
                TradeStage::LinkingWallet,
                TradeStage::DeployingSafe,
                TradeStage::SettingAllowances,
                TradeStage::SigningOrder,
                TradeStage::SubmittingOrder,
                TradeStage::Completed,
            ]
        );
        // Attestation signature plus order signature.
        assert_eq!(h.signer.sign_count(), 2);
    }

    #[tokio::test]
    async fn test_provisioned_wallet_skips_deploy_stages() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        pipeline.place_order(buy_params()).await.unwrap();
        let deploys_after_first = h.relayer.deploy_calls.load(Ordering::SeqCst);

        let pipeline = h.pipeline();
        pipeline.place_order(buy_params()).await.unwrap();

        // No redundant on-chain calls once provisioned.
        assert_eq!(h.relayer.deploy_calls.load(Ordering::SeqCst), deploys_after_first);
        let second_run: Vec<_> = h
            .observer
            .stages()
            .into_iter()
            .skip_while(|s| !s.is_terminal())
            .skip(1)
            .collect();
        assert!(!second_run.contains(&TradeStage::DeployingSafe));
        assert!(!second_run.contains(&TradeStage::SettingAllowances));
        // Cached credentials: the only new signature is the order itself.
        assert_eq!(h.signer.sign_count(), 3);
    }

    #[tokio::test]
    async fn test_wrong_network_switches_first() {
        let h = Harness::new();
        let switcher = Arc::new(MockChainSwitcher::new(1));
        let h = Harness { switcher, ..h };
        let pipeline = h.pipeline();

        pipeline.place_order(buy_params()).await.unwrap();

        assert_eq!(h.observer.stages()[0], TradeStage::SwitchingNetwork);
        assert_eq!(h.switcher.switch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.switcher.active_chain(), 137);
    }

    #[tokio::test]
    async fn test_matching_network_skips_switch_stage() {
        let h = Harness::new();
        let pipeline = h.pipeline();

        pipeline.place_order(buy_params()).await.unwrap();

        assert!(!h.observer.stages().contains(&TradeStage::SwitchingNetwork));
        assert_eq!(h.switcher.switch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_switch_is_network_mismatch() {
        let h = Harness::new();
        let switcher = Arc::new(MockChainSwitcher::new(1));
        switcher.set_switch_fails(true);
        let h = Harness { switcher, ..h };
        let pipeline = h.pipeline();

        let err = pipeline.place_order(buy_params()).await.unwrap_err();
        assert!(matches!(
            err,
            TradeError::NetworkMismatch {
                required: 137,
                actual: 1
            }
        ));
        assert!(h.observer.stages().contains(&TradeStage::Error));
    }

    #[tokio::test]
    async fn test_insufficient_funds_before_any_prompt() {
        let h = Harness::new();
        // 10 USDC against a $25 order.
        h.chain.set_erc20_balance(U256::from(10_000_000u64));
        let pipeline = h.pipeline();

        let err = pipeline.place_order(buy_params()).await.unwrap_err();
        assert!(matches!(err, TradeError::InsufficientFunds(_)));
        // Failed before the wallet was ever prompted.
        assert_eq!(h.signer.sign_count(), 0);
    }

    #[tokio::test]
    async fn test_order_too_small_fails_before_side_effects() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        let mut params = buy_params();
        params.amount = Usd::new(dec!(1));
        params.price = Price::new(dec!(0.5));

        let err = pipeline.place_order(params).await.unwrap_err();
        assert!(matches!(err, TradeError::OrderTooSmall { .. }));
        assert_eq!(h.relayer.deploy_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.clob.post_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_order_is_rejected_while_first_pends() {
        let h = Harness::new();
        let gate = Arc::new(tokio::sync::Notify::new());
        let switcher = Arc::new(MockChainSwitcher::gated(1, gate.clone()));
        let h = Harness { switcher, ..h };
        let pipeline = h.pipeline();

        let first = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.place_order(buy_params()).await })
        };
        // Let the first trade park inside the network switch.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = pipeline.place_order(buy_params()).await;
        assert!(matches!(second, Err(TradeError::Busy)));

        gate.notify_one();
        let first = first.await.unwrap();
        assert!(first.is_ok());
    }

    #[tokio::test]
    async fn test_user_rejection_is_cancellation() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        // First prompt is the credential attestation.
        h.signer.reject_next();

        let err = pipeline.place_order(buy_params()).await.unwrap_err();
        assert!(err.is_user_cancel());
        assert_eq!(h.clob.post_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_credentials_invalidate_cache() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        pipeline.place_order(buy_params()).await.unwrap();

        // Exchange now refuses the cached credentials.
        h.clob.set_submit_outcome(SubmitOutcome::Refused {
            status: 401,
            body: String::new(),
        });
        let pipeline = h.pipeline();
        let err = pipeline.place_order(buy_params()).await.unwrap_err();
        assert!(matches!(err, TradeError::CredentialsExpired));

        // The cache was dropped, so the next attempt re-links (and
        // re-prompts) instead of replaying the dead credentials.
        let creds = CredentialStore::new(h.store.clone());
        assert!(creds
            .get(OWNER, pmx_auth::CredContext::SmartWallet)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stage_resets_to_idle_after_display_delay() {
        let h = Harness::new();
        let pipeline = h.pipeline();

        pipeline.place_order(buy_params()).await.unwrap();
        assert_eq!(pipeline.current_stage(), TradeStage::Completed);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pipeline.current_stage(), TradeStage::Idle);
        assert_eq!(h.observer.stages().last(), Some(&TradeStage::Idle));
    }

    #[tokio::test]
    async fn test_error_stage_also_resets_to_idle() {
        let h = Harness::new();
        h.chain.set_erc20_balance(U256::ZERO);
        let pipeline = h.pipeline();

        let _ = pipeline.place_order(buy_params()).await;
        assert_eq!(pipeline.current_stage(), TradeStage::Error);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pipeline.current_stage(), TradeStage::Idle);
    }

    #[tokio::test]
    async fn test_no_liquidity_surfaces_with_raw_preserved() {
        let h = Harness::new();
        h.clob
            .set_submit_outcome(SubmitOutcome::Accepted(PostOrderResponse {
                success: false,
                order_id: None,
                status: None,
                error_msg: Some("no match".to_string()),
                making_amount: None,
                taking_amount: None,
            }));
        let pipeline = h.pipeline();
        let mut params = buy_params();
        params.is_market_order = true;

        let err = pipeline.place_order(params).await.unwrap_err();
        assert!(matches!(err, TradeError::NoLiquidity));
    }
}
