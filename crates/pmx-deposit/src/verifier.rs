//! Deposit verification orchestration.
//!
//! Two paths to the same terminal state: quick transfer (the client signs
//! and submits the transfer, then polls verification) and manual send (the
//! client shows a deposit address and watches the indexer for a bounded
//! window before falling back to manual signature entry). Verification is
//! success-latched per transaction signature: after an observed success the
//! backend is never asked again.

use crate::backend::{BackendVerify, DynDepositBackend};
use crate::error::{DepositError, DepositResult};
use crate::session::{DepositSession, DepositStage};
use alloy::primitives::Address;
use pmx_signer::{TransferRequest, WalletSigner};
use pmx_telemetry::metrics;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Deposit flow tuning.
///
/// The auto-detection budget is a product decision; defaults give a 120s
/// watch window (24 polls, 5s apart).
#[derive(Debug, Clone, Copy)]
pub struct DepositConfig {
    /// Maximum indexer polls before falling back to manual entry.
    pub find_attempts: u32,
    /// Delay between polls.
    pub find_interval: Duration,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            find_attempts: 24,
            find_interval: Duration::from_secs(5),
        }
    }
}

/// Observer for deposit stage transitions.
pub trait DepositObserver: Send + Sync {
    fn stage_changed(&self, stage: DepositStage, message: &str);
}

/// Observer that ignores every transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDepositObserver;

impl DepositObserver for NullDepositObserver {
    fn stage_changed(&self, _stage: DepositStage, _message: &str) {}
}

/// Non-failure verification outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    /// The ledger credited the deposit.
    Credited(u64),
    /// Not confirmed yet; safe to retry later.
    Pending,
}

/// Drives a deposit session to credit.
pub struct DepositVerifier {
    backend: DynDepositBackend,
    config: DepositConfig,
    observer: Arc<dyn DepositObserver>,
    /// Signatures the ledger confirmed, with their credited amounts.
    credited: parking_lot::Mutex<HashMap<String, u64>>,
    /// Reentrancy guard for the detection poll.
    detecting: AtomicBool,
}

impl DepositVerifier {
    pub fn new(backend: DynDepositBackend, config: DepositConfig) -> Self {
        Self::with_observer(backend, config, Arc::new(NullDepositObserver))
    }

    pub fn with_observer(
        backend: DynDepositBackend,
        config: DepositConfig,
        observer: Arc<dyn DepositObserver>,
    ) -> Self {
        Self {
            backend,
            config,
            observer,
            credited: parking_lot::Mutex::new(HashMap::new()),
            detecting: AtomicBool::new(false),
        }
    }

    /// Open a session: fetch the wallet's deposit routing and validate the
    /// amount.
    pub async fn start_session(
        &self,
        wallet: &str,
        amount: Decimal,
    ) -> DepositResult<DepositSession> {
        let info = self.backend.get_deposit_address(wallet.to_string()).await?;
        let mut session = DepositSession::new(
            wallet,
            info.deposit_address,
            info.token_mint,
            info.credits_per_token,
            amount,
        )?;
        self.set_stage(&mut session, DepositStage::MethodSelect);
        Ok(session)
    }

    /// Quick-transfer path: sign and submit the transfer, then poll
    /// verification until credited, failed, or the attempt budget runs out
    /// (in which case the deposit is still pending, not failed).
    pub async fn quick_transfer(
        &self,
        session: &mut DepositSession,
        signer: &dyn WalletSigner,
        cancel: &CancellationToken,
    ) -> DepositResult<VerifyStatus> {
        self.set_stage(session, DepositStage::QuickTransfer);

        let token = Address::from_str(&session.token_mint)
            .map_err(|_| DepositError::Transfer(format!("bad token mint {}", session.token_mint)))?;
        let to = Address::from_str(&session.deposit_address).map_err(|_| {
            DepositError::Transfer(format!("bad deposit address {}", session.deposit_address))
        })?;
        let amount_base_units = (session.amount * Decimal::from(1_000_000u64))
            .trunc()
            .to_u128()
            .ok_or_else(|| DepositError::InvalidAmount(session.amount.to_string()))?;

        let tx_signature = match signer
            .send_transfer(TransferRequest {
                token,
                to,
                amount_base_units,
            })
            .await
        {
            Ok(tx) => tx,
            Err(err) => {
                let err: DepositError = err.into();
                if !matches!(err, DepositError::UserRejected) {
                    self.set_stage(session, DepositStage::Error);
                }
                return Err(err);
            }
        };
        info!(%tx_signature, "transfer submitted, awaiting confirmation");
        session.tx_signature = Some(tx_signature.clone());

        for _ in 0..self.config.find_attempts {
            match self.verify_signature(session, &tx_signature).await? {
                VerifyStatus::Credited(credits) => return Ok(VerifyStatus::Credited(credits)),
                VerifyStatus::Pending => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(DepositError::Cancelled),
                        _ = tokio::time::sleep(self.config.find_interval) => {}
                    }
                }
            }
        }

        // Still unconfirmed; the signature is known, so the caller can
        // verify again later without resending funds.
        debug!("verification window exhausted with deposit still pending");
        Ok(VerifyStatus::Pending)
    }

    /// Manual-send path: watch the indexer for the incoming transfer.
    ///
    /// Returns the found transaction signature, or `None` when the window
    /// closes, at which point the caller falls back to manual signature
    /// entry. Only
    /// one detection poll may run at a time, and cancellation tears the
    /// loop down immediately.
    pub async fn auto_detect(
        &self,
        session: &mut DepositSession,
        cancel: &CancellationToken,
    ) -> DepositResult<Option<String>> {
        if self
            .detecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DepositError::DetectionBusy);
        }
        let result = self.detect_loop(session, cancel).await;
        self.detecting.store(false, Ordering::SeqCst);
        result
    }

    async fn detect_loop(
        &self,
        session: &mut DepositSession,
        cancel: &CancellationToken,
    ) -> DepositResult<Option<String>> {
        self.set_stage(session, DepositStage::Detecting);

        for attempt in 1..=self.config.find_attempts {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(attempt, "deposit detection cancelled");
                    self.set_stage(session, DepositStage::ManualSend);
                    return Err(DepositError::Cancelled);
                }
                _ = tokio::time::sleep(self.config.find_interval) => {}
            }

            if let Some(signature) = self
                .backend
                .find_deposit(session.wallet_address.clone())
                .await?
            {
                info!(%signature, attempt, "deposit found on indexer");
                session.tx_signature = Some(signature.clone());
                return Ok(Some(signature));
            }
        }

        debug!("deposit not found within detection window");
        self.set_stage(session, DepositStage::ManualSend);
        Ok(None)
    }

    /// Verify a known transaction signature.
    ///
    /// `Pending` is retryable-later; failure is terminal for the signature.
    /// A signature that already verified successfully is answered from the
    /// latch without another backend call.
    pub async fn verify_signature(
        &self,
        session: &mut DepositSession,
        signature: &str,
    ) -> DepositResult<VerifyStatus> {
        if let Some(&credits) = self.credited.lock().get(signature) {
            self.set_stage(session, DepositStage::Success);
            return Ok(VerifyStatus::Credited(credits));
        }

        self.set_stage(session, DepositStage::Verifying);
        session.tx_signature = Some(signature.to_string());

        match self
            .backend
            .verify_deposit(session.wallet_address.clone(), signature.to_string())
            .await?
        {
            BackendVerify::Credited { credits } => {
                self.credited.lock().insert(signature.to_string(), credits);
                metrics::DEPOSITS_VERIFIED_TOTAL
                    .with_label_values(&["credited"])
                    .inc();
                self.set_stage(session, DepositStage::Success);
                Ok(VerifyStatus::Credited(credits))
            }
            BackendVerify::Pending => {
                metrics::DEPOSITS_VERIFIED_TOTAL
                    .with_label_values(&["pending"])
                    .inc();
                Ok(VerifyStatus::Pending)
            }
            BackendVerify::Failed { reason } => {
                warn!(%signature, %reason, "deposit verification failed");
                metrics::DEPOSITS_VERIFIED_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                self.set_stage(session, DepositStage::Error);
                Err(DepositError::VerificationFailed(reason))
            }
        }
    }

    fn set_stage(&self, session: &mut DepositSession, stage: DepositStage) {
        session.stage = stage;
        self.observer.stage_changed(stage, stage.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockDepositBackend;
    use pmx_signer::MockSigner;
    use rust_decimal_macros::dec;

    fn test_config() -> DepositConfig {
        DepositConfig {
            find_attempts: 3,
            find_interval: Duration::from_millis(2),
        }
    }

    struct Harness {
        backend: Arc<MockDepositBackend>,
        signer: MockSigner,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                backend: Arc::new(MockDepositBackend::new()),
                signer: MockSigner::new(Address::repeat_byte(0xaa)),
            }
        }

        fn verifier(&self) -> DepositVerifier {
            DepositVerifier::new(self.backend.clone(), test_config())
        }

        async fn session(&self, verifier: &DepositVerifier) -> DepositSession {
            let mut session = verifier.start_session("0xwallet", dec!(10)).await.unwrap();
            // Quick transfer needs a parseable EVM deposit address.
            session.deposit_address = format!("{:#x}", Address::repeat_byte(0x99));
            session
        }
    }

    #[tokio::test]
    async fn test_quick_transfer_credits() {
        let h = Harness::new();
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let status = verifier
            .quick_transfer(&mut session, &h.signer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status, VerifyStatus::Credited(1000));
        assert_eq!(session.stage, DepositStage::Success);
        assert!(session.tx_signature.is_some());

        // 10 tokens at 6 decimals.
        let transfers = h.signer.transfer_requests();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount_base_units, 10_000_000);
    }

    #[tokio::test]
    async fn test_quick_transfer_pending_is_not_an_error() {
        let h = Harness::new();
        *h.backend.verify_results.lock() = vec![BackendVerify::Pending];
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let status = verifier
            .quick_transfer(&mut session, &h.signer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status, VerifyStatus::Pending);
        // Not an error state: the signature is known and retryable.
        assert_eq!(session.stage, DepositStage::Verifying);
    }

    #[tokio::test]
    async fn test_quick_transfer_pending_then_credited() {
        let h = Harness::new();
        *h.backend.verify_results.lock() = vec![
            BackendVerify::Pending,
            BackendVerify::Pending,
            BackendVerify::Credited { credits: 1000 },
        ];
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let status = verifier
            .quick_transfer(&mut session, &h.signer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status, VerifyStatus::Credited(1000));
    }

    #[tokio::test]
    async fn test_rejected_transfer_skips_verification() {
        let h = Harness::new();
        h.signer.set_transfer_result(Err(pmx_signer::SignerError::UserRejected));
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let err = verifier
            .quick_transfer(&mut session, &h.signer, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, DepositError::UserRejected));
        assert_eq!(
            h.backend
                .verify_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_verify_is_success_latched() {
        let h = Harness::new();
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let first = verifier
            .verify_signature(&mut session, "0xsig")
            .await
            .unwrap();
        assert_eq!(first, VerifyStatus::Credited(1000));

        // Second verification of the same signature never reaches the
        // backend.
        let second = verifier
            .verify_signature(&mut session, "0xsig")
            .await
            .unwrap();
        assert_eq!(second, VerifyStatus::Credited(1000));
        assert_eq!(
            h.backend
                .verify_calls
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_verify_failure_is_terminal() {
        let h = Harness::new();
        *h.backend.verify_results.lock() = vec![BackendVerify::Failed {
            reason: "wrong token".to_string(),
        }];
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let err = verifier
            .verify_signature(&mut session, "0xsig")
            .await
            .unwrap_err();
        assert!(matches!(err, DepositError::VerificationFailed(_)));
        assert_eq!(session.stage, DepositStage::Error);
    }

    #[tokio::test]
    async fn test_auto_detect_finds_deposit() {
        let h = Harness::new();
        *h.backend.find_results.lock() = vec![None, Some("0xfound".to_string())];
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let found = verifier
            .auto_detect(&mut session, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(found.as_deref(), Some("0xfound"));
        assert_eq!(session.tx_signature.as_deref(), Some("0xfound"));
        assert_eq!(
            h.backend.find_calls.load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }

    #[tokio::test]
    async fn test_auto_detect_window_exhausts_to_manual_entry() {
        let h = Harness::new();
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let found = verifier
            .auto_detect(&mut session, &CancellationToken::new())
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(session.stage, DepositStage::ManualSend);
        // Hard ceiling: exactly the configured attempt count.
        assert_eq!(
            h.backend.find_calls.load(std::sync::atomic::Ordering::SeqCst),
            3
        );
    }

    #[tokio::test]
    async fn test_auto_detect_cancellation() {
        let h = Harness::new();
        let verifier = h.verifier();
        let mut session = h.session(&verifier).await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = verifier.auto_detect(&mut session, &cancel).await.unwrap_err();
        assert!(matches!(err, DepositError::Cancelled));
        // Cancelled before the first poll fired.
        assert_eq!(
            h.backend.find_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
        assert_eq!(session.stage, DepositStage::ManualSend);
    }

    #[tokio::test]
    async fn test_detection_reentrancy_guard() {
        let h = Harness::new();
        let verifier = Arc::new(DepositVerifier::new(
            h.backend.clone(),
            DepositConfig {
                find_attempts: 10,
                find_interval: Duration::from_millis(20),
            },
        ));
        let mut session = h.session(verifier.as_ref()).await;
        let mut second_session = session.clone();

        let cancel = CancellationToken::new();
        let first = {
            let verifier = verifier.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { verifier.auto_detect(&mut session, &cancel).await })
        };

        // Give the first poll time to claim the guard.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = verifier
            .auto_detect(&mut second_session, &CancellationToken::new())
            .await;
        assert!(matches!(second, Err(DepositError::DetectionBusy)));

        cancel.cancel();
        let _ = first.await.unwrap();
    }

    #[tokio::test]
    async fn test_start_session_rejects_bad_amount() {
        let h = Harness::new();
        let verifier = h.verifier();
        assert!(verifier.start_session("0xwallet", dec!(0)).await.is_err());
    }
}
