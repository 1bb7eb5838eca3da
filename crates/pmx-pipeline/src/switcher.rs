//! Active-chain control.
//!
//! The wallet owns the active chain; the pipeline only asks for it and
//! requests a switch when it differs from the trading chain.

use pmx_core::TradeError;
use pmx_signer::BoxFuture;
use std::sync::Arc;

/// Host-provided view of, and control over, the wallet's active chain.
pub trait ChainSwitcher: Send + Sync {
    /// Chain the wallet is currently on.
    fn active_chain(&self) -> u64;

    /// Ask the wallet to switch to `chain_id`.
    fn switch_to(&self, chain_id: u64) -> BoxFuture<'_, Result<(), TradeError>>;
}

/// Shared handle to a `ChainSwitcher` trait object.
pub type DynChainSwitcher = Arc<dyn ChainSwitcher>;

/// Switcher for hosts that are always on the trading chain.
#[derive(Debug, Clone, Copy)]
pub struct FixedChain(pub u64);

impl ChainSwitcher for FixedChain {
    fn active_chain(&self) -> u64 {
        self.0
    }

    fn switch_to(&self, chain_id: u64) -> BoxFuture<'_, Result<(), TradeError>> {
        let active = self.0;
        Box::pin(async move {
            if chain_id == active {
                Ok(())
            } else {
                Err(TradeError::NetworkMismatch {
                    required: chain_id,
                    actual: active,
                })
            }
        })
    }
}

/// Scripted `ChainSwitcher` for tests.
pub struct MockChainSwitcher {
    active: parking_lot::Mutex<u64>,
    switch_fails: parking_lot::Mutex<bool>,
    /// When set, `switch_to` parks until released.
    gate: Option<Arc<tokio::sync::Notify>>,
    pub switch_calls: std::sync::atomic::AtomicUsize,
}

impl MockChainSwitcher {
    pub fn new(active: u64) -> Self {
        Self {
            active: parking_lot::Mutex::new(active),
            switch_fails: parking_lot::Mutex::new(false),
            gate: None,
            switch_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn gated(active: u64, gate: Arc<tokio::sync::Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(active)
        }
    }

    pub fn set_switch_fails(&self, fails: bool) {
        *self.switch_fails.lock() = fails;
    }
}

impl ChainSwitcher for MockChainSwitcher {
    fn active_chain(&self) -> u64 {
        *self.active.lock()
    }

    fn switch_to(&self, chain_id: u64) -> BoxFuture<'_, Result<(), TradeError>> {
        Box::pin(async move {
            self.switch_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if *self.switch_fails.lock() {
                return Err(TradeError::NetworkMismatch {
                    required: chain_id,
                    actual: *self.active.lock(),
                });
            }
            *self.active.lock() = chain_id;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_chain_switch() {
        let fixed = FixedChain(137);
        assert!(fixed.switch_to(137).await.is_ok());
        assert!(matches!(
            fixed.switch_to(1).await,
            Err(TradeError::NetworkMismatch {
                required: 1,
                actual: 137
            })
        ));
    }

    #[tokio::test]
    async fn test_mock_switcher_updates_active_chain() {
        let switcher = MockChainSwitcher::new(1);
        switcher.switch_to(137).await.unwrap();
        assert_eq!(switcher.active_chain(), 137);
    }
}
