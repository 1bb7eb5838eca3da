//! Smart-wallet provisioning state machine.
//!
//! Tracks, per owning signer: the derived wallet address, whether the proxy
//! contract is deployed, and whether the exchange spenders hold allowances.
//! Deployment is irreversible, so a `true` result is cached process-wide and
//! persisted; `false` is re-checked every time. All operations are
//! idempotent and never roll state back on failure; the caller re-attempts
//! the specific failed step.

use crate::chain::DynChainReader;
use crate::derive::{derive_wallet_address, FactoryParams};
use crate::error::{ProvisionError, ProvisionResult};
use crate::relayer::DynRelayer;
use alloy::primitives::Address;
use dashmap::DashMap;
use pmx_store::{get_json, put_json, SessionStore, StoreKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store namespace for provisioning facts.
const STORE_NAMESPACE: &str = "safe-wallet";

/// Spender contracts that need collateral and conditional-token approvals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSpenders {
    /// Base CLOB exchange contract.
    pub exchange: Address,
    /// Negative-risk CLOB exchange contract.
    pub neg_risk_exchange: Address,
    /// Negative-risk settlement adapter.
    pub neg_risk_adapter: Address,
}

impl ExchangeSpenders {
    pub fn to_vec(&self) -> Vec<Address> {
        vec![self.exchange, self.neg_risk_exchange, self.neg_risk_adapter]
    }
}

/// Deployment/allowance status of a derived wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartWalletState {
    /// Deterministic wallet address; pure function of the owner.
    pub address: Address,
    /// Whether the proxy contract exists on chain. Monotonic once true.
    pub is_deployed: bool,
    /// Whether the exchange spenders hold allowances.
    pub has_allowances: bool,
}

/// Persisted provisioning record, keyed by wallet address.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct SafeRecord {
    deployed: bool,
    allowances: bool,
}

/// Provisions the smart-contract wallet for an owning signer.
pub struct SafeProvisioner {
    factory: FactoryParams,
    spenders: ExchangeSpenders,
    relayer: DynRelayer,
    chain: DynChainReader,
    store: Arc<dyn SessionStore>,
    /// owner -> derived wallet; derivation is pure but cached anyway.
    derived: DashMap<Address, Address>,
    /// wallet -> deployed; only ever inserted as true.
    deployed: DashMap<Address, ()>,
    /// wallet -> allowances set; only ever inserted as true.
    allowances: DashMap<Address, ()>,
}

impl SafeProvisioner {
    pub fn new(
        factory: FactoryParams,
        spenders: ExchangeSpenders,
        relayer: DynRelayer,
        chain: DynChainReader,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            factory,
            spenders,
            relayer,
            chain,
            store,
            derived: DashMap::new(),
            deployed: DashMap::new(),
            allowances: DashMap::new(),
        }
    }

    /// The deterministic smart-wallet address for `owner`.
    pub fn wallet_address(&self, owner: Address) -> Address {
        *self
            .derived
            .entry(owner)
            .or_insert_with(|| derive_wallet_address(&self.factory, owner))
    }

    /// Current provisioning state for `owner`.
    pub async fn state(&self, owner: Address) -> ProvisionResult<SmartWalletState> {
        let address = self.wallet_address(owner);
        let is_deployed = self.check_deployment(address).await?;
        let has_allowances = is_deployed && self.check_allowances(address)?;
        Ok(SmartWalletState {
            address,
            is_deployed,
            has_allowances,
        })
    }

    /// Whether the wallet contract is deployed.
    ///
    /// Asks the relayer first and falls back to a bytecode check when the
    /// relayer is unreachable. A `true` answer is cached and persisted.
    pub async fn check_deployment(&self, wallet: Address) -> ProvisionResult<bool> {
        if self.deployed.contains_key(&wallet) {
            return Ok(true);
        }
        if self.load_record(wallet)?.deployed {
            self.deployed.insert(wallet, ());
            return Ok(true);
        }

        let deployed = match self.relayer.get_deployed(wallet).await {
            Ok(deployed) => deployed,
            Err(err) => {
                warn!(%wallet, %err, "relayer deployment check failed, falling back to bytecode");
                !self.chain.get_code(wallet).await?.is_empty()
            }
        };

        if deployed {
            self.mark_deployed(wallet)?;
        }
        Ok(deployed)
    }

    /// Deploy the wallet for `owner` through the relayer.
    ///
    /// Short-circuits successfully when already deployed, so re-invoking
    /// after a partial failure is always safe.
    pub async fn deploy(&self, owner: Address) -> ProvisionResult<SmartWalletState> {
        let wallet = self.wallet_address(owner);

        if self.check_deployment(wallet).await? {
            debug!(%wallet, "wallet already deployed, skipping");
            return self.state(owner).await;
        }

        let receipt = self.relayer.deploy(owner).await?;
        if receipt.proxy_address != wallet {
            // The relayer and this client disagree on the derivation inputs.
            return Err(ProvisionError::DeploymentFailed(format!(
                "relayer deployed {} but derived address is {wallet}",
                receipt.proxy_address
            )));
        }

        self.mark_deployed(wallet)?;
        info!(%wallet, owner = %owner, "smart wallet deployed");
        self.state(owner).await
    }

    /// Grant the exchange spenders their allowances from the wallet.
    ///
    /// Requires a deployed wallet. Repeat-safe: approvals grant rather than
    /// transfer, so double invocation carries no spend risk.
    pub async fn set_allowances(&self, owner: Address) -> ProvisionResult<SmartWalletState> {
        let wallet = self.wallet_address(owner);

        if !self.check_deployment(wallet).await? {
            return Err(ProvisionError::NotDeployed);
        }

        self.relayer
            .set_allowances(wallet, self.spenders.to_vec())
            .await?;

        self.allowances.insert(wallet, ());
        let mut record = self.load_record(wallet)?;
        record.deployed = true;
        record.allowances = true;
        self.save_record(wallet, record)?;

        info!(%wallet, "exchange allowances set");
        self.state(owner).await
    }

    fn check_allowances(&self, wallet: Address) -> ProvisionResult<bool> {
        if self.allowances.contains_key(&wallet) {
            return Ok(true);
        }
        let record = self.load_record(wallet)?;
        if record.allowances {
            self.allowances.insert(wallet, ());
        }
        Ok(record.allowances)
    }

    fn mark_deployed(&self, wallet: Address) -> ProvisionResult<()> {
        self.deployed.insert(wallet, ());
        let mut record = self.load_record(wallet)?;
        record.deployed = true;
        self.save_record(wallet, record)
    }

    fn record_key(wallet: Address) -> StoreKey {
        StoreKey::new(STORE_NAMESPACE, wallet.to_string())
    }

    fn load_record(&self, wallet: Address) -> ProvisionResult<SafeRecord> {
        // Provisioning facts don't expire; read regardless of age.
        Ok(get_json::<SafeRecord>(self.store.as_ref(), &Self::record_key(wallet))?
            .map(|stored| stored.value)
            .unwrap_or_default())
    }

    fn save_record(&self, wallet: Address, record: SafeRecord) -> ProvisionResult<()> {
        put_json(self.store.as_ref(), &Self::record_key(wallet), &record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainReader;
    use crate::relayer::mock::MockRelayer;
    use alloy::primitives::B256;
    use pmx_store::MemoryStore;
    use std::sync::atomic::Ordering;

    fn factory() -> FactoryParams {
        FactoryParams {
            factory: Address::repeat_byte(0xfa),
            init_code_hash: B256::repeat_byte(0x1c),
        }
    }

    fn spenders() -> ExchangeSpenders {
        ExchangeSpenders {
            exchange: Address::repeat_byte(0x01),
            neg_risk_exchange: Address::repeat_byte(0x02),
            neg_risk_adapter: Address::repeat_byte(0x03),
        }
    }

    struct Harness {
        relayer: Arc<MockRelayer>,
        chain: Arc<MockChainReader>,
        store: Arc<MemoryStore>,
        owner: Address,
    }

    impl Harness {
        fn new() -> Self {
            let owner = Address::repeat_byte(0xaa);
            let wallet = derive_wallet_address(&factory(), owner);
            Self {
                relayer: Arc::new(MockRelayer::new(wallet)),
                chain: Arc::new(MockChainReader::new()),
                store: Arc::new(MemoryStore::new()),
                owner,
            }
        }

        fn provisioner(&self) -> SafeProvisioner {
            SafeProvisioner::new(
                factory(),
                spenders(),
                self.relayer.clone(),
                self.chain.clone(),
                self.store.clone(),
            )
        }
    }

    #[test]
    fn test_wallet_address_is_stable() {
        let h = Harness::new();
        let p = h.provisioner();
        assert_eq!(p.wallet_address(h.owner), p.wallet_address(h.owner));
    }

    #[tokio::test]
    async fn test_deploy_then_redeploy_short_circuits() {
        let h = Harness::new();
        let p = h.provisioner();

        let state = p.deploy(h.owner).await.unwrap();
        assert!(state.is_deployed);
        assert_eq!(h.relayer.deploy_calls.load(Ordering::SeqCst), 1);

        // Second invocation succeeds without another relayer transaction.
        let state = p.deploy(h.owner).await.unwrap();
        assert!(state.is_deployed);
        assert_eq!(h.relayer.deploy_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deployed_flag_survives_new_session() {
        let h = Harness::new();
        h.provisioner().deploy(h.owner).await.unwrap();

        // Fresh provisioner over the same store, with the relayer down:
        // the persisted flag answers the check.
        *h.relayer.deployed_check_fails.lock() = true;
        let p = h.provisioner();
        let wallet = p.wallet_address(h.owner);
        assert!(p.check_deployment(wallet).await.unwrap());
    }

    #[tokio::test]
    async fn test_bytecode_fallback_when_relayer_down() {
        let h = Harness::new();
        *h.relayer.deployed_check_fails.lock() = true;
        h.chain.set_code(vec![0x60, 0x80]);

        let p = h.provisioner();
        let wallet = p.wallet_address(h.owner);
        assert!(p.check_deployment(wallet).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_deployed_when_relayer_down_and_no_code() {
        let h = Harness::new();
        *h.relayer.deployed_check_fails.lock() = true;

        let p = h.provisioner();
        let wallet = p.wallet_address(h.owner);
        assert!(!p.check_deployment(wallet).await.unwrap());
    }

    #[tokio::test]
    async fn test_allowances_require_deployment() {
        let h = Harness::new();
        let p = h.provisioner();

        let err = p.set_allowances(h.owner).await.unwrap_err();
        assert!(matches!(err, ProvisionError::NotDeployed));
    }

    #[tokio::test]
    async fn test_allowance_failure_is_retryable() {
        let h = Harness::new();
        let p = h.provisioner();
        p.deploy(h.owner).await.unwrap();

        *h.relayer.allowance_fails.lock() = true;
        let err = p.set_allowances(h.owner).await.unwrap_err();
        assert!(matches!(err, ProvisionError::AllowanceFailed(_)));
        assert!(!p.state(h.owner).await.unwrap().has_allowances);

        // Same entry point succeeds after the relayer recovers.
        *h.relayer.allowance_fails.lock() = false;
        let state = p.set_allowances(h.owner).await.unwrap();
        assert!(state.has_allowances);
        assert_eq!(h.relayer.allowance_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deploy_rejects_mismatched_proxy_address() {
        let h = Harness::new();
        let relayer = Arc::new(MockRelayer::new(Address::repeat_byte(0xee)));
        let p = SafeProvisioner::new(
            factory(),
            spenders(),
            relayer,
            h.chain.clone(),
            h.store.clone(),
        );

        let err = p.deploy(h.owner).await.unwrap_err();
        assert!(matches!(err, ProvisionError::DeploymentFailed(_)));
    }

    #[tokio::test]
    async fn test_state_composes_flags() {
        let h = Harness::new();
        let p = h.provisioner();

        let state = p.state(h.owner).await.unwrap();
        assert!(!state.is_deployed);
        assert!(!state.has_allowances);

        p.deploy(h.owner).await.unwrap();
        p.set_allowances(h.owner).await.unwrap();

        let state = p.state(h.owner).await.unwrap();
        assert!(state.is_deployed);
        assert!(state.has_allowances);
    }
}
