//! Relayer service client.
//!
//! The relayer executes gasless meta-transactions on behalf of the user:
//! proxy wallet deployment and batched token approvals. The pipeline only
//! depends on the [`Relayer`] trait; [`RelayerClient`] is the HTTP
//! implementation.

use crate::error::{ProvisionError, ProvisionResult};
use alloy::primitives::Address;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Default timeout for relayer requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receipt for a relayer-assisted deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployReceipt {
    /// Address of the deployed proxy wallet.
    #[serde(rename = "proxyAddress")]
    pub proxy_address: Address,
    /// Transaction hash of the deployment.
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
}

/// Receipt for a relayer-assisted approval batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowanceReceipt {
    #[serde(rename = "transactionHash")]
    pub transaction_hash: String,
}

/// Relayer operations the provisioner depends on.
pub trait Relayer: Send + Sync {
    /// Whether the proxy wallet at `address` is deployed.
    fn get_deployed(&self, address: Address) -> BoxFuture<'_, ProvisionResult<bool>>;

    /// Deploy the proxy wallet for `owner`. Resolves once the relayer
    /// reports completion.
    fn deploy(&self, owner: Address) -> BoxFuture<'_, ProvisionResult<DeployReceipt>>;

    /// Submit batched approvals from `wallet` to every spender. Granting is
    /// repeat-safe, so callers may invoke this more than once.
    fn set_allowances(
        &self,
        wallet: Address,
        spenders: Vec<Address>,
    ) -> BoxFuture<'_, ProvisionResult<AllowanceReceipt>>;
}

/// Shared handle to a `Relayer` trait object.
pub type DynRelayer = Arc<dyn Relayer>;

#[derive(Debug, Serialize)]
struct DeployRequest {
    owner: Address,
}

#[derive(Debug, Serialize)]
struct AllowanceRequest {
    wallet: Address,
    spenders: Vec<Address>,
}

#[derive(Debug, Deserialize)]
struct DeployedResponse {
    deployed: bool,
}

/// HTTP client for the relayer service.
pub struct RelayerClient {
    client: Client,
    base_url: String,
}

impl RelayerClient {
    /// Create a client for the relayer at `base_url`.
    pub fn new(base_url: impl Into<String>) -> ProvisionResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProvisionError::RelayerUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn read_failure(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        format!("HTTP {status}: {body}")
    }
}

impl Relayer for RelayerClient {
    fn get_deployed(&self, address: Address) -> BoxFuture<'_, ProvisionResult<bool>> {
        Box::pin(async move {
            debug!(%address, "querying relayer for deployment status");
            let url = format!("{}/deployed/{address}", self.base_url);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ProvisionError::RelayerUnavailable(e.to_string()))?;

            if !response.status().is_success() {
                return Err(ProvisionError::RelayerUnavailable(
                    Self::read_failure(response).await,
                ));
            }

            let body: DeployedResponse = response
                .json()
                .await
                .map_err(|e| ProvisionError::RelayerUnavailable(e.to_string()))?;
            Ok(body.deployed)
        })
    }

    fn deploy(&self, owner: Address) -> BoxFuture<'_, ProvisionResult<DeployReceipt>> {
        Box::pin(async move {
            info!(%owner, "requesting relayer-assisted wallet deployment");
            let url = format!("{}/deploy", self.base_url);
            let response = self
                .client
                .post(&url)
                .json(&DeployRequest { owner })
                .send()
                .await
                .map_err(|e| ProvisionError::DeploymentFailed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(ProvisionError::DeploymentFailed(
                    Self::read_failure(response).await,
                ));
            }

            let receipt: DeployReceipt = response
                .json()
                .await
                .map_err(|e| ProvisionError::DeploymentFailed(e.to_string()))?;
            info!(proxy = %receipt.proxy_address, tx = %receipt.transaction_hash, "wallet deployed");
            Ok(receipt)
        })
    }

    fn set_allowances(
        &self,
        wallet: Address,
        spenders: Vec<Address>,
    ) -> BoxFuture<'_, ProvisionResult<AllowanceReceipt>> {
        Box::pin(async move {
            info!(%wallet, spender_count = spenders.len(), "submitting batched approvals");
            let url = format!("{}/allowances", self.base_url);
            let response = self
                .client
                .post(&url)
                .json(&AllowanceRequest { wallet, spenders })
                .send()
                .await
                .map_err(|e| ProvisionError::AllowanceFailed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(ProvisionError::AllowanceFailed(
                    Self::read_failure(response).await,
                ));
            }

            let receipt: AllowanceReceipt = response
                .json()
                .await
                .map_err(|e| ProvisionError::AllowanceFailed(e.to_string()))?;
            Ok(receipt)
        })
    }
}

/// Scripted relayer for tests, recording call counts.
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct MockRelayer {
        pub deployed: Mutex<bool>,
        pub deployed_check_fails: Mutex<bool>,
        pub deploy_fails: Mutex<bool>,
        pub allowance_fails: Mutex<bool>,
        pub deploy_calls: AtomicUsize,
        pub allowance_calls: AtomicUsize,
        pub proxy_address: Address,
    }

    impl MockRelayer {
        pub fn new(proxy_address: Address) -> Self {
            Self {
                deployed: Mutex::new(false),
                deployed_check_fails: Mutex::new(false),
                deploy_fails: Mutex::new(false),
                allowance_fails: Mutex::new(false),
                deploy_calls: AtomicUsize::new(0),
                allowance_calls: AtomicUsize::new(0),
                proxy_address,
            }
        }
    }

    impl Relayer for MockRelayer {
        fn get_deployed(&self, _address: Address) -> BoxFuture<'_, ProvisionResult<bool>> {
            Box::pin(async move {
                if *self.deployed_check_fails.lock() {
                    return Err(ProvisionError::RelayerUnavailable("mock outage".into()));
                }
                Ok(*self.deployed.lock())
            })
        }

        fn deploy(&self, _owner: Address) -> BoxFuture<'_, ProvisionResult<DeployReceipt>> {
            Box::pin(async move {
                self.deploy_calls.fetch_add(1, Ordering::SeqCst);
                if *self.deploy_fails.lock() {
                    return Err(ProvisionError::DeploymentFailed("mock failure".into()));
                }
                *self.deployed.lock() = true;
                Ok(DeployReceipt {
                    proxy_address: self.proxy_address,
                    transaction_hash: "0xdeploy".to_string(),
                })
            })
        }

        fn set_allowances(
            &self,
            _wallet: Address,
            _spenders: Vec<Address>,
        ) -> BoxFuture<'_, ProvisionResult<AllowanceReceipt>> {
            Box::pin(async move {
                self.allowance_calls.fetch_add(1, Ordering::SeqCst);
                if *self.allowance_fails.lock() {
                    return Err(ProvisionError::AllowanceFailed("mock failure".into()));
                }
                Ok(AllowanceReceipt {
                    transaction_hash: "0xallow".to_string(),
                })
            })
        }
    }
}
