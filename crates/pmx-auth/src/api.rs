//! Exchange credential endpoints.
//!
//! Two operations, both authenticated by the wallet-control attestation
//! signature: deriving credentials the signer registered before, and
//! creating a fresh set.

use crate::error::{AuthError, AuthResult};
use alloy::primitives::Address;
use pmx_signer::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for auth requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// L1 (wallet-signature) auth header set.
#[derive(Debug, Clone)]
pub struct L1AuthHeaders {
    pub address: Address,
    /// Concatenated r||s||v signature hex.
    pub signature: String,
    /// Unix seconds, matching the signed payload.
    pub timestamp: String,
    pub nonce: u64,
}

/// Credential fields as returned by the exchange.
///
/// Derivation for a signer that never registered returns a partial or empty
/// body; `is_complete` gates the derive-then-create fallback.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawApiCreds {
    #[serde(default, alias = "apiKey")]
    pub key: Option<String>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
}

impl RawApiCreds {
    pub fn is_complete(&self) -> bool {
        let filled = |f: &Option<String>| f.as_deref().is_some_and(|s| !s.is_empty());
        filled(&self.key) && filled(&self.secret) && filled(&self.passphrase)
    }
}

/// Credential acquisition operations on the exchange.
pub trait ClobAuthApi: Send + Sync {
    /// Re-derive credentials previously registered for this signer.
    fn derive_api_key(&self, headers: L1AuthHeaders) -> BoxFuture<'_, AuthResult<RawApiCreds>>;

    /// Register a new credential set for this signer.
    fn create_api_key(&self, headers: L1AuthHeaders) -> BoxFuture<'_, AuthResult<RawApiCreds>>;
}

/// Shared handle to a `ClobAuthApi` trait object.
pub type DynClobAuthApi = Arc<dyn ClobAuthApi>;

/// HTTP implementation against the exchange REST API.
pub struct ClobAuthClient {
    client: Client,
    base_url: String,
}

impl ClobAuthClient {
    pub fn new(base_url: impl Into<String>) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AuthError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn apply_headers(
        request: reqwest::RequestBuilder,
        headers: &L1AuthHeaders,
    ) -> reqwest::RequestBuilder {
        request
            .header("POLY_ADDRESS", headers.address.to_string())
            .header("POLY_SIGNATURE", &headers.signature)
            .header("POLY_TIMESTAMP", &headers.timestamp)
            .header("POLY_NONCE", headers.nonce.to_string())
    }
}

impl ClobAuthApi for ClobAuthClient {
    fn derive_api_key(&self, headers: L1AuthHeaders) -> BoxFuture<'_, AuthResult<RawApiCreds>> {
        Box::pin(async move {
            debug!(address = %headers.address, "deriving exchange API credentials");
            let url = format!("{}/auth/derive-api-key", self.base_url);
            let response = Self::apply_headers(self.client.get(&url), &headers)
                .send()
                .await
                .map_err(|e| AuthError::HttpClient(e.to_string()))?;

            if !response.status().is_success() {
                // No registered credentials (or a transient refusal): report
                // an empty set and let the linker fall back to creation.
                debug!(status = %response.status(), "derivation returned non-success");
                return Ok(RawApiCreds::default());
            }

            response
                .json()
                .await
                .map_err(|e| AuthError::HttpClient(e.to_string()))
        })
    }

    fn create_api_key(&self, headers: L1AuthHeaders) -> BoxFuture<'_, AuthResult<RawApiCreds>> {
        Box::pin(async move {
            info!(address = %headers.address, "creating exchange API credentials");
            let url = format!("{}/auth/api-key", self.base_url);
            let response = Self::apply_headers(self.client.post(&url), &headers)
                .send()
                .await
                .map_err(|e| AuthError::HttpClient(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(AuthError::AcquisitionFailed(format!(
                    "HTTP {status}: {body}"
                )));
            }

            response
                .json()
                .await
                .map_err(|e| AuthError::HttpClient(e.to_string()))
        })
    }
}

/// Scripted `ClobAuthApi` for tests.
pub struct MockAuthApi {
    derive_result: parking_lot::Mutex<RawApiCreds>,
    create_result: parking_lot::Mutex<AuthResult<RawApiCreds>>,
    pub derive_calls: std::sync::atomic::AtomicUsize,
    pub create_calls: std::sync::atomic::AtomicUsize,
}

impl Default for MockAuthApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthApi {
    pub fn new() -> Self {
        Self {
            derive_result: parking_lot::Mutex::new(RawApiCreds::default()),
            create_result: parking_lot::Mutex::new(Ok(RawApiCreds::default())),
            derive_calls: std::sync::atomic::AtomicUsize::new(0),
            create_calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn complete_creds(tag: &str) -> RawApiCreds {
        use base64::Engine;
        RawApiCreds {
            key: Some(format!("{tag}-key")),
            // Secrets are URL-safe base64 on the wire; downstream HMAC
            // signing decodes them.
            secret: Some(
                base64::engine::general_purpose::URL_SAFE.encode(format!("{tag}-secret")),
            ),
            passphrase: Some(format!("{tag}-pass")),
        }
    }

    pub fn set_derive_result(&self, result: RawApiCreds) {
        *self.derive_result.lock() = result;
    }

    pub fn set_create_result(&self, result: AuthResult<RawApiCreds>) {
        *self.create_result.lock() = result;
    }
}

impl ClobAuthApi for MockAuthApi {
    fn derive_api_key(&self, _headers: L1AuthHeaders) -> BoxFuture<'_, AuthResult<RawApiCreds>> {
        Box::pin(async move {
            self.derive_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.derive_result.lock().clone())
        })
    }

    fn create_api_key(&self, _headers: L1AuthHeaders) -> BoxFuture<'_, AuthResult<RawApiCreds>> {
        Box::pin(async move {
            self.create_calls
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            match &*self.create_result.lock() {
                Ok(creds) => Ok(creds.clone()),
                Err(err) => Err(AuthError::AcquisitionFailed(err.to_string())),
            }
        })
    }
}
