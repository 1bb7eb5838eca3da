//! Credential linking orchestration.
//!
//! Derive-first, create-fallback: one attestation signature re-derives
//! previously registered credentials; only when the exchange returns an
//! incomplete set does the linker sign again and create a new one. Nothing
//! is cached on partial failure.

use crate::api::{DynClobAuthApi, L1AuthHeaders, RawApiCreds};
use crate::attestation::auth_typed_data;
use crate::credentials::{ApiSecret, CredContext, Credentials};
use crate::error::{AuthError, AuthResult};
use crate::store::CredentialStore;
use alloy::primitives::Address;
use pmx_signer::WalletSigner;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time before Unix epoch")
            .as_millis() as u64
    }
}

/// Obtains exchange API credentials for a signer and funder context.
pub struct CredentialLinker {
    api: DynClobAuthApi,
    store: CredentialStore,
    chain_id: u64,
    clock: Arc<dyn Clock>,
}

impl CredentialLinker {
    pub fn new(api: DynClobAuthApi, store: CredentialStore, chain_id: u64) -> Self {
        Self::with_clock(api, store, chain_id, Arc::new(SystemClock))
    }

    pub fn with_clock(
        api: DynClobAuthApi,
        store: CredentialStore,
        chain_id: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            store,
            chain_id,
            clock,
        }
    }

    /// The credential context implied by a funder address.
    ///
    /// A distinct funder means orders debit the smart wallet, and the
    /// exchange auth must have been linked under those semantics.
    pub fn context_for(signer: Address, funder: Option<Address>) -> CredContext {
        match funder {
            Some(funder) if funder != signer => CredContext::SmartWallet,
            _ => CredContext::Direct,
        }
    }

    /// Obtain credentials for the signer under the funder's context.
    ///
    /// Returns a cached unexpired set without prompting. Otherwise performs
    /// derive (one signature), falling back to create (a second signature)
    /// when derivation comes back incomplete. On success the other
    /// context's cached credentials are invalidated: a context switch means
    /// the exchange auth header semantics changed.
    pub async fn link(
        &self,
        signer: &dyn WalletSigner,
        funder: Option<Address>,
    ) -> AuthResult<Credentials> {
        let signer_address = signer.address();
        let context = Self::context_for(signer_address, funder);

        if let Some(cached) = self.store.get(signer_address, context)? {
            debug!(%signer_address, %context, "using cached exchange credentials");
            return Ok(cached);
        }

        let raw = match self.attempt_derive(signer, signer_address).await {
            Ok(raw) if raw.is_complete() => raw,
            Ok(_) => {
                debug!(%signer_address, "derivation incomplete, creating new credentials");
                self.attempt_create(signer, signer_address).await?
            }
            // A declined prompt ends the link; never re-prompt.
            Err(AuthError::UserRejected) => return Err(AuthError::UserRejected),
            Err(err) => {
                warn!(%signer_address, %err, "derivation failed, creating new credentials");
                self.attempt_create(signer, signer_address).await?
            }
        };

        if !raw.is_complete() {
            return Err(AuthError::AcquisitionFailed(
                "exchange returned incomplete credentials".to_string(),
            ));
        }

        let credentials = Credentials {
            api_key: raw.key.unwrap_or_default(),
            api_secret: ApiSecret::new(raw.secret.unwrap_or_default()),
            api_passphrase: raw.passphrase.unwrap_or_default(),
            signer_address: format!("{signer_address:#x}"),
            context,
        };

        self.store
            .invalidate_context(signer_address, context.other())?;
        self.store.put(signer_address, &credentials)?;
        info!(%signer_address, %context, "exchange credentials linked");

        Ok(credentials)
    }

    async fn signed_headers(
        &self,
        signer: &dyn WalletSigner,
        signer_address: Address,
    ) -> AuthResult<L1AuthHeaders> {
        let now_ms = self.clock.now_ms();
        let timestamp = (now_ms / 1000).to_string();
        let nonce = now_ms;

        let request = auth_typed_data(signer_address, self.chain_id, &timestamp, nonce);
        let signature = signer.sign_typed_data(request).await?;

        Ok(L1AuthHeaders {
            address: signer_address,
            signature: signature.to_hex(),
            timestamp,
            nonce,
        })
    }

    async fn attempt_derive(
        &self,
        signer: &dyn WalletSigner,
        signer_address: Address,
    ) -> AuthResult<RawApiCreds> {
        let headers = self.signed_headers(signer, signer_address).await?;
        self.api.derive_api_key(headers).await
    }

    async fn attempt_create(
        &self,
        signer: &dyn WalletSigner,
        signer_address: Address,
    ) -> AuthResult<RawApiCreds> {
        let headers = self.signed_headers(signer, signer_address).await?;
        self.api.create_api_key(headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockAuthApi;
    use pmx_signer::MockSigner;
    use pmx_store::MemoryStore;
    use std::sync::atomic::Ordering;

    struct Harness {
        api: Arc<MockAuthApi>,
        signer: MockSigner,
        store: Arc<MemoryStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                api: Arc::new(MockAuthApi::new()),
                signer: MockSigner::new(Address::repeat_byte(0xaa)),
                store: Arc::new(MemoryStore::new()),
            }
        }

        fn linker(&self) -> CredentialLinker {
            CredentialLinker::new(
                self.api.clone(),
                CredentialStore::new(self.store.clone()),
                137,
            )
        }

        fn smart_wallet_funder() -> Option<Address> {
            Some(Address::repeat_byte(0xbb))
        }
    }

    #[test]
    fn test_context_from_funder() {
        let signer = Address::repeat_byte(0xaa);
        assert_eq!(
            CredentialLinker::context_for(signer, None),
            CredContext::Direct
        );
        assert_eq!(
            CredentialLinker::context_for(signer, Some(signer)),
            CredContext::Direct
        );
        assert_eq!(
            CredentialLinker::context_for(signer, Some(Address::repeat_byte(0xbb))),
            CredContext::SmartWallet
        );
    }

    #[tokio::test]
    async fn test_derive_success_signs_once() {
        let h = Harness::new();
        h.api.set_derive_result(MockAuthApi::complete_creds("derived"));

        let creds = h.linker().link(&h.signer, None).await.unwrap();

        assert_eq!(creds.api_key, "derived-key");
        assert_eq!(creds.context, CredContext::Direct);
        assert_eq!(h.signer.sign_count(), 1);
        assert_eq!(h.api.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_incomplete_derive_falls_back_to_create() {
        let h = Harness::new();
        h.api
            .set_create_result(Ok(MockAuthApi::complete_creds("created")));

        let creds = h.linker().link(&h.signer, None).await.unwrap();

        assert_eq!(creds.api_key, "created-key");
        // Derive signed once, create signed again.
        assert_eq!(h.signer.sign_count(), 2);
        assert_eq!(h.api.derive_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.api.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_both_paths_failing_caches_nothing() {
        let h = Harness::new();
        h.api.set_create_result(Err(AuthError::AcquisitionFailed(
            "server error".to_string(),
        )));

        let err = h.linker().link(&h.signer, None).await.unwrap_err();
        assert!(matches!(err, AuthError::AcquisitionFailed(_)));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_create_is_not_cached() {
        let h = Harness::new();
        h.api.set_create_result(Ok(RawApiCreds {
            key: Some("k".into()),
            secret: None,
            passphrase: None,
        }));

        let err = h.linker().link(&h.signer, None).await.unwrap_err();
        assert!(matches!(err, AuthError::AcquisitionFailed(_)));
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_cached_credentials_skip_prompt() {
        let h = Harness::new();
        h.api.set_derive_result(MockAuthApi::complete_creds("derived"));

        let linker = h.linker();
        linker.link(&h.signer, None).await.unwrap();
        assert_eq!(h.signer.sign_count(), 1);

        // Second link serves from cache without a signature.
        let creds = linker.link(&h.signer, None).await.unwrap();
        assert_eq!(creds.api_key, "derived-key");
        assert_eq!(h.signer.sign_count(), 1);
    }

    #[tokio::test]
    async fn test_user_rejection_stops_the_link() {
        let h = Harness::new();
        h.signer.reject_next();

        let err = h.linker().link(&h.signer, None).await.unwrap_err();
        assert!(matches!(err, AuthError::UserRejected));
        // No fallback attempt after a declined prompt.
        assert_eq!(h.api.create_calls.load(Ordering::SeqCst), 0);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_context_switch_invalidates_other_context() {
        let h = Harness::new();
        h.api.set_derive_result(MockAuthApi::complete_creds("derived"));
        let linker = h.linker();
        let cred_store = CredentialStore::new(h.store.clone());
        let signer_address = h.signer.address();

        // Link directly first.
        linker.link(&h.signer, None).await.unwrap();
        assert!(cred_store
            .get(signer_address, CredContext::Direct)
            .unwrap()
            .is_some());

        // Linking under a smart-wallet funder replaces the direct creds.
        let creds = linker
            .link(&h.signer, Harness::smart_wallet_funder())
            .await
            .unwrap();
        assert_eq!(creds.context, CredContext::SmartWallet);
        assert!(cred_store
            .get(signer_address, CredContext::Direct)
            .unwrap()
            .is_none());
        assert!(cred_store
            .get(signer_address, CredContext::SmartWallet)
            .unwrap()
            .is_some());
    }
}
