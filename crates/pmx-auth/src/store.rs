//! Credential cache with TTL.
//!
//! One active credential set per (signer, context) pair, persisted through
//! the injectable session store. Entries older than seven days are treated
//! as misses so a stale key never reaches the exchange.

use crate::credentials::{CredContext, Credentials};
use crate::error::AuthResult;
use alloy::primitives::Address;
use chrono::Duration;
use pmx_store::{get_json_fresh, put_json, SessionStore, StoreKey};
use std::sync::Arc;
use tracing::debug;

/// Store namespace for cached credentials.
const STORE_NAMESPACE: &str = "clob-creds";

/// Credential lifetime before a forced re-link.
const TTL_DAYS: i64 = 7;

/// TTL-bounded credential cache keyed by (signer, context).
pub struct CredentialStore {
    store: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            ttl: Duration::days(TTL_DAYS),
        }
    }

    /// Override the TTL, for tests.
    pub fn with_ttl(store: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(signer: Address, context: CredContext) -> StoreKey {
        // Addresses render checksummed; StoreKey lowercases, so the key
        // matches however the caller obtained the address.
        StoreKey::new(STORE_NAMESPACE, format!("{signer}:{}", context.as_str()))
    }

    /// Fetch unexpired credentials for the pair, if cached.
    pub fn get(&self, signer: Address, context: CredContext) -> AuthResult<Option<Credentials>> {
        Ok(get_json_fresh(
            self.store.as_ref(),
            &Self::key(signer, context),
            self.ttl,
        )?)
    }

    /// Cache credentials under a (signer, context) pair.
    pub fn put(&self, signer: Address, credentials: &Credentials) -> AuthResult<()> {
        put_json(
            self.store.as_ref(),
            &Self::key(signer, credentials.context),
            credentials,
        )?;
        Ok(())
    }

    /// Drop every cached credential for a signer, both contexts.
    ///
    /// Used when the exchange reports the credentials expired: the whole
    /// set is invalidated wholesale, never field by field.
    pub fn invalidate(&self, signer: Address) -> AuthResult<()> {
        debug!(%signer, "invalidating all cached credentials");
        self.store
            .invalidate_prefix(STORE_NAMESPACE, &signer.to_string())?;
        Ok(())
    }

    /// Drop the cached credential for one (signer, context) pair.
    pub fn invalidate_context(&self, signer: Address, context: CredContext) -> AuthResult<()> {
        debug!(%signer, %context, "invalidating cached credentials for context");
        self.store.invalidate(&Self::key(signer, context))?;
        Ok(())
    }
}
