//! The `WalletSigner` trait and its wire types.

use crate::error::SignerResult;
use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// An EIP-712 signature request.
///
/// Carries both the human-readable typed-data document (so wallet adapters
/// can render it for review) and the precomputed signing hash (so in-process
/// signers don't re-derive it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedDataRequest {
    /// EIP-712 primary type name (e.g. "ClobAuth", "Order").
    pub primary_type: String,
    /// Domain and message fields as JSON, in wallet `eth_signTypedData` shape.
    pub document: serde_json::Value,
    /// keccak256(0x1901 || domain_separator || struct_hash).
    pub signing_hash: B256,
}

/// A token transfer to be signed and submitted by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Token contract to transfer from.
    pub token: Address,
    /// Recipient address.
    pub to: Address,
    /// Amount in the token's base units.
    pub amount_base_units: u128,
}

/// Secp256k1 signature components in the 27/28 recovery-id convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureParts {
    /// r component, 0x-prefixed hex.
    pub r: String,
    /// s component, 0x-prefixed hex.
    pub s: String,
    /// Recovery id, 27 or 28.
    pub v: u8,
}

impl SignatureParts {
    /// Build from raw 65-byte `r || s || v` output.
    ///
    /// Normalizes v from the 0/1 convention to 27/28.
    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        let v_raw = bytes[64];
        let v = if v_raw < 27 { v_raw + 27 } else { v_raw };
        Self {
            r: format!("0x{}", hex::encode(&bytes[0..32])),
            s: format!("0x{}", hex::encode(&bytes[32..64])),
            v,
        }
    }

    /// Concatenated `r || s || v` hex string as the exchange expects it.
    pub fn to_hex(&self) -> String {
        format!(
            "0x{}{}{:02x}",
            self.r.trim_start_matches("0x"),
            self.s.trim_start_matches("0x"),
            self.v
        )
    }
}

/// External wallet signer.
///
/// The pipeline's only path to signing authority. Implementations map their
/// wallet's user-declined error onto `SignerError::UserRejected` so the
/// orchestration layer can tell cancellation from system failure.
pub trait WalletSigner: Send + Sync {
    /// Address of the signing account.
    fn address(&self) -> Address;

    /// Sign an EIP-712 typed-data payload.
    fn sign_typed_data(&self, request: TypedDataRequest)
        -> BoxFuture<'_, SignerResult<SignatureParts>>;

    /// Sign and submit a token transfer; resolves to the transaction hash.
    fn send_transfer(&self, request: TransferRequest) -> BoxFuture<'_, SignerResult<String>>;
}

/// Shared handle to a `WalletSigner` trait object.
pub type DynWalletSigner = Arc<dyn WalletSigner>;
