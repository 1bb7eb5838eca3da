//! In-process signer for development and tests.

use crate::error::{SignerError, SignerResult};
use crate::wallet::{BoxFuture, SignatureParts, TransferRequest, TypedDataRequest, WalletSigner};
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as AlloySigner;
use zeroize::Zeroizing;

/// `WalletSigner` backed by a local private key.
///
/// Never prompts, so it cannot produce `UserRejected`. Key material is
/// zeroized after parsing; never log it.
pub struct LocalSigner {
    signer: PrivateKeySigner,
}

impl LocalSigner {
    /// Parse a hex private key (0x prefix and surrounding whitespace allowed).
    pub fn from_hex_key(hex_key: &str) -> SignerResult<Self> {
        let trimmed = hex_key.trim().trim_start_matches("0x");
        let secret_bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| SignerError::InvalidKey(e.to_string()))?,
        );
        let signer = PrivateKeySigner::from_slice(&secret_bytes)
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Load the key from an environment variable.
    pub fn from_env(var_name: &str) -> SignerResult<Self> {
        let hex_key = std::env::var(var_name)
            .map_err(|_| SignerError::InvalidKey(format!("env var {var_name} not set")))?;
        Self::from_hex_key(&hex_key)
    }
}

impl WalletSigner for LocalSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign_typed_data(
        &self,
        request: TypedDataRequest,
    ) -> BoxFuture<'_, SignerResult<SignatureParts>> {
        Box::pin(async move {
            let signature = self
                .signer
                .sign_hash(&request.signing_hash)
                .await
                .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

            let mut bytes = [0u8; 65];
            bytes[0..32].copy_from_slice(&signature.r().to_be_bytes::<32>());
            bytes[32..64].copy_from_slice(&signature.s().to_be_bytes::<32>());
            bytes[64] = if signature.v() { 28 } else { 27 };
            Ok(SignatureParts::from_bytes(&bytes))
        })
    }

    fn send_transfer(&self, _request: TransferRequest) -> BoxFuture<'_, SignerResult<String>> {
        // Local signing has no transaction transport; hosts that need the
        // quick-transfer deposit path wire a full wallet adapter instead.
        Box::pin(async move {
            Err(SignerError::TransferFailed(
                "local signer has no transaction transport".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    // Well-known test private key (DO NOT use in production).
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_parse_key_with_prefix_and_whitespace() {
        let signer = LocalSigner::from_hex_key(&format!("  {TEST_PRIVATE_KEY}\n")).unwrap();
        assert_ne!(signer.address(), Address::ZERO);
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(matches!(
            LocalSigner::from_hex_key("0xzz"),
            Err(SignerError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_signatures_are_deterministic() {
        let signer = LocalSigner::from_hex_key(TEST_PRIVATE_KEY).unwrap();
        let request = TypedDataRequest {
            primary_type: "ClobAuth".to_string(),
            document: serde_json::json!({}),
            signing_hash: B256::repeat_byte(0x42),
        };

        let first = signer.sign_typed_data(request.clone()).await.unwrap();
        let second = signer.sign_typed_data(request).await.unwrap();

        // RFC 6979 signing: same key + same hash = same signature.
        assert_eq!(first, second);
        assert!(first.v == 27 || first.v == 28);
    }

    #[tokio::test]
    async fn test_transfer_unsupported() {
        let signer = LocalSigner::from_hex_key(TEST_PRIVATE_KEY).unwrap();
        let result = signer
            .send_transfer(TransferRequest {
                token: Address::ZERO,
                to: Address::ZERO,
                amount_base_units: 1,
            })
            .await;
        assert!(matches!(result, Err(SignerError::TransferFailed(_))));
    }
}
