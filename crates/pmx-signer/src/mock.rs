//! Mock wallet signer for tests across the workspace.

use crate::error::{SignerError, SignerResult};
use crate::wallet::{BoxFuture, SignatureParts, TransferRequest, TypedDataRequest, WalletSigner};
use alloy::primitives::Address;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Scripted `WalletSigner` recording every request it receives.
pub struct MockSigner {
    address: Address,
    reject_next: AtomicBool,
    sign_count: AtomicUsize,
    typed_data_requests: Mutex<Vec<TypedDataRequest>>,
    transfer_requests: Mutex<Vec<TransferRequest>>,
    transfer_result: Mutex<SignerResult<String>>,
}

impl MockSigner {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            reject_next: AtomicBool::new(false),
            sign_count: AtomicUsize::new(0),
            typed_data_requests: Mutex::new(Vec::new()),
            transfer_requests: Mutex::new(Vec::new()),
            transfer_result: Mutex::new(Ok("0xmocktx".to_string())),
        }
    }

    /// Make the next signature request fail as a user rejection.
    pub fn reject_next(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    /// Set the result of the next transfer submission.
    pub fn set_transfer_result(&self, result: SignerResult<String>) {
        *self.transfer_result.lock() = result;
    }

    /// Number of typed-data signatures produced.
    pub fn sign_count(&self) -> usize {
        self.sign_count.load(Ordering::SeqCst)
    }

    /// Typed-data requests seen so far.
    pub fn typed_data_requests(&self) -> Vec<TypedDataRequest> {
        self.typed_data_requests.lock().clone()
    }

    /// Transfer requests seen so far.
    pub fn transfer_requests(&self) -> Vec<TransferRequest> {
        self.transfer_requests.lock().clone()
    }

    fn canned_signature() -> SignatureParts {
        let mut bytes = [0u8; 65];
        bytes[0..32].copy_from_slice(&[0x11; 32]);
        bytes[32..64].copy_from_slice(&[0x22; 32]);
        bytes[64] = 27;
        SignatureParts::from_bytes(&bytes)
    }
}

impl WalletSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_typed_data(
        &self,
        request: TypedDataRequest,
    ) -> BoxFuture<'_, SignerResult<SignatureParts>> {
        Box::pin(async move {
            self.typed_data_requests.lock().push(request);
            if self.reject_next.swap(false, Ordering::SeqCst) {
                return Err(SignerError::UserRejected);
            }
            self.sign_count.fetch_add(1, Ordering::SeqCst);
            Ok(Self::canned_signature())
        })
    }

    fn send_transfer(&self, request: TransferRequest) -> BoxFuture<'_, SignerResult<String>> {
        Box::pin(async move {
            self.transfer_requests.lock().push(request);
            match &*self.transfer_result.lock() {
                Ok(tx) => Ok(tx.clone()),
                Err(SignerError::UserRejected) => Err(SignerError::UserRejected),
                Err(other) => Err(SignerError::TransferFailed(other.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    fn request() -> TypedDataRequest {
        TypedDataRequest {
            primary_type: "Order".to_string(),
            document: serde_json::json!({}),
            signing_hash: B256::ZERO,
        }
    }

    #[tokio::test]
    async fn test_records_and_counts_signatures() {
        let signer = MockSigner::new(Address::repeat_byte(0xaa));

        signer.sign_typed_data(request()).await.unwrap();
        signer.sign_typed_data(request()).await.unwrap();

        assert_eq!(signer.sign_count(), 2);
        assert_eq!(signer.typed_data_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_reject_next_fires_once() {
        let signer = MockSigner::new(Address::repeat_byte(0xaa));
        signer.reject_next();

        let first = signer.sign_typed_data(request()).await;
        assert!(matches!(first, Err(SignerError::UserRejected)));

        let second = signer.sign_typed_data(request()).await;
        assert!(second.is_ok());
        assert_eq!(signer.sign_count(), 1);
    }
}
