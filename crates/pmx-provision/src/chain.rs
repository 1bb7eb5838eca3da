//! Read-only chain access.
//!
//! Used for the deployment fallback check (bytecode presence at the derived
//! address when the relayer is unreachable) and for conditional-token and
//! collateral balance reads before submission.

use crate::error::{ProvisionError, ProvisionResult};
use crate::relayer::BoxFuture;
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

mod erc20 {
    alloy::sol! {
        function balanceOf(address account) external view returns (uint256);
    }
}

mod erc1155 {
    alloy::sol! {
        function balanceOf(address account, uint256 id) external view returns (uint256);
    }
}

/// Read-only chain operations.
pub trait ChainReader: Send + Sync {
    /// Bytecode at an address; empty means no contract deployed.
    fn get_code(&self, address: Address) -> BoxFuture<'_, ProvisionResult<Vec<u8>>>;

    /// ERC-20 balance of `account` on `token`.
    fn erc20_balance(
        &self,
        token: Address,
        account: Address,
    ) -> BoxFuture<'_, ProvisionResult<U256>>;

    /// ERC-1155 balance of `account` for outcome token `id`.
    fn erc1155_balance(
        &self,
        token: Address,
        account: Address,
        id: U256,
    ) -> BoxFuture<'_, ProvisionResult<U256>>;
}

/// Shared handle to a `ChainReader` trait object.
pub type DynChainReader = Arc<dyn ChainReader>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// `ChainReader` over a JSON-RPC endpoint.
pub struct RpcChainReader {
    client: Client,
    rpc_url: String,
}

impl RpcChainReader {
    pub fn new(rpc_url: impl Into<String>) -> ProvisionResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProvisionError::Rpc(e.to_string()))?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> ProvisionResult<String> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProvisionError::Rpc(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProvisionError::Rpc(format!("HTTP {}", response.status())));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProvisionError::Rpc(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(ProvisionError::Rpc(format!("{} ({})", err.message, err.code)));
        }
        body.result
            .ok_or_else(|| ProvisionError::Rpc("missing result".to_string()))
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> ProvisionResult<Vec<u8>> {
        let result = self
            .call(
                "eth_call",
                json!([{ "to": to, "data": format!("0x{}", hex::encode(data)) }, "latest"]),
            )
            .await?;
        hex::decode(result.trim_start_matches("0x"))
            .map_err(|e| ProvisionError::Rpc(e.to_string()))
    }

    fn decode_u256(bytes: &[u8]) -> ProvisionResult<U256> {
        if bytes.len() < 32 {
            return Err(ProvisionError::Rpc(format!(
                "short eth_call return: {} bytes",
                bytes.len()
            )));
        }
        Ok(U256::from_be_slice(&bytes[..32]))
    }
}

impl ChainReader for RpcChainReader {
    fn get_code(&self, address: Address) -> BoxFuture<'_, ProvisionResult<Vec<u8>>> {
        Box::pin(async move {
            debug!(%address, "fetching bytecode");
            let result = self.call("eth_getCode", json!([address, "latest"])).await?;
            hex::decode(result.trim_start_matches("0x"))
                .map_err(|e| ProvisionError::Rpc(e.to_string()))
        })
    }

    fn erc20_balance(
        &self,
        token: Address,
        account: Address,
    ) -> BoxFuture<'_, ProvisionResult<U256>> {
        Box::pin(async move {
            let data = erc20::balanceOfCall { account }.abi_encode();
            let ret = self.eth_call(token, data).await?;
            Self::decode_u256(&ret)
        })
    }

    fn erc1155_balance(
        &self,
        token: Address,
        account: Address,
        id: U256,
    ) -> BoxFuture<'_, ProvisionResult<U256>> {
        Box::pin(async move {
            let data = erc1155::balanceOfCall { account, id }.abi_encode();
            let ret = self.eth_call(token, data).await?;
            Self::decode_u256(&ret)
        })
    }
}

/// Scripted `ChainReader` for tests.
#[derive(Debug, Default)]
pub struct MockChainReader {
    code: parking_lot::Mutex<Vec<u8>>,
    erc20: parking_lot::Mutex<U256>,
    erc1155: parking_lot::Mutex<U256>,
}

impl MockChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_code(&self, code: Vec<u8>) {
        *self.code.lock() = code;
    }

    pub fn set_erc20_balance(&self, balance: U256) {
        *self.erc20.lock() = balance;
    }

    pub fn set_erc1155_balance(&self, balance: U256) {
        *self.erc1155.lock() = balance;
    }
}

impl ChainReader for MockChainReader {
    fn get_code(&self, _address: Address) -> BoxFuture<'_, ProvisionResult<Vec<u8>>> {
        Box::pin(async move { Ok(self.code.lock().clone()) })
    }

    fn erc20_balance(
        &self,
        _token: Address,
        _account: Address,
    ) -> BoxFuture<'_, ProvisionResult<U256>> {
        Box::pin(async move { Ok(*self.erc20.lock()) })
    }

    fn erc1155_balance(
        &self,
        _token: Address,
        _account: Address,
        _id: U256,
    ) -> BoxFuture<'_, ProvisionResult<U256>> {
        Box::pin(async move { Ok(*self.erc1155.lock()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erc20_call_encoding() {
        let data = erc20::balanceOfCall {
            account: Address::repeat_byte(0xaa),
        }
        .abi_encode();
        // 4-byte selector + one 32-byte word.
        assert_eq!(data.len(), 36);
        assert_eq!(&data[0..4], &[0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn test_erc1155_call_encoding() {
        let data = erc1155::balanceOfCall {
            account: Address::repeat_byte(0xaa),
            id: U256::from(7),
        }
        .abi_encode();
        // 4-byte selector + two 32-byte words.
        assert_eq!(data.len(), 68);
        assert_eq!(&data[0..4], &[0x00, 0xfd, 0xd5, 0x8e]);
    }

    #[test]
    fn test_decode_u256() {
        let mut word = vec![0u8; 32];
        word[31] = 42;
        assert_eq!(RpcChainReader::decode_u256(&word).unwrap(), U256::from(42));
        assert!(RpcChainReader::decode_u256(&[0u8; 4]).is_err());
    }
}
