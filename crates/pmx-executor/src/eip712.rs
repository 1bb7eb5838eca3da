//! EIP-712 order struct and signing-request construction.
//!
//! The exchange settles signed order structs on chain, so the typed-data
//! layout and domain must match the exchange contracts exactly. Negative-
//! risk markets settle through a different exchange contract, which changes
//! the domain's verifying contract.

use alloy::primitives::Address;
use alloy::sol;
use alloy::sol_types::{eip712_domain, SolStruct};
use pmx_signer::TypedDataRequest;
use serde_json::json;

/// EIP-712 domain constants shared by both exchange contracts.
pub const EIP712_DOMAIN_NAME: &str = "CTF Exchange";
pub const EIP712_DOMAIN_VERSION: &str = "1";

sol! {
    /// On-chain order struct settled by the exchange.
    #[derive(Debug)]
    struct Order {
        uint256 salt;
        address maker;
        address signer;
        address taker;
        uint256 tokenId;
        uint256 makerAmount;
        uint256 takerAmount;
        uint256 expiration;
        uint256 nonce;
        uint256 feeRateBps;
        uint8 side;
        uint8 signatureType;
    }
}

/// How the exchange verifies the order signature.
///
/// Orders funded by a smart wallet are verified against the wallet contract
/// rather than by direct ECDSA recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    /// Plain EOA signature; maker and signer are the same account.
    Eoa,
    /// Proxy-wallet funder with an EOA owner signature.
    PolyProxy,
    /// Gnosis-Safe-style smart wallet funder.
    PolyGnosisSafe,
}

impl SignatureScheme {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Eoa => 0,
            Self::PolyProxy => 1,
            Self::PolyGnosisSafe => 2,
        }
    }

    /// Scheme implied by the funder: a distinct funder means smart-wallet
    /// verification.
    pub fn for_funder(signer: Address, funder: Address) -> Self {
        if funder == signer {
            Self::Eoa
        } else {
            Self::PolyGnosisSafe
        }
    }
}

/// Build the signature request for an order.
///
/// `verifying_contract` is the base exchange for regular markets and the
/// negative-risk exchange for neg-risk markets.
pub fn order_typed_data(
    order: &Order,
    chain_id: u64,
    verifying_contract: Address,
) -> TypedDataRequest {
    let domain = eip712_domain! {
        name: EIP712_DOMAIN_NAME,
        version: EIP712_DOMAIN_VERSION,
        chain_id: chain_id,
        verifying_contract: verifying_contract,
    };

    let signing_hash = order.eip712_signing_hash(&domain);

    let document = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" },
            ],
            "Order": [
                { "name": "salt", "type": "uint256" },
                { "name": "maker", "type": "address" },
                { "name": "signer", "type": "address" },
                { "name": "taker", "type": "address" },
                { "name": "tokenId", "type": "uint256" },
                { "name": "makerAmount", "type": "uint256" },
                { "name": "takerAmount", "type": "uint256" },
                { "name": "expiration", "type": "uint256" },
                { "name": "nonce", "type": "uint256" },
                { "name": "feeRateBps", "type": "uint256" },
                { "name": "side", "type": "uint8" },
                { "name": "signatureType", "type": "uint8" },
            ],
        },
        "primaryType": "Order",
        "domain": {
            "name": EIP712_DOMAIN_NAME,
            "version": EIP712_DOMAIN_VERSION,
            "chainId": chain_id,
            "verifyingContract": verifying_contract,
        },
        "message": {
            "salt": order.salt.to_string(),
            "maker": order.maker,
            "signer": order.signer,
            "taker": order.taker,
            "tokenId": order.tokenId.to_string(),
            "makerAmount": order.makerAmount.to_string(),
            "takerAmount": order.takerAmount.to_string(),
            "expiration": order.expiration.to_string(),
            "nonce": order.nonce.to_string(),
            "feeRateBps": order.feeRateBps.to_string(),
            "side": order.side,
            "signatureType": order.signatureType,
        },
    });

    TypedDataRequest {
        primary_type: "Order".to_string(),
        document,
        signing_hash,
    }
}
