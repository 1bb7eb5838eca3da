//! EIP-712 wallet-control attestation.
//!
//! The exchange derives or creates API credentials from a typed-data
//! signature proving control of the signing wallet. This module builds the
//! signature request; the wallet signer produces the signature.

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol_types::eip712_domain;
use pmx_signer::TypedDataRequest;
use serde_json::json;

/// Fixed attestation text shown in the wallet prompt.
pub const ATTESTATION_MESSAGE: &str = "This message attests that I control the given wallet";

const DOMAIN_NAME: &str = "ClobAuthDomain";
const DOMAIN_VERSION: &str = "1";

/// `ClobAuth(address address,string timestamp,uint256 nonce,string message)`
///
/// The first field is named `address`, which the `sol!` macro cannot parse
/// as an identifier, so the struct hash is assembled by hand.
const CLOB_AUTH_TYPE: &[u8] =
    b"ClobAuth(address address,string timestamp,uint256 nonce,string message)";

fn struct_hash(signer: Address, timestamp: &str, nonce: u64) -> B256 {
    let mut data = Vec::with_capacity(5 * 32);
    data.extend_from_slice(keccak256(CLOB_AUTH_TYPE).as_slice());

    let mut addr_word = [0u8; 32];
    addr_word[12..].copy_from_slice(signer.as_slice());
    data.extend_from_slice(&addr_word);

    data.extend_from_slice(keccak256(timestamp.as_bytes()).as_slice());
    data.extend_from_slice(&U256::from(nonce).to_be_bytes::<32>());
    data.extend_from_slice(keccak256(ATTESTATION_MESSAGE.as_bytes()).as_slice());

    keccak256(&data)
}

/// Build the attestation signature request for a signer.
///
/// `timestamp` is Unix seconds as the exchange expects it in both the
/// signed payload and the auth header; `nonce` is a fresh value per link
/// attempt (the linker uses the current millisecond clock).
pub fn auth_typed_data(
    signer: Address,
    chain_id: u64,
    timestamp: &str,
    nonce: u64,
) -> TypedDataRequest {
    let domain = eip712_domain! {
        name: DOMAIN_NAME,
        version: DOMAIN_VERSION,
        chain_id: chain_id,
    };

    let mut data = Vec::with_capacity(2 + 32 + 32);
    data.extend_from_slice(&[0x19, 0x01]);
    data.extend_from_slice(domain.hash_struct().as_slice());
    data.extend_from_slice(struct_hash(signer, timestamp, nonce).as_slice());
    let signing_hash = keccak256(&data);

    let document = json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
            ],
            "ClobAuth": [
                { "name": "address", "type": "address" },
                { "name": "timestamp", "type": "string" },
                { "name": "nonce", "type": "uint256" },
                { "name": "message", "type": "string" },
            ],
        },
        "primaryType": "ClobAuth",
        "domain": {
            "name": DOMAIN_NAME,
            "version": DOMAIN_VERSION,
            "chainId": chain_id,
        },
        "message": {
            "address": signer,
            "timestamp": timestamp,
            "nonce": nonce,
            "message": ATTESTATION_MESSAGE,
        },
    });

    TypedDataRequest {
        primary_type: "ClobAuth".to_string(),
        document,
        signing_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_deterministic() {
        let signer = Address::repeat_byte(0xaa);
        let a = auth_typed_data(signer, 137, "1700000000", 1700000000123);
        let b = auth_typed_data(signer, 137, "1700000000", 1700000000123);
        assert_eq!(a.signing_hash, b.signing_hash);
    }

    #[test]
    fn test_hash_varies_with_inputs() {
        let signer = Address::repeat_byte(0xaa);
        let base = auth_typed_data(signer, 137, "1700000000", 1);

        let other_nonce = auth_typed_data(signer, 137, "1700000000", 2);
        assert_ne!(base.signing_hash, other_nonce.signing_hash);

        let other_time = auth_typed_data(signer, 137, "1700000001", 1);
        assert_ne!(base.signing_hash, other_time.signing_hash);

        let other_signer = auth_typed_data(Address::repeat_byte(0xbb), 137, "1700000000", 1);
        assert_ne!(base.signing_hash, other_signer.signing_hash);

        let other_chain = auth_typed_data(signer, 80002, "1700000000", 1);
        assert_ne!(base.signing_hash, other_chain.signing_hash);
    }

    #[test]
    fn test_struct_hash_layout() {
        // Five 32-byte words: type hash, padded address, hashed timestamp,
        // nonce, hashed message. Spot-check the address padding by
        // recomputing the hash with a manually built buffer.
        let signer = Address::repeat_byte(0xaa);
        let expected = {
            let mut data = Vec::new();
            data.extend_from_slice(keccak256(CLOB_AUTH_TYPE).as_slice());
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(signer.as_slice());
            data.extend_from_slice(&word);
            data.extend_from_slice(keccak256(b"1700000000").as_slice());
            data.extend_from_slice(&U256::from(42u64).to_be_bytes::<32>());
            data.extend_from_slice(keccak256(ATTESTATION_MESSAGE.as_bytes()).as_slice());
            keccak256(&data)
        };
        assert_eq!(struct_hash(signer, "1700000000", 42), expected);
    }

    #[test]
    fn test_document_carries_attestation_text() {
        let request = auth_typed_data(Address::repeat_byte(0xaa), 137, "1700000000", 42);
        assert_eq!(request.primary_type, "ClobAuth");
        assert_eq!(
            request.document["message"]["message"],
            ATTESTATION_MESSAGE
        );
    }
}
