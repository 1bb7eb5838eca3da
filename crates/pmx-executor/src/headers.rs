//! L2 (API-key) request authentication.
//!
//! Authenticated endpoints take an HMAC signature over
//! `timestamp + method + path + body`, keyed by the credential secret. The
//! address in the header set is always the credential's signer, never the
//! funder: that is the account the exchange registered the key under.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use hmac::{Hmac, Mac};
use pmx_auth::Credentials;
use pmx_core::TradeError;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header set for an authenticated exchange request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2AuthHeaders {
    /// Credential signer address, lowercased hex.
    pub address: String,
    /// Base64 (URL-safe) HMAC signature.
    pub signature: String,
    /// Unix seconds used in the signature.
    pub timestamp: String,
    pub api_key: String,
    pub passphrase: String,
}

/// Sign a request with the credential secret.
pub fn build_l2_headers(
    credentials: &Credentials,
    method: &str,
    path: &str,
    body: Option<&str>,
    timestamp_secs: u64,
) -> Result<L2AuthHeaders, TradeError> {
    let timestamp = timestamp_secs.to_string();
    let message = format!("{timestamp}{method}{path}{}", body.unwrap_or(""));

    let secret_bytes = URL_SAFE
        .decode(credentials.api_secret.expose())
        .map_err(|e| TradeError::Internal(format!("credential secret is not base64: {e}")))?;

    let mut mac = HmacSha256::new_from_slice(&secret_bytes)
        .map_err(|e| TradeError::Internal(format!("HMAC init failed: {e}")))?;
    mac.update(message.as_bytes());
    let signature = URL_SAFE.encode(mac.finalize().into_bytes());

    Ok(L2AuthHeaders {
        address: credentials.signer_address.clone(),
        signature,
        timestamp,
        api_key: credentials.api_key.clone(),
        passphrase: credentials.api_passphrase.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmx_auth::{ApiSecret, CredContext};

    fn credentials() -> Credentials {
        Credentials {
            api_key: "key-1".into(),
            // URL-safe base64 of a 32-byte secret.
            api_secret: ApiSecret::new(URL_SAFE.encode([0x5a; 32])),
            api_passphrase: "pass-1".into(),
            signer_address: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
            context: CredContext::SmartWallet,
        }
    }

    #[test]
    fn test_headers_use_signer_address() {
        let headers =
            build_l2_headers(&credentials(), "POST", "/order", Some("{}"), 1_700_000_000).unwrap();
        // The auth address is the credential signer, not the funder.
        assert_eq!(
            headers.address,
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
        assert_eq!(headers.api_key, "key-1");
        assert_eq!(headers.timestamp, "1700000000");
    }

    #[test]
    fn test_signature_is_deterministic_per_input() {
        let creds = credentials();
        let a = build_l2_headers(&creds, "POST", "/order", Some("{}"), 1_700_000_000).unwrap();
        let b = build_l2_headers(&creds, "POST", "/order", Some("{}"), 1_700_000_000).unwrap();
        assert_eq!(a.signature, b.signature);

        let other_body =
            build_l2_headers(&creds, "POST", "/order", Some("{\"x\":1}"), 1_700_000_000).unwrap();
        assert_ne!(a.signature, other_body.signature);

        let other_time = build_l2_headers(&creds, "POST", "/order", Some("{}"), 1_700_000_001).unwrap();
        assert_ne!(a.signature, other_time.signature);

        let other_path = build_l2_headers(&creds, "GET", "/orders", None, 1_700_000_000).unwrap();
        assert_ne!(a.signature, other_path.signature);
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let mut creds = credentials();
        creds.api_secret = ApiSecret::new("not base64 !!!");
        let err = build_l2_headers(&creds, "GET", "/orders", None, 1_700_000_000).unwrap_err();
        assert!(matches!(err, TradeError::Internal(_)));
    }
}
