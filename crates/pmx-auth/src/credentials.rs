//! Exchange API credential types.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// API secret, zeroized on drop and redacted in debug output.
///
/// Exchange API secrets are not private keys, but they still should not
/// linger in memory or leak into logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ApiSecret(String);

impl ApiSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiSecret([redacted])")
    }
}

/// Which funder semantics the credentials were linked under.
///
/// The exchange's auth header must match the funder in use, so credentials
/// linked for direct-wallet trading are not interchangeable with ones
/// linked for a smart-wallet funder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredContext {
    /// Funds move from the signing wallet itself.
    Direct,
    /// Funds move from the derived smart-contract wallet.
    SmartWallet,
}

impl CredContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::SmartWallet => "smart-wallet",
        }
    }

    /// The other context for the same signer.
    pub fn other(&self) -> Self {
        match self {
            Self::Direct => Self::SmartWallet,
            Self::SmartWallet => Self::Direct,
        }
    }
}

impl fmt::Display for CredContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exchange API auth triple plus its linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: ApiSecret,
    pub api_passphrase: String,
    /// Lowercased hex address of the signer the credentials belong to.
    pub signer_address: String,
    pub context: CredContext,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_redacted_in_debug() {
        let secret = ApiSecret::new("super-secret");
        assert_eq!(format!("{secret:?}"), "ApiSecret([redacted])");
    }

    #[test]
    fn test_context_strings() {
        assert_eq!(CredContext::Direct.as_str(), "direct");
        assert_eq!(CredContext::SmartWallet.as_str(), "smart-wallet");
        assert_eq!(CredContext::Direct.other(), CredContext::SmartWallet);
    }

    #[test]
    fn test_credentials_serde_round_trip() {
        let creds = Credentials {
            api_key: "key".into(),
            api_secret: ApiSecret::new("secret"),
            api_passphrase: "pass".into(),
            signer_address: "0xabc".into(),
            context: CredContext::SmartWallet,
        };
        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("\"smart-wallet\""));
        let parsed: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, creds);
    }
}
