//! Signature verification for oracle price points
//!
//! Points are signed with secp256k1 over the EIP-191 digest of a canonical
//! message. The message layout is versioned: any change to field order or
//! number formatting is a protocol break and needs a new
//! `CANONICAL_MESSAGE_VERSION`.

mod registry;

pub use registry::{ProviderRegistry, StaticProviderRegistry};

use std::str::FromStr;
use std::sync::Arc;

use ethers::signers::{LocalWallet, Signer, WalletError};
use ethers::types::Signature;

use crate::error::{OracleError, Result, VerificationFailure};
use crate::types::{RawPricePoint, VerifiedPoint};

/// Layout version of [`canonical_message`]
pub const CANONICAL_MESSAGE_VERSION: u8 = 1;

/// Layouts [`canonical_message_for`] can produce
pub const SUPPORTED_MESSAGE_VERSIONS: &[u8] = &[1];

/// Decimal places used when rendering values into the signed message
pub const VALUE_DECIMALS: usize = 8;

/// Build the exact string a provider signs for a price point, in the
/// current layout.
///
/// Fields are always emitted as symbol, value, timestamp, version with no
/// whitespace. The value is rendered with [`VALUE_DECIMALS`] fixed decimals so
/// signer and verifier never disagree on float formatting.
pub fn canonical_message(symbol: &str, value: f64, timestamp: i64, version: &str) -> String {
    format!(
        "{{\"symbol\":{},\"value\":\"{:.*}\",\"timestamp\":{},\"version\":{}}}",
        serde_json::Value::String(symbol.to_string()),
        VALUE_DECIMALS,
        value,
        timestamp,
        serde_json::Value::String(version.to_string()),
    )
}

/// Canonical message in a given layout, `None` for layouts this build
/// cannot produce.
pub fn canonical_message_for(
    layout: u8,
    symbol: &str,
    value: f64,
    timestamp: i64,
    version: &str,
) -> Option<String> {
    match layout {
        1 => Some(canonical_message(symbol, value, timestamp, version)),
        _ => None,
    }
}

/// Canonical value string, also the agreement key for quorum checks
pub fn canonical_value(value: f64) -> String {
    format!("{:.*}", VALUE_DECIMALS, value)
}

/// How many independent signers must back a price before it is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// One signature from a registered provider suffices.
    #[default]
    SingleSigner,
    /// At least `required` distinct providers must sign the same value.
    Quorum { required: usize },
}

impl TrustPolicy {
    pub fn required_signers(&self) -> usize {
        match self {
            TrustPolicy::SingleSigner => 1,
            TrustPolicy::Quorum { required } => (*required).max(1),
        }
    }
}

/// Checks raw points against the provider registry
#[derive(Clone)]
pub struct SignatureVerifier {
    registry: Arc<dyn ProviderRegistry>,
    layout: u8,
}

impl SignatureVerifier {
    pub fn new(registry: Arc<dyn ProviderRegistry>) -> Self {
        Self {
            registry,
            layout: CANONICAL_MESSAGE_VERSION,
        }
    }

    /// Expect providers to sign a different message layout.
    pub fn with_message_version(mut self, layout: u8) -> Self {
        self.layout = layout;
        self
    }

    /// Verify one raw point and return it stripped of technical fields.
    pub fn verify(&self, raw: &RawPricePoint) -> Result<VerifiedPoint> {
        let fail = |reason| OracleError::SignatureVerification {
            symbol: raw.symbol.clone(),
            timestamp: raw.timestamp,
            reason,
        };

        let (signature, version) = match (raw.signature.as_deref(), raw.version.as_deref()) {
            (Some(sig), Some(version)) if !sig.trim().is_empty() => (sig, version),
            _ => return Err(fail(VerificationFailure::MissingSignature)),
        };

        let expected = raw
            .provider_ref()
            .and_then(|provider| self.registry.public_key(provider))
            .ok_or_else(|| fail(VerificationFailure::UnknownProvider))?;

        let signature = Signature::from_str(signature.trim())
            .map_err(|_| fail(VerificationFailure::MalformedSignature))?;

        let message =
            canonical_message_for(self.layout, &raw.symbol, raw.value, raw.timestamp, version)
                .ok_or_else(|| fail(VerificationFailure::UnsupportedMessageVersion(self.layout)))?;
        let recovered = signature
            .recover(message.as_str())
            .map_err(|_| fail(VerificationFailure::MalformedSignature))?;

        if recovered != expected {
            tracing::debug!(
                symbol = %raw.symbol,
                timestamp = raw.timestamp,
                expected = %format!("{:#x}", expected),
                recovered = %format!("{:#x}", recovered),
                "Signature does not match provider key"
            );
            return Err(fail(VerificationFailure::SignatureMismatch));
        }

        Ok(VerifiedPoint {
            point: raw.clone().into_point(),
            signer: recovered,
        })
    }
}

/// Sign a point in place the way an oracle provider does.
pub async fn sign_point(
    wallet: &LocalWallet,
    point: &mut RawPricePoint,
    version: &str,
) -> std::result::Result<(), WalletError> {
    let message = canonical_message(&point.symbol, point.value, point.timestamp, version);
    let signature = wallet.sign_message(message).await?;
    point.signature = Some(format!("0x{}", signature));
    point.version = Some(version.to_string());
    point.provider_public_key = Some(format!("{:#x}", wallet.address()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER_KEY: &str = "0x59c6995e998f97a5a0044966f0945387dc9f5a59e86cdc84e64546a1d8f76d59";
    const OTHER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn wallet(key: &str) -> LocalWallet {
        key.parse().unwrap()
    }

    fn verifier_for(wallet: &LocalWallet) -> SignatureVerifier {
        let mut registry = StaticProviderRegistry::new();
        registry.insert("limestone", wallet.address());
        SignatureVerifier::new(Arc::new(registry))
    }

    async fn signed(wallet: &LocalWallet) -> RawPricePoint {
        let mut point = RawPricePoint::new("ETH", 2421.882615498678, 1_618_617_540_000);
        point.provider = Some("limestone".to_string());
        sign_point(wallet, &mut point, "0.4").await.unwrap();
        point
    }

    #[test]
    fn test_canonical_message_is_fixed() {
        let msg = canonical_message("AR", 24.164724409233393, 1_618_790_400_000, "0.4");
        assert_eq!(
            msg,
            r#"{"symbol":"AR","value":"24.16472441","timestamp":1618790400000,"version":"0.4"}"#
        );
    }

    #[test]
    fn test_canonical_message_escapes_symbol() {
        let msg = canonical_message("A\"R", 1.0, 0, "1");
        assert!(msg.starts_with(r#"{"symbol":"A\"R","#));
    }

    #[tokio::test]
    async fn test_untampered_point_verifies() {
        let provider = wallet(PROVIDER_KEY);
        let point = signed(&provider).await;

        let verified = verifier_for(&provider).verify(&point).unwrap();
        assert_eq!(verified.signer, provider.address());
        assert_eq!(verified.point.symbol, "ETH");
        assert_eq!(verified.point.timestamp, point.timestamp);
    }

    #[tokio::test]
    async fn test_tampered_value_is_mismatch() {
        let provider = wallet(PROVIDER_KEY);
        let mut point = signed(&provider).await;
        point.value += 1.0;

        let err = verifier_for(&provider).verify(&point).unwrap_err();
        assert!(matches!(
            err,
            OracleError::SignatureVerification {
                reason: VerificationFailure::SignatureMismatch,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_tampered_timestamp_is_mismatch() {
        let provider = wallet(PROVIDER_KEY);
        let mut point = signed(&provider).await;
        point.timestamp -= 60_000;

        let err = verifier_for(&provider).verify(&point).unwrap_err();
        assert!(matches!(
            err,
            OracleError::SignatureVerification {
                reason: VerificationFailure::SignatureMismatch,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_foreign_signer_is_mismatch() {
        let provider = wallet(PROVIDER_KEY);
        let impostor = wallet(OTHER_KEY);
        let mut point = signed(&impostor).await;
        point.provider = Some("limestone".to_string());

        let err = verifier_for(&provider).verify(&point).unwrap_err();
        assert!(matches!(
            err,
            OracleError::SignatureVerification {
                reason: VerificationFailure::SignatureMismatch,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_provider() {
        let provider = wallet(PROVIDER_KEY);
        let mut point = signed(&provider).await;
        point.provider = Some("somebody-else".to_string());

        let err = verifier_for(&provider).verify(&point).unwrap_err();
        assert!(matches!(
            err,
            OracleError::SignatureVerification {
                reason: VerificationFailure::UnknownProvider,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_signature() {
        let provider = wallet(PROVIDER_KEY);
        let point = RawPricePoint::new("AR", 24.0, 1);

        let err = verifier_for(&provider).verify(&point).unwrap_err();
        assert!(matches!(
            err,
            OracleError::SignatureVerification {
                reason: VerificationFailure::MissingSignature,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_malformed_signature() {
        let provider = wallet(PROVIDER_KEY);
        let mut point = signed(&provider).await;
        point.signature = Some("0xnot-hex".to_string());

        let err = verifier_for(&provider).verify(&point).unwrap_err();
        assert!(matches!(
            err,
            OracleError::SignatureVerification {
                reason: VerificationFailure::MalformedSignature,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_message_layout_is_rejected() {
        let provider = wallet(PROVIDER_KEY);
        let point = signed(&provider).await;

        let verifier = verifier_for(&provider).with_message_version(CANONICAL_MESSAGE_VERSION + 1);
        let err = verifier.verify(&point).unwrap_err();
        assert!(matches!(
            err,
            OracleError::SignatureVerification {
                reason: VerificationFailure::UnsupportedMessageVersion(2),
                ..
            }
        ));
        assert!(canonical_message_for(1, "AR", 1.0, 0, "1").is_some());
    }

    #[test]
    fn test_quorum_never_requires_zero_signers() {
        assert_eq!(TrustPolicy::Quorum { required: 0 }.required_signers(), 1);
        assert_eq!(TrustPolicy::SingleSigner.required_signers(), 1);
    }
}
