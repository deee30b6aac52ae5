//! Client configuration
//!
//! Loads from built-in defaults, optional `config/default` and `config/local`
//! files, then `LIMESTONE__*` environment variables (a `.env` file is read
//! first).

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::verify::{TrustPolicy, CANONICAL_MESSAGE_VERSION, SUPPORTED_MESSAGE_VERSIONS};

pub const DEFAULT_API_URL: &str = "https://api.limestone.finance";
pub const DEFAULT_PROVIDER: &str = "limestone";

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Primary oracle node
    pub api_url: String,
    /// Provider whose prices are requested
    pub provider: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    pub trust: TrustConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrustConfig {
    /// "single" or "quorum"
    pub mode: String,
    /// Distinct signers required in quorum mode
    pub required_signers: usize,
    /// Additional oracle nodes queried in quorum mode
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Provider id -> signing address (0x-prefixed)
    #[serde(default)]
    pub providers: HashMap<String, String>,
    /// Layout of the message providers sign
    #[serde(default = "default_message_version")]
    pub message_version: u8,
}

fn default_message_version() -> u8 {
    CANONICAL_MESSAGE_VERSION
}

impl TrustConfig {
    pub fn policy(&self) -> Result<TrustPolicy> {
        match self.mode.trim().to_lowercase().as_str() {
            "single" | "single_signer" => Ok(TrustPolicy::SingleSigner),
            "quorum" => {
                if self.required_signers == 0 {
                    bail!("trust.required_signers must be at least 1 in quorum mode");
                }
                Ok(TrustPolicy::Quorum {
                    required: self.required_signers,
                })
            }
            other => bail!("Unknown trust mode '{}' (expected single or quorum)", other),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            timeout_ms: 30_000,
            trust: TrustConfig {
                mode: "single".to_string(),
                required_signers: 1,
                nodes: Vec::new(),
                providers: HashMap::new(),
                message_version: CANONICAL_MESSAGE_VERSION,
            },
        }
    }
}

impl ClientConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("provider", DEFAULT_PROVIDER)?
            .set_default("timeout_ms", 30_000)?
            .set_default("trust.mode", "single")?
            .set_default("trust.required_signers", 1)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // LIMESTONE__API_URL, LIMESTONE__TRUST__NODES=a,b ...
            .add_source(
                Environment::with_prefix("LIMESTONE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("trust.nodes"),
            )
            .build()
            .context("Failed to build configuration")?;

        let client_config: ClientConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        client_config.validate()?;

        Ok(client_config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            bail!("api_url must not be empty");
        }
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be positive");
        }
        if !SUPPORTED_MESSAGE_VERSIONS.contains(&self.trust.message_version) {
            bail!(
                "Unsupported trust.message_version {}",
                self.trust.message_version
            );
        }
        if let TrustPolicy::Quorum { required } = self.trust.policy()? {
            let available = 1 + self.trust.nodes.len();
            if required > available {
                bail!(
                    "Quorum of {} signers cannot be reached with {} oracle node(s)",
                    required,
                    available
                );
            }
        }
        Ok(())
    }

    /// Summary without secrets, for logging
    pub fn digest(&self) -> String {
        format!(
            "api_url={} provider={} timeout_ms={} trust={} required={} nodes={} providers={} message_version={}",
            self.api_url,
            self.provider,
            self.timeout_ms,
            self.trust.mode,
            self.trust.required_signers,
            self.trust.nodes.len(),
            self.trust.providers.len(),
            self.trust.message_version
        )
    }
}

impl std::fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trust.policy().unwrap(), TrustPolicy::SingleSigner);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_quorum_needs_enough_nodes() {
        let mut config = ClientConfig::default();
        config.trust.mode = "quorum".to_string();
        config.trust.required_signers = 2;
        assert!(config.validate().is_err());

        config.trust.nodes = vec!["https://node-2.example".to_string()];
        assert!(config.validate().is_ok());
        assert_eq!(
            config.trust.policy().unwrap(),
            TrustPolicy::Quorum { required: 2 }
        );
    }

    #[test]
    fn test_unsupported_message_version_is_rejected() {
        let mut config = ClientConfig::default();
        config.trust.message_version = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_trust_mode() {
        let mut config = ClientConfig::default();
        config.trust.mode = "majority".to_string();
        assert!(config.trust.policy().is_err());
    }

    #[test]
    fn test_digest_mentions_endpoint() {
        let config = ClientConfig::default();
        assert!(config.to_string().contains(DEFAULT_API_URL));
    }
}
