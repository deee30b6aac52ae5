//! Provider key lookup

use std::collections::HashMap;

use anyhow::{Context, Result};
use ethers::types::Address;

/// Resolves a provider identifier to the address of its signing key
pub trait ProviderRegistry: Send + Sync {
    fn public_key(&self, provider: &str) -> Option<Address>;
}

/// In-memory registry, usually populated from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticProviderRegistry {
    keys: HashMap<String, Address>,
}

impl StaticProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, provider: impl Into<String>, key: Address) {
        self.keys.insert(provider.into(), key);
    }

    /// Build from `id -> 0x address` pairs.
    pub fn from_entries<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut registry = Self::new();
        for (provider, key) in entries {
            let address: Address = key
                .trim()
                .parse()
                .with_context(|| format!("Invalid public key '{}' for provider {}", key, provider))?;
            registry.insert(provider.clone(), address);
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl ProviderRegistry for StaticProviderRegistry {
    fn public_key(&self, provider: &str) -> Option<Address> {
        if let Some(key) = self.keys.get(provider) {
            return Some(*key);
        }
        // A point may reference its provider by the key itself.
        let address: Address = provider.trim().parse().ok()?;
        self.keys.values().find(|k| **k == address).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

    #[test]
    fn test_lookup_by_id_and_by_key() {
        let entries = HashMap::from([("limestone".to_string(), KEY.to_string())]);
        let registry = StaticProviderRegistry::from_entries(&entries).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(!registry.is_empty());
        assert!(StaticProviderRegistry::new().is_empty());

        let expected: Address = KEY.parse().unwrap();
        assert_eq!(registry.public_key("limestone"), Some(expected));
        assert_eq!(registry.public_key(KEY), Some(expected));
        assert_eq!(registry.public_key("unknown"), None);
        assert_eq!(
            registry.public_key("0x0000000000000000000000000000000000000001"),
            None
        );
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let entries = HashMap::from([("bad".to_string(), "not-an-address".to_string())]);
        assert!(StaticProviderRegistry::from_entries(&entries).is_err());
    }
}
