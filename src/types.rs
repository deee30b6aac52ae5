//! Core price types
//!
//! `RawPricePoint` is what the oracle sends, technical fields included.
//! `PriceDataPoint` is what callers get back: symbol, value and timestamp only.

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{OracleError, Result};

/// A price sample as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDataPoint {
    pub symbol: String,
    pub value: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl PriceDataPoint {
    pub fn new(symbol: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            value,
            timestamp,
        }
    }
}

impl fmt::Display for PriceDataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} @ {}", self.symbol, self.value, self.timestamp)
    }
}

/// A price sample exactly as delivered by an oracle node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPricePoint {
    pub symbol: String,
    pub value: f64,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<serde_json::Value>,
}

impl RawPricePoint {
    /// Unsigned point, mostly useful for fixtures.
    pub fn new(symbol: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.into(),
            value,
            timestamp,
            signature: None,
            version: None,
            provider: None,
            provider_public_key: None,
            id: None,
            source: None,
        }
    }

    /// Identifier used to look the signer up in a provider registry
    pub fn provider_ref(&self) -> Option<&str> {
        self.provider
            .as_deref()
            .or(self.provider_public_key.as_deref())
            .filter(|p| !p.trim().is_empty())
    }

    /// Reject samples that can never be a valid price.
    pub fn validate(&self) -> Result<()> {
        if !self.value.is_finite() || self.value <= 0.0 {
            return Err(OracleError::MalformedResponse(format!(
                "non-positive value {} for {} at {}",
                self.value, self.symbol, self.timestamp
            )));
        }
        if self.timestamp < 0 {
            return Err(OracleError::MalformedResponse(format!(
                "negative timestamp {} for {}",
                self.timestamp, self.symbol
            )));
        }
        Ok(())
    }

    /// Drop signature, version and provider fields.
    pub fn into_point(self) -> PriceDataPoint {
        PriceDataPoint {
            symbol: self.symbol,
            value: self.value,
            timestamp: self.timestamp,
        }
    }
}

/// A point whose signature was checked against a trusted provider key
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPoint {
    pub point: PriceDataPoint,
    pub signer: Address,
}
