//! Error taxonomy for query compilation and verified retrieval

use std::fmt;

use thiserror::Error;

/// Which selector family an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Symbol,
    Temporal,
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorKind::Symbol => write!(f, "symbol"),
            SelectorKind::Temporal => write!(f, "temporal"),
        }
    }
}

/// Transport level failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("{0}")]
    Cause(String),
}

/// Why a point failed signature verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationFailure {
    MissingSignature,
    UnknownProvider,
    MalformedSignature,
    SignatureMismatch,
    InsufficientQuorum { required: usize, agreeing: usize },
    UnsupportedMessageVersion(u8),
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationFailure::MissingSignature => write!(f, "missing signature"),
            VerificationFailure::UnknownProvider => write!(f, "unknown provider"),
            VerificationFailure::MalformedSignature => write!(f, "malformed signature"),
            VerificationFailure::SignatureMismatch => write!(f, "signature mismatch"),
            VerificationFailure::InsufficientQuorum { required, agreeing } => write!(
                f,
                "insufficient quorum: {} of {} required signers agree",
                agreeing, required
            ),
            VerificationFailure::UnsupportedMessageVersion(version) => {
                write!(f, "unsupported canonical message version {}", version)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    /// A selector of the same kind was already set on the builder.
    #[error("conflicting {kind} selector: a {kind} selector is already set")]
    ConflictingSelector { kind: SelectorKind },

    /// One half of a two-part selector (range or paging) is missing.
    #[error("incomplete {kind} selector: missing {missing}")]
    IncompleteSelector {
        kind: SelectorKind,
        missing: &'static str,
    },

    #[error("missing {kind} selector")]
    MissingSelector { kind: SelectorKind },

    #[error("invalid {kind} selector: {reason}")]
    InvalidSelector { kind: SelectorKind, reason: String },

    #[error("invalid date: {input}")]
    InvalidDate { input: String },

    /// Upstream has no sample within the requested resolution.
    #[error("Price not found for symbol: {symbol}")]
    PriceNotFound {
        symbol: String,
        requested_time: Option<i64>,
    },

    /// Transport failure, attributed to a symbol once the pipeline knows it.
    #[error(
        "network error{}: {source}",
        .symbol.as_ref().map(|s| format!(" for {}", s)).unwrap_or_default()
    )]
    Network {
        symbol: Option<String>,
        source: NetworkError,
    },

    #[error("signature verification failed for {symbol} at {timestamp}: {reason}")]
    SignatureVerification {
        symbol: String,
        timestamp: i64,
        reason: VerificationFailure,
    },

    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

impl OracleError {
    /// True for errors raised by the query compiler, before any network call.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            OracleError::ConflictingSelector { .. }
                | OracleError::IncompleteSelector { .. }
                | OracleError::MissingSelector { .. }
                | OracleError::InvalidSelector { .. }
                | OracleError::InvalidDate { .. }
        )
    }

    /// Symbol the error is attributed to, if any
    pub fn symbol(&self) -> Option<&str> {
        match self {
            OracleError::PriceNotFound { symbol, .. }
            | OracleError::SignatureVerification { symbol, .. } => Some(symbol),
            OracleError::Network { symbol, .. } => symbol.as_deref(),
            _ => None,
        }
    }

    /// Attribute a transport failure to `symbol`. Other errors already
    /// carry their own attribution and are returned unchanged.
    pub fn for_symbol(self, symbol: &str) -> Self {
        match self {
            OracleError::Network { source, .. } => OracleError::Network {
                symbol: Some(symbol.to_string()),
                source,
            },
            other => other,
        }
    }

    pub(crate) fn not_found(symbol: &str, requested_time: Option<i64>) -> Self {
        OracleError::PriceNotFound {
            symbol: symbol.to_string(),
            requested_time,
        }
    }
}

impl From<NetworkError> for OracleError {
    fn from(source: NetworkError) -> Self {
        OracleError::Network {
            symbol: None,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OracleError>;
