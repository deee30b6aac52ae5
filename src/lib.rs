//! Limestone
//!
//! Client for the Limestone decentralized price oracle: fluent price queries
//! and signature-verified retrieval.

pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod telemetry;
pub mod transport;
pub mod types;
pub mod verify;

pub use client::{HistoricalOptions, Limestone, PriceOptions, SymbolArg};
pub use error::{NetworkError, OracleError, SelectorKind, VerificationFailure};
pub use pipeline::{PriceResponse, RetrievalPipeline, SettledPrices};
pub use query::{DateInput, QueryBuilder, QueryDescriptor};
pub use types::PriceDataPoint;
