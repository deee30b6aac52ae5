//! Public entry point
//!
//! `Limestone` wires configuration into a [`RetrievalPipeline`] and exposes
//! the two convenience calls plus the fluent [`QueryBuilder`].

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::pipeline::{PriceResponse, RetrievalPipeline};
use crate::query::{DateInput, QueryBuilder};
use crate::transport::{HttpTransport, PriceTransport};
use crate::verify::{SignatureVerifier, StaticProviderRegistry};

/// One symbol or a set of symbols
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolArg {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for SymbolArg {
    fn from(symbol: &str) -> Self {
        SymbolArg::One(symbol.to_string())
    }
}

impl From<String> for SymbolArg {
    fn from(symbol: String) -> Self {
        SymbolArg::One(symbol)
    }
}

impl From<Vec<String>> for SymbolArg {
    fn from(symbols: Vec<String>) -> Self {
        SymbolArg::Many(symbols)
    }
}

impl From<Vec<&str>> for SymbolArg {
    fn from(symbols: Vec<&str>) -> Self {
        SymbolArg::Many(symbols.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for SymbolArg {
    fn from(symbols: &[&str]) -> Self {
        SymbolArg::Many(symbols.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for SymbolArg {
    fn from(symbols: [&str; N]) -> Self {
        SymbolArg::Many(symbols.iter().map(|s| s.to_string()).collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceOptions {
    pub verify_signature: bool,
}

impl PriceOptions {
    pub fn verified() -> Self {
        Self {
            verify_signature: true,
        }
    }
}

/// Temporal options for [`Limestone::get_historical_price`]
///
/// Set exactly one of `date`, `start_date` + `end_date` (with optional
/// `interval`), or `offset` + `limit`.
#[derive(Debug, Clone, Default)]
pub struct HistoricalOptions {
    pub date: Option<DateInput>,
    pub start_date: Option<DateInput>,
    pub end_date: Option<DateInput>,
    /// Sampling interval in milliseconds
    pub interval: Option<u64>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub verify_signature: bool,
}

impl HistoricalOptions {
    pub fn at(date: impl Into<DateInput>) -> Self {
        Self {
            date: Some(date.into()),
            ..Default::default()
        }
    }

    pub fn range(start: impl Into<DateInput>, end: impl Into<DateInput>) -> Self {
        Self {
            start_date: Some(start.into()),
            end_date: Some(end.into()),
            ..Default::default()
        }
    }

    pub fn page(offset: u64, limit: u64) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn with_interval(mut self, interval_ms: u64) -> Self {
        self.interval = Some(interval_ms);
        self
    }

    pub fn verified(mut self) -> Self {
        self.verify_signature = true;
        self
    }
}

pub struct Limestone {
    pipeline: Arc<RetrievalPipeline>,
}

impl Limestone {
    /// Build a client talking HTTP to the configured oracle node(s).
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let policy = config.trust.policy()?;
        let timeout = config.timeout();

        let registry = StaticProviderRegistry::from_entries(&config.trust.providers)
            .context("Failed to load provider keys")?;
        if registry.is_empty() {
            warn!("No provider keys configured, verified queries will be rejected");
        }
        let providers = registry.len();
        let verifier = SignatureVerifier::new(Arc::new(registry))
            .with_message_version(config.trust.message_version);

        let primary = HttpTransport::new(&config.api_url, timeout)?;
        let mut replicas: Vec<Arc<dyn PriceTransport>> = Vec::new();
        for url in &config.trust.nodes {
            let node = HttpTransport::new(url, timeout)
                .with_context(|| format!("Failed to create transport for {}", url))?;
            replicas.push(Arc::new(node));
        }

        let pipeline = RetrievalPipeline::new(Arc::new(primary), verifier)
            .with_replicas(replicas)
            .with_policy(policy)
            .with_timeout(timeout)
            .with_provider(config.provider.clone());

        info!(
            config = %config,
            providers,
            policy = ?pipeline.policy(),
            message_version = config.trust.message_version,
            "Limestone client ready"
        );
        Ok(Self::with_pipeline(pipeline))
    }

    /// Load [`ClientConfig`] from files and environment, then build.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::load()?;
        Self::new(&config)
    }

    pub fn with_pipeline(pipeline: RetrievalPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Start a fluent query.
    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(Arc::clone(&self.pipeline))
    }

    fn with_symbols(&self, symbols: SymbolArg) -> QueryBuilder {
        match symbols {
            SymbolArg::One(symbol) => self.query().symbol(symbol),
            SymbolArg::Many(symbols) => self.query().symbols(symbols),
        }
    }

    /// Latest price: a single point for one symbol, a map for several.
    pub async fn get_price(
        &self,
        symbols: impl Into<SymbolArg>,
        options: PriceOptions,
    ) -> Result<PriceResponse> {
        self.with_symbols(symbols.into())
            .latest()
            .verify_signature(options.verify_signature)
            .exec()
            .await
    }

    /// Historical price(s) at a date, over a range, or by page.
    pub async fn get_historical_price(
        &self,
        symbols: impl Into<SymbolArg>,
        options: HistoricalOptions,
    ) -> Result<PriceResponse> {
        let mut query = self.with_symbols(symbols.into());
        if let Some(date) = options.date {
            query = query.at_date(date);
        }
        if let Some(start) = options.start_date {
            query = query.from_date(start);
        }
        if let Some(end) = options.end_date {
            query = query.to_date(end);
        }
        if let Some(interval) = options.interval {
            query = query.interval(interval);
        }
        if let Some(offset) = options.offset {
            query = query.offset(offset);
        }
        if let Some(limit) = options.limit {
            query = query.limit(limit);
        }
        query.verify_signature(options.verify_signature).exec().await
    }
}
