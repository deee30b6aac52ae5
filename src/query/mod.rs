//! Fluent query compiler
//!
//! Chained selector calls accumulate into a [`QueryBuilder`]. The terminal
//! call validates the accumulated state once and freezes it into an immutable
//! [`QueryDescriptor`], so the retrieval pipeline only ever sees unambiguous
//! requests.

mod date;

pub use date::DateInput;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::error::{OracleError, Result, SelectorKind};
use crate::pipeline::{PriceResponse, RetrievalPipeline, SettledPrices};

pub const HOUR_MS: i64 = 60 * 60 * 1000;
pub const DAY_MS: i64 = 24 * HOUR_MS;
/// Sampling interval for `for_last_hours` windows
pub const SHORT_WINDOW_INTERVAL_MS: u64 = 10 * 60 * 1000;
/// Sampling interval for day windows and ranges without an explicit interval
pub const DEFAULT_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// Which symbols a query covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolSelector {
    Single(String),
    /// Non-empty, unique, in caller order
    Set(Vec<String>),
    All,
}

impl SymbolSelector {
    pub fn is_single(&self) -> bool {
        matches!(self, SymbolSelector::Single(_))
    }
}

/// Which point(s) in time a query covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemporalSelector {
    Latest,
    AtDate(i64),
    HoursAgo(u32),
    ForLastHours(u32),
    ForLastDays(u32),
    Range {
        from: i64,
        to: i64,
        interval_ms: Option<u64>,
    },
    Paged {
        offset: u64,
        limit: u64,
    },
}

impl TemporalSelector {
    /// True when the selector yields one sample per symbol
    pub fn is_single_point(&self) -> bool {
        matches!(
            self,
            TemporalSelector::Latest | TemporalSelector::AtDate(_) | TemporalSelector::HoursAgo(_)
        )
    }
}

/// Temporal selector resolved against the anchor instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Latest,
    At(i64),
    Window { from: i64, to: i64, interval_ms: u64 },
    Page { offset: u64, limit: u64 },
}

impl Resolution {
    /// Timestamp to report in `PriceNotFound`
    pub fn requested_time(&self) -> Option<i64> {
        match self {
            Resolution::At(ts) => Some(*ts),
            Resolution::Window { to, .. } => Some(*to),
            Resolution::Latest | Resolution::Page { .. } => None,
        }
    }
}

/// Shape of the value handed back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Point,
    Series,
    PointMap,
    SeriesMap,
}

/// Finalized, immutable request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    symbols: SymbolSelector,
    temporal: TemporalSelector,
    verify_signature: bool,
    anchor_ms: i64,
}

impl QueryDescriptor {
    pub fn symbols(&self) -> &SymbolSelector {
        &self.symbols
    }

    pub fn temporal(&self) -> &TemporalSelector {
        &self.temporal
    }

    pub fn verify_signature(&self) -> bool {
        self.verify_signature
    }

    /// Instant captured when the query was finalized
    pub fn anchor_ms(&self) -> i64 {
        self.anchor_ms
    }

    pub fn shape(&self) -> ResponseShape {
        match (self.symbols.is_single(), self.temporal.is_single_point()) {
            (true, true) => ResponseShape::Point,
            (true, false) => ResponseShape::Series,
            (false, true) => ResponseShape::PointMap,
            (false, false) => ResponseShape::SeriesMap,
        }
    }

    pub fn resolution(&self) -> Resolution {
        let anchor = self.anchor_ms;
        match &self.temporal {
            TemporalSelector::Latest => Resolution::Latest,
            TemporalSelector::AtDate(ts) => Resolution::At(*ts),
            TemporalSelector::HoursAgo(n) => Resolution::At(anchor - i64::from(*n) * HOUR_MS),
            TemporalSelector::ForLastHours(n) => Resolution::Window {
                from: anchor - i64::from(*n) * HOUR_MS,
                to: anchor,
                interval_ms: SHORT_WINDOW_INTERVAL_MS,
            },
            TemporalSelector::ForLastDays(n) => Resolution::Window {
                from: anchor - i64::from(*n) * DAY_MS,
                to: anchor,
                interval_ms: DEFAULT_INTERVAL_MS,
            },
            TemporalSelector::Range {
                from,
                to,
                interval_ms,
            } => Resolution::Window {
                from: *from,
                to: *to,
                interval_ms: interval_ms.unwrap_or(DEFAULT_INTERVAL_MS),
            },
            TemporalSelector::Paged { offset, limit } => Resolution::Page {
                offset: *offset,
                limit: *limit,
            },
        }
    }
}

/// Temporal state while the builder is still accumulating
#[derive(Debug, Clone, PartialEq)]
enum TemporalDraft {
    Done(TemporalSelector),
    Range {
        from: Option<i64>,
        to: Option<i64>,
        interval_ms: Option<u64>,
    },
    Paged {
        offset: Option<u64>,
        limit: Option<u64>,
    },
}

/// Single-use fluent query builder
///
/// Setters never fail on their own; the first problem they hit is kept and
/// raised by the terminal call, before any request is sent.
pub struct QueryBuilder {
    pipeline: Arc<RetrievalPipeline>,
    symbols: Option<SymbolSelector>,
    temporal: Option<TemporalDraft>,
    verify_signature: bool,
    error: Option<OracleError>,
}

impl QueryBuilder {
    pub fn new(pipeline: Arc<RetrievalPipeline>) -> Self {
        Self {
            pipeline,
            symbols: None,
            temporal: None,
            verify_signature: false,
            error: None,
        }
    }

    fn fail(mut self, err: OracleError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    fn invalid(self, kind: SelectorKind, reason: impl Into<String>) -> Self {
        self.fail(OracleError::InvalidSelector {
            kind,
            reason: reason.into(),
        })
    }

    fn set_symbols(mut self, selector: SymbolSelector) -> Self {
        if self.symbols.is_some() {
            return self.fail(OracleError::ConflictingSelector {
                kind: SelectorKind::Symbol,
            });
        }
        self.symbols = Some(selector);
        self
    }

    fn set_temporal(mut self, selector: TemporalSelector) -> Self {
        if self.temporal.is_some() {
            return self.fail(OracleError::ConflictingSelector {
                kind: SelectorKind::Temporal,
            });
        }
        self.temporal = Some(TemporalDraft::Done(selector));
        self
    }

    fn parse_date(self, date: DateInput) -> std::result::Result<(Self, i64), Self> {
        match date.to_millis() {
            Ok(ms) => Ok((self, ms)),
            Err(err) => Err(self.fail(err)),
        }
    }

    pub fn symbol(self, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return self.invalid(SelectorKind::Symbol, "symbol must not be empty");
        }
        self.set_symbols(SymbolSelector::Single(symbol))
    }

    pub fn symbols<I, S>(self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        if symbols.is_empty() {
            return self.invalid(SelectorKind::Symbol, "symbol set must not be empty");
        }
        if symbols.iter().any(|s| s.trim().is_empty()) {
            return self.invalid(SelectorKind::Symbol, "symbol must not be empty");
        }
        let mut seen = HashSet::new();
        if let Some(dup) = symbols.iter().find(|s| !seen.insert(s.as_str())) {
            let reason = format!("duplicate symbol {}", dup);
            return self.invalid(SelectorKind::Symbol, reason);
        }
        self.set_symbols(SymbolSelector::Set(symbols))
    }

    pub fn all_symbols(self) -> Self {
        self.set_symbols(SymbolSelector::All)
    }

    pub fn latest(self) -> Self {
        self.set_temporal(TemporalSelector::Latest)
    }

    pub fn at_date(self, date: impl Into<DateInput>) -> Self {
        match self.parse_date(date.into()) {
            Ok((builder, ms)) => builder.set_temporal(TemporalSelector::AtDate(ms)),
            Err(builder) => builder,
        }
    }

    pub fn hours_ago(self, hours: u32) -> Self {
        if hours == 0 {
            return self.invalid(SelectorKind::Temporal, "hours_ago must be positive");
        }
        self.set_temporal(TemporalSelector::HoursAgo(hours))
    }

    pub fn for_last_hours(self, hours: u32) -> Self {
        if hours == 0 {
            return self.invalid(SelectorKind::Temporal, "for_last_hours must be positive");
        }
        self.set_temporal(TemporalSelector::ForLastHours(hours))
    }

    pub fn for_last_days(self, days: u32) -> Self {
        if days == 0 {
            return self.invalid(SelectorKind::Temporal, "for_last_days must be positive");
        }
        self.set_temporal(TemporalSelector::ForLastDays(days))
    }

    /// Start of a range; pair with [`QueryBuilder::to_date`].
    pub fn from_date(self, date: impl Into<DateInput>) -> Self {
        let (builder, ms) = match self.parse_date(date.into()) {
            Ok(parsed) => parsed,
            Err(builder) => return builder,
        };
        builder.update_range(|from, _, _| from.replace(ms).is_none())
    }

    /// End of a range; pair with [`QueryBuilder::from_date`].
    pub fn to_date(self, date: impl Into<DateInput>) -> Self {
        let (builder, ms) = match self.parse_date(date.into()) {
            Ok(parsed) => parsed,
            Err(builder) => return builder,
        };
        builder.update_range(|_, to, _| to.replace(ms).is_none())
    }

    /// Sampling interval of a range, in milliseconds.
    pub fn interval(self, interval_ms: u64) -> Self {
        if interval_ms == 0 {
            return self.invalid(SelectorKind::Temporal, "interval must be positive");
        }
        self.update_range(|_, _, interval| interval.replace(interval_ms).is_none())
    }

    /// Skip the `offset` most recent samples; pair with [`QueryBuilder::limit`].
    pub fn offset(self, offset: u64) -> Self {
        self.update_page(|off, _| off.replace(offset).is_none())
    }

    pub fn limit(self, limit: u64) -> Self {
        if limit == 0 {
            return self.invalid(SelectorKind::Temporal, "limit must be positive");
        }
        self.update_page(|_, lim| lim.replace(limit).is_none())
    }

    fn update_range<F>(mut self, apply: F) -> Self
    where
        F: FnOnce(&mut Option<i64>, &mut Option<i64>, &mut Option<u64>) -> bool,
    {
        let draft = self.temporal.get_or_insert(TemporalDraft::Range {
            from: None,
            to: None,
            interval_ms: None,
        });
        let fresh = match draft {
            TemporalDraft::Range {
                from,
                to,
                interval_ms,
            } => apply(from, to, interval_ms),
            _ => false,
        };
        if fresh {
            self
        } else {
            self.fail(OracleError::ConflictingSelector {
                kind: SelectorKind::Temporal,
            })
        }
    }

    fn update_page<F>(mut self, apply: F) -> Self
    where
        F: FnOnce(&mut Option<u64>, &mut Option<u64>) -> bool,
    {
        let draft = self.temporal.get_or_insert(TemporalDraft::Paged {
            offset: None,
            limit: None,
        });
        let fresh = match draft {
            TemporalDraft::Paged { offset, limit } => apply(offset, limit),
            _ => false,
        };
        if fresh {
            self
        } else {
            self.fail(OracleError::ConflictingSelector {
                kind: SelectorKind::Temporal,
            })
        }
    }

    pub fn verify_signature(mut self, verify: bool) -> Self {
        self.verify_signature = verify;
        self
    }

    /// Validate and freeze against an explicit anchor instant.
    pub fn compile_at(&self, anchor_ms: i64) -> Result<QueryDescriptor> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let symbols = self.symbols.clone().ok_or(OracleError::MissingSelector {
            kind: SelectorKind::Symbol,
        })?;
        let draft = self.temporal.as_ref().ok_or(OracleError::MissingSelector {
            kind: SelectorKind::Temporal,
        })?;
        let temporal = finalize_temporal(draft)?;

        Ok(QueryDescriptor {
            symbols,
            temporal,
            verify_signature: self.verify_signature,
            anchor_ms,
        })
    }

    /// Validate and freeze, anchoring relative selectors at the current instant.
    pub fn build(&self) -> Result<QueryDescriptor> {
        self.compile_at(Utc::now().timestamp_millis())
    }

    /// Run the query and reshape the result.
    pub async fn exec(self) -> Result<PriceResponse> {
        let descriptor = self.build()?;
        self.pipeline.execute(descriptor).await
    }

    /// Run the query keeping each symbol's outcome separate.
    pub async fn exec_settled(self) -> Result<SettledPrices> {
        let descriptor = self.build()?;
        self.pipeline.execute_settled(descriptor).await
    }
}

fn finalize_temporal(draft: &TemporalDraft) -> Result<TemporalSelector> {
    let incomplete = |missing| OracleError::IncompleteSelector {
        kind: SelectorKind::Temporal,
        missing,
    };
    match draft {
        TemporalDraft::Done(selector) => Ok(selector.clone()),
        TemporalDraft::Range {
            from,
            to,
            interval_ms,
        } => {
            let from = from.ok_or_else(|| incomplete("fromDate"))?;
            let to = to.ok_or_else(|| incomplete("toDate"))?;
            if from > to {
                return Err(OracleError::InvalidSelector {
                    kind: SelectorKind::Temporal,
                    reason: format!("range start {} is after end {}", from, to),
                });
            }
            Ok(TemporalSelector::Range {
                from,
                to,
                interval_ms: *interval_ms,
            })
        }
        TemporalDraft::Paged { offset, limit } => Ok(TemporalSelector::Paged {
            offset: offset.ok_or_else(|| incomplete("offset"))?,
            limit: limit.ok_or_else(|| incomplete("limit"))?,
        }),
    }
}
