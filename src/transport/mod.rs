//! Oracle transport boundary
//!
//! The pipeline talks to oracle nodes through [`PriceTransport`]. A request
//! carries logical parameters only; [`HttpTransport`] maps them onto the
//! node's `/prices` endpoint.

mod http;

pub use http::HttpTransport;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::query::{QueryDescriptor, Resolution, SymbolSelector};
use crate::types::RawPricePoint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSymbols {
    One(String),
    /// Batched in a single call
    Many(Vec<String>),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Latest,
    /// Closest sample at or before `to_timestamp`
    At { to_timestamp: i64 },
    Range {
        from_timestamp: i64,
        to_timestamp: i64,
        interval_ms: u64,
    },
    Page { offset: u64, limit: u64 },
}

/// One logical call to an oracle node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub symbols: RequestSymbols,
    pub mode: RequestMode,
    pub provider: Option<String>,
}

impl PriceRequest {
    pub fn from_descriptor(descriptor: &QueryDescriptor, provider: Option<&str>) -> Self {
        let symbols = match descriptor.symbols() {
            SymbolSelector::Single(symbol) => RequestSymbols::One(symbol.clone()),
            SymbolSelector::Set(symbols) => RequestSymbols::Many(symbols.clone()),
            SymbolSelector::All => RequestSymbols::All,
        };
        let mode = match descriptor.resolution() {
            Resolution::Latest => RequestMode::Latest,
            Resolution::At(ts) => RequestMode::At { to_timestamp: ts },
            Resolution::Window {
                from,
                to,
                interval_ms,
            } => RequestMode::Range {
                from_timestamp: from,
                to_timestamp: to,
                interval_ms,
            },
            Resolution::Page { offset, limit } => RequestMode::Page { offset, limit },
        };
        Self {
            symbols,
            mode,
            provider: provider.map(str::to_string),
        }
    }

    /// Query-string parameters understood by oracle nodes
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(provider) = &self.provider {
            params.push(("provider", provider.clone()));
        }

        let single = match &self.symbols {
            RequestSymbols::One(symbol) => {
                params.push(("symbol", symbol.clone()));
                true
            }
            RequestSymbols::Many(symbols) => {
                params.push(("symbols", symbols.join(",")));
                false
            }
            RequestSymbols::All => false,
        };

        match self.mode {
            RequestMode::Latest => {
                if single {
                    params.push(("limit", "1".to_string()));
                }
            }
            RequestMode::At { to_timestamp } => {
                params.push(("toTimestamp", to_timestamp.to_string()));
                if single {
                    params.push(("limit", "1".to_string()));
                }
            }
            RequestMode::Range {
                from_timestamp,
                to_timestamp,
                interval_ms,
            } => {
                params.push(("fromTimestamp", from_timestamp.to_string()));
                params.push(("toTimestamp", to_timestamp.to_string()));
                params.push(("interval", interval_ms.to_string()));
            }
            RequestMode::Page { offset, limit } => {
                params.push(("offset", offset.to_string()));
                params.push(("limit", limit.to_string()));
            }
        }
        params
    }
}

/// Per-symbol entry of a keyed response
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawSeries {
    Many(Vec<RawPricePoint>),
    One(RawPricePoint),
}

impl RawSeries {
    pub fn into_vec(self) -> Vec<RawPricePoint> {
        match self {
            RawSeries::Many(points) => points,
            RawSeries::One(point) => vec![point],
        }
    }
}

/// Response body in any of the shapes an oracle node produces
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    Sequence(Vec<RawPricePoint>),
    Point(RawPricePoint),
    Keyed(BTreeMap<String, RawSeries>),
}

impl RawPayload {
    /// Group points by symbol. Keys of a keyed payload win over the
    /// symbol field of the points inside.
    pub fn into_buckets(self) -> BTreeMap<String, Vec<RawPricePoint>> {
        let mut buckets: BTreeMap<String, Vec<RawPricePoint>> = BTreeMap::new();
        match self {
            RawPayload::Sequence(points) => {
                for point in points {
                    buckets.entry(point.symbol.clone()).or_default().push(point);
                }
            }
            RawPayload::Point(point) => {
                buckets.entry(point.symbol.clone()).or_default().push(point);
            }
            RawPayload::Keyed(map) => {
                for (symbol, series) in map {
                    let points = series
                        .into_vec()
                        .into_iter()
                        .map(|mut p| {
                            p.symbol = symbol.clone();
                            p
                        })
                        .collect::<Vec<_>>();
                    buckets.entry(symbol).or_default().extend(points);
                }
            }
        }
        buckets
    }
}

/// A connection to one oracle node
#[async_trait]
pub trait PriceTransport: Send + Sync {
    /// Node name for logs
    fn name(&self) -> &str;

    async fn fetch(&self, request: &PriceRequest) -> Result<RawPayload>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(request: &PriceRequest) -> Vec<(&'static str, String)> {
        request.query_params()
    }

    #[test]
    fn test_single_latest_params() {
        let request = PriceRequest {
            symbols: RequestSymbols::One("AR".to_string()),
            mode: RequestMode::Latest,
            provider: Some("limestone".to_string()),
        };
        assert_eq!(
            params(&request),
            vec![
                ("provider", "limestone".to_string()),
                ("symbol", "AR".to_string()),
                ("limit", "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_symbol_set_is_one_batched_param() {
        let request = PriceRequest {
            symbols: RequestSymbols::Many(vec!["AR".into(), "ETH".into(), "BTC".into()]),
            mode: RequestMode::At {
                to_timestamp: 1_618_617_600_000,
            },
            provider: None,
        };
        assert_eq!(
            params(&request),
            vec![
                ("symbols", "AR,ETH,BTC".to_string()),
                ("toTimestamp", "1618617600000".to_string()),
            ]
        );
    }

    #[test]
    fn test_range_and_page_params() {
        let range = PriceRequest {
            symbols: RequestSymbols::All,
            mode: RequestMode::Range {
                from_timestamp: 1,
                to_timestamp: 2,
                interval_ms: 600_000,
            },
            provider: None,
        };
        assert_eq!(
            params(&range),
            vec![
                ("fromTimestamp", "1".to_string()),
                ("toTimestamp", "2".to_string()),
                ("interval", "600000".to_string()),
            ]
        );

        let page = PriceRequest {
            symbols: RequestSymbols::One("AR".to_string()),
            mode: RequestMode::Page {
                offset: 1000,
                limit: 100,
            },
            provider: None,
        };
        assert!(params(&page).contains(&("offset", "1000".to_string())));
        assert!(params(&page).contains(&("limit", "100".to_string())));
    }

    #[test]
    fn test_payload_shapes_parse() {
        let seq: RawPayload = serde_json::from_str(
            r#"[{"symbol":"AR","value":1.5,"timestamp":2},{"symbol":"AR","value":1.6,"timestamp":1}]"#,
        )
        .unwrap();
        assert!(matches!(seq, RawPayload::Sequence(ref v) if v.len() == 2));

        let point: RawPayload =
            serde_json::from_str(r#"{"symbol":"AR","value":1.5,"timestamp":2}"#).unwrap();
        assert!(matches!(point, RawPayload::Point(_)));

        let keyed: RawPayload = serde_json::from_str(
            r#"{"AR":{"symbol":"AR","value":1.5,"timestamp":2},"ETH":[{"symbol":"ETH","value":3.0,"timestamp":2}]}"#,
        )
        .unwrap();
        let buckets = keyed.into_buckets();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets["ETH"][0].value, 3.0);
    }

    #[test]
    fn test_sequence_buckets_by_symbol() {
        let payload = RawPayload::Sequence(vec![
            RawPricePoint::new("AR", 1.0, 1),
            RawPricePoint::new("ETH", 2.0, 1),
            RawPricePoint::new("AR", 1.1, 2),
        ]);
        let buckets = payload.into_buckets();
        assert_eq!(buckets["AR"].len(), 2);
        assert_eq!(buckets["ETH"].len(), 1);
    }
}
