//! Reshaped query results

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{OracleError, Result};
use crate::query::ResponseShape;
use crate::types::PriceDataPoint;

/// Query result, shaped by the symbol and temporal selectors
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PriceResponse {
    Single(PriceDataPoint),
    Series(Vec<PriceDataPoint>),
    Map(BTreeMap<String, PriceDataPoint>),
    SeriesMap(BTreeMap<String, Vec<PriceDataPoint>>),
}

impl PriceResponse {
    pub fn shape(&self) -> ResponseShape {
        match self {
            PriceResponse::Single(_) => ResponseShape::Point,
            PriceResponse::Series(_) => ResponseShape::Series,
            PriceResponse::Map(_) => ResponseShape::PointMap,
            PriceResponse::SeriesMap(_) => ResponseShape::SeriesMap,
        }
    }

    pub fn into_single(self) -> Option<PriceDataPoint> {
        match self {
            PriceResponse::Single(point) => Some(point),
            _ => None,
        }
    }

    pub fn into_series(self) -> Option<Vec<PriceDataPoint>> {
        match self {
            PriceResponse::Series(points) => Some(points),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<BTreeMap<String, PriceDataPoint>> {
        match self {
            PriceResponse::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_series_map(self) -> Option<BTreeMap<String, Vec<PriceDataPoint>>> {
        match self {
            PriceResponse::SeriesMap(map) => Some(map),
            _ => None,
        }
    }
}

/// Per-symbol outcomes of one query, before reshaping
#[derive(Debug, Clone)]
pub struct SettledPrices {
    shape: ResponseShape,
    symbols: Vec<String>,
    results: BTreeMap<String, Result<Vec<PriceDataPoint>>>,
}

impl SettledPrices {
    pub(crate) fn new(
        shape: ResponseShape,
        symbols: Vec<String>,
        results: BTreeMap<String, Result<Vec<PriceDataPoint>>>,
    ) -> Self {
        Self {
            shape,
            symbols,
            results,
        }
    }

    pub fn shape(&self) -> ResponseShape {
        self.shape
    }

    /// Symbols in request order (sorted for `all_symbols`)
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn get(&self, symbol: &str) -> Option<&Result<Vec<PriceDataPoint>>> {
        self.results.get(symbol)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &OracleError)> {
        self.symbols.iter().filter_map(|symbol| match self.results.get(symbol) {
            Some(Err(err)) => Some((symbol.as_str(), err)),
            _ => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Collapse into the caller-facing shape.
    ///
    /// The first failing symbol in request order becomes the error; a map is
    /// never returned with a symbol silently missing.
    pub fn into_response(self) -> Result<PriceResponse> {
        let SettledPrices {
            shape,
            symbols,
            mut results,
        } = self;

        let mut take = |symbol: &str| -> Result<Vec<PriceDataPoint>> {
            results
                .remove(symbol)
                .unwrap_or_else(|| Err(OracleError::not_found(symbol, None)))
        };
        let first = |symbol: &str, points: Vec<PriceDataPoint>| {
            points
                .into_iter()
                .next()
                .ok_or_else(|| OracleError::not_found(symbol, None))
        };

        match shape {
            ResponseShape::Point => {
                let symbol = symbols.first().map(String::as_str).unwrap_or_default();
                let points = take(symbol)?;
                Ok(PriceResponse::Single(first(symbol, points)?))
            }
            ResponseShape::Series => {
                let symbol = symbols.first().map(String::as_str).unwrap_or_default();
                Ok(PriceResponse::Series(take(symbol)?))
            }
            ResponseShape::PointMap => {
                let mut map = BTreeMap::new();
                for symbol in &symbols {
                    let points = take(symbol)?;
                    map.insert(symbol.clone(), first(symbol, points)?);
                }
                Ok(PriceResponse::Map(map))
            }
            ResponseShape::SeriesMap => {
                let mut map = BTreeMap::new();
                for symbol in &symbols {
                    map.insert(symbol.clone(), take(symbol)?);
                }
                Ok(PriceResponse::SeriesMap(map))
            }
        }
    }
}
