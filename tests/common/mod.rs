//! Shared fixtures: an in-memory oracle node and signing helpers

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};

use limestone::error::Result;
use limestone::transport::{PriceRequest, PriceTransport, RawPayload, RawSeries};
use limestone::types::RawPricePoint;
use limestone::verify::{sign_point, SignatureVerifier, StaticProviderRegistry};
use limestone::{Limestone, RetrievalPipeline};

pub const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945387dc9f5a59e86cdc84e64546a1d8f76d59";
pub const KEY_C: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9d804cdb365ab";

pub const MINUTE_MS: i64 = 60 * 1000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
/// 2021-04-19T00:00:00Z
pub const APRIL_19: i64 = 1_618_790_400_000;

type Responder = Box<dyn Fn(&PriceRequest) -> Result<RawPayload> + Send + Sync>;

/// Oracle node answering from a closure and recording every request
pub struct FakeNode {
    name: String,
    delay: Option<Duration>,
    responder: Responder,
    calls: Mutex<Vec<PriceRequest>>,
}

impl FakeNode {
    pub fn new<F>(name: &str, responder: F) -> Arc<Self>
    where
        F: Fn(&PriceRequest) -> Result<RawPayload> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            delay: None,
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn slow<F>(name: &str, delay: Duration, responder: F) -> Arc<Self>
    where
        F: Fn(&PriceRequest) -> Result<RawPayload> + Send + Sync + 'static,
    {
        Arc::new(Self {
            name: name.to_string(),
            delay: Some(delay),
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Node that always returns the same payload
    pub fn fixed(name: &str, payload: RawPayload) -> Arc<Self> {
        Self::new(name, move |_| Ok(payload.clone()))
    }

    pub fn calls(&self) -> Vec<PriceRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PriceTransport for FakeNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, request: &PriceRequest) -> Result<RawPayload> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(request)
    }
}

pub fn wallet(key: &str) -> LocalWallet {
    key.parse().unwrap()
}

/// Verifier trusting each `(provider id, wallet)` pair
pub fn verifier(providers: &[(&str, &LocalWallet)]) -> SignatureVerifier {
    let mut registry = StaticProviderRegistry::new();
    for (id, wallet) in providers {
        registry.insert(*id, wallet.address());
    }
    SignatureVerifier::new(Arc::new(registry))
}

/// Client over a single node trusting provider `limestone` = `KEY_A`
pub fn client(node: Arc<FakeNode>) -> Limestone {
    let signer = wallet(KEY_A);
    Limestone::with_pipeline(RetrievalPipeline::new(node, verifier(&[("limestone", &signer)])))
}

pub fn raw(symbol: &str, value: f64, timestamp: i64) -> RawPricePoint {
    RawPricePoint::new(symbol, value, timestamp)
}

/// Raw point signed by `wallet` on behalf of `provider`
pub async fn signed(
    wallet: &LocalWallet,
    provider: &str,
    symbol: &str,
    value: f64,
    timestamp: i64,
) -> RawPricePoint {
    let mut point = raw(symbol, value, timestamp);
    point.provider = Some(provider.to_string());
    sign_point(wallet, &mut point, "0.4").await.unwrap();
    point
}

pub fn keyed(points: Vec<RawPricePoint>) -> RawPayload {
    let map: BTreeMap<String, RawSeries> = points
        .into_iter()
        .map(|p| (p.symbol.clone(), RawSeries::One(p)))
        .collect();
    RawPayload::Keyed(map)
}

/// Evenly spaced samples in `[from, to)`
pub fn series(symbol: &str, from: i64, to: i64, interval_ms: i64) -> Vec<RawPricePoint> {
    let mut points = Vec::new();
    let mut ts = from;
    while ts < to {
        points.push(raw(symbol, 24.0 + (ts - from) as f64 / 1e9, ts));
        ts += interval_ms;
    }
    points
}
