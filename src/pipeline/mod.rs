//! Verified retrieval pipeline
//!
//! Executes a finalized [`QueryDescriptor`]: one batched request per node,
//! normalization into per-symbol buckets, the optional verification gate,
//! temporal selection and a single reshaping step at the end. Each symbol
//! settles independently into a `Result`, collapsed only when the caller
//! asks for the reshaped response.

mod response;

pub use response::{PriceResponse, SettledPrices};

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use ethers::types::Address;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::error::{NetworkError, OracleError, Result, VerificationFailure};
use crate::query::{QueryDescriptor, Resolution, SymbolSelector};
use crate::transport::{PriceRequest, PriceTransport, RawPayload};
use crate::types::{PriceDataPoint, RawPricePoint};
use crate::verify::{canonical_value, SignatureVerifier, TrustPolicy};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Symbol reported when an `all_symbols` query finds nothing
pub const ALL_SYMBOLS_LABEL: &str = "all";

type Buckets = BTreeMap<String, Vec<RawPricePoint>>;

pub struct RetrievalPipeline {
    primary: Arc<dyn PriceTransport>,
    /// Extra nodes consulted only for quorum verification
    replicas: Vec<Arc<dyn PriceTransport>>,
    verifier: SignatureVerifier,
    policy: TrustPolicy,
    timeout: Duration,
    provider: Option<String>,
}

impl RetrievalPipeline {
    pub fn new(primary: Arc<dyn PriceTransport>, verifier: SignatureVerifier) -> Self {
        Self {
            primary,
            replicas: Vec::new(),
            verifier,
            policy: TrustPolicy::SingleSigner,
            timeout: DEFAULT_TIMEOUT,
            provider: None,
        }
    }

    pub fn with_replicas(mut self, replicas: Vec<Arc<dyn PriceTransport>>) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_policy(mut self, policy: TrustPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn policy(&self) -> TrustPolicy {
        self.policy
    }

    pub async fn execute(&self, descriptor: QueryDescriptor) -> Result<PriceResponse> {
        self.execute_settled(descriptor).await?.into_response()
    }

    /// Execute without collapsing per-symbol failures.
    ///
    /// Only an `all_symbols` query whose fetch failed outright returns `Err`
    /// here, since there is no symbol to attribute the failure to.
    pub async fn execute_settled(&self, descriptor: QueryDescriptor) -> Result<SettledPrices> {
        let request = PriceRequest::from_descriptor(&descriptor, self.provider.as_deref());
        let resolution = descriptor.resolution();
        let verify = descriptor.verify_signature();
        let quorum = match self.policy {
            TrustPolicy::Quorum { .. } if verify => Some(self.policy.required_signers()),
            _ => None,
        };

        debug!(
            symbols = ?request.symbols,
            mode = ?request.mode,
            verify,
            quorum = ?quorum,
            "Executing price query"
        );

        let node_buckets = match quorum {
            Some(_) => self.fetch_all(&request).await,
            None => self
                .fetch_from(self.primary.as_ref(), &request)
                .await
                .map(|payload| vec![payload.into_buckets()]),
        };

        let symbols: Vec<String> = match descriptor.symbols() {
            SymbolSelector::Single(symbol) => vec![symbol.clone()],
            SymbolSelector::Set(symbols) => symbols.clone(),
            SymbolSelector::All => match &node_buckets {
                Ok(buckets) => buckets
                    .iter()
                    .flat_map(|b| b.keys().cloned())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
                Err(err) => return Err(err.clone()),
            },
        };
        if symbols.is_empty() {
            // Only reachable for all_symbols: the node knows no symbol at all.
            return Err(OracleError::not_found(
                ALL_SYMBOLS_LABEL,
                resolution.requested_time(),
            ));
        }

        let mut results = BTreeMap::new();
        match node_buckets {
            Err(err) => {
                for symbol in &symbols {
                    results.insert(symbol.clone(), Err(err.clone().for_symbol(symbol)));
                }
            }
            Ok(mut node_buckets) => {
                for symbol in &symbols {
                    let per_node: Vec<Vec<RawPricePoint>> = node_buckets
                        .iter_mut()
                        .map(|b| b.remove(symbol).unwrap_or_default())
                        .collect();
                    let settled = match quorum {
                        Some(required) => self.settle_quorum(symbol, per_node, required, resolution),
                        None => self.settle(symbol, per_node.into_iter().flatten(), verify, resolution),
                    };
                    if let Err(err) = &settled {
                        debug!(symbol = %symbol, error = %err, "Symbol settled with error");
                    }
                    results.insert(symbol.clone(), settled);
                }
            }
        }

        Ok(SettledPrices::new(descriptor.shape(), symbols, results))
    }

    async fn fetch_from(
        &self,
        node: &dyn PriceTransport,
        request: &PriceRequest,
    ) -> Result<RawPayload> {
        match tokio::time::timeout(self.timeout, node.fetch(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    node = node.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Oracle request timed out"
                );
                Err(NetworkError::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    /// Query every node concurrently. Fails only if no node answered.
    async fn fetch_all(&self, request: &PriceRequest) -> Result<Vec<Buckets>> {
        let nodes: Vec<&dyn PriceTransport> = std::iter::once(&self.primary)
            .chain(self.replicas.iter())
            .map(|node| node.as_ref())
            .collect();
        let payloads = join_all(nodes.iter().map(|node| self.fetch_from(*node, request))).await;

        let mut buckets = Vec::with_capacity(payloads.len());
        let mut last_err = None;
        for (node, payload) in nodes.iter().zip(payloads) {
            match payload {
                Ok(payload) => buckets.push(payload.into_buckets()),
                Err(err) => {
                    warn!(node = node.name(), error = %err, "Oracle node failed");
                    last_err = Some(err);
                }
            }
        }

        match last_err {
            Some(err) if buckets.is_empty() => Err(err),
            _ => Ok(buckets),
        }
    }

    /// Single-signer settlement: any invalid point fails the symbol.
    fn settle(
        &self,
        symbol: &str,
        raw: impl IntoIterator<Item = RawPricePoint>,
        verify: bool,
        resolution: Resolution,
    ) -> Result<Vec<PriceDataPoint>> {
        let mut points = Vec::new();
        for point in raw {
            point.validate()?;
            if verify {
                points.push(self.verifier.verify(&point)?.point);
            } else {
                points.push(point.into_point());
            }
        }
        select(symbol, points, resolution)
    }

    /// Quorum settlement: a sample counts when `required` distinct signers
    /// agree on its value. Points failing verification on one node are
    /// dropped, but their timestamp still takes part in selection, so a
    /// sample lacking quorum fails the call instead of being skipped.
    fn settle_quorum(
        &self,
        symbol: &str,
        per_node: Vec<Vec<RawPricePoint>>,
        required: usize,
        resolution: Resolution,
    ) -> Result<Vec<PriceDataPoint>> {
        let mut votes: BTreeMap<i64, BTreeMap<String, (HashSet<Address>, PriceDataPoint)>> =
            BTreeMap::new();
        let mut failures: BTreeMap<i64, OracleError> = BTreeMap::new();

        for raw in per_node.into_iter().flatten() {
            let slot = votes.entry(raw.timestamp).or_default();
            let verified = raw.validate().and_then(|_| self.verifier.verify(&raw));
            match verified {
                Ok(verified) => {
                    let point = verified.point;
                    let (signers, _) = slot
                        .entry(canonical_value(point.value))
                        .or_insert_with(|| (HashSet::new(), point.clone()));
                    signers.insert(verified.signer);
                }
                Err(err) => {
                    warn!(symbol, timestamp = raw.timestamp, error = %err, "Dropping unverifiable point");
                    failures.entry(raw.timestamp).or_insert(err);
                }
            }
        }

        let tallies: Vec<Tally> = votes
            .into_iter()
            .map(|(timestamp, candidates)| {
                let best = candidates
                    .into_values()
                    .max_by_key(|(signers, _)| signers.len());
                match best {
                    Some((signers, point)) => Tally {
                        timestamp,
                        agreeing: signers.len(),
                        point: Some(point),
                    },
                    None => Tally {
                        timestamp,
                        agreeing: 0,
                        point: None,
                    },
                }
            })
            .collect();

        let selected: Vec<Tally> = match resolution {
            Resolution::Latest => tallies.into_iter().last().into_iter().collect(),
            Resolution::At(ts) => tallies
                .into_iter()
                .filter(|t| t.timestamp <= ts)
                .last()
                .into_iter()
                .collect(),
            Resolution::Window { .. } | Resolution::Page { .. } => tallies,
        };
        if selected.is_empty() {
            return Err(OracleError::not_found(symbol, resolution.requested_time()));
        }

        let mut accepted = Vec::with_capacity(selected.len());
        for tally in selected {
            match tally.point {
                Some(point) if tally.agreeing >= required => accepted.push(point),
                _ => {
                    if tally.agreeing == 0 {
                        if let Some(err) = failures.remove(&tally.timestamp) {
                            return Err(err);
                        }
                    }
                    return Err(OracleError::SignatureVerification {
                        symbol: symbol.to_string(),
                        timestamp: tally.timestamp,
                        reason: VerificationFailure::InsufficientQuorum {
                            required,
                            agreeing: tally.agreeing,
                        },
                    });
                }
            }
        }
        select(symbol, accepted, resolution)
    }
}

/// Agreement reached on one timestamp across all nodes
struct Tally {
    timestamp: i64,
    agreeing: usize,
    point: Option<PriceDataPoint>,
}

/// Apply the temporal resolution to one symbol's points.
fn select(
    symbol: &str,
    points: Vec<PriceDataPoint>,
    resolution: Resolution,
) -> Result<Vec<PriceDataPoint>> {
    let not_found = || OracleError::not_found(symbol, resolution.requested_time());

    match resolution {
        Resolution::Latest => points
            .into_iter()
            .max_by_key(|p| p.timestamp)
            .map(|p| vec![p])
            .ok_or_else(not_found),
        // Never hand out a sample from after the requested instant.
        Resolution::At(ts) => points
            .into_iter()
            .filter(|p| p.timestamp <= ts)
            .max_by_key(|p| p.timestamp)
            .map(|p| vec![p])
            .ok_or_else(not_found),
        Resolution::Window { .. } => {
            if points.is_empty() {
                return Err(not_found());
            }
            Ok(monotonic(points))
        }
        Resolution::Page { limit, .. } => {
            if points.is_empty() {
                return Err(not_found());
            }
            let mut points = monotonic(points);
            points.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(points)
        }
    }
}

/// Keep upstream order when it is monotonic in time, otherwise sort ascending.
fn monotonic(mut points: Vec<PriceDataPoint>) -> Vec<PriceDataPoint> {
    let ascending = points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp);
    let descending = points.windows(2).all(|w| w[0].timestamp >= w[1].timestamp);
    if !ascending && !descending {
        points.sort_by_key(|p| p.timestamp);
    }
    points
}
