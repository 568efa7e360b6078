//! Provider selection strategies.
//!
//! The engine is a pure function of its [`SelectionContext`] apart from the
//! round-robin counter, which lives here so it is shared across calls of one
//! factory.

use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use thiserror::Error;

use scribe_common::{AbTestSettings, SelectionStrategy};

use crate::catalog::PerformanceProfile;

/// Duration assumed by cost ranking when the caller supplies none.
pub const NOMINAL_DURATION_SECS: f64 = 60.0;

/// Key hashed by the A/B strategy when the request carries none.
pub const DEFAULT_SELECTION_KEY: &str = "default";

/// An enabled, registered provider eligible for selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub profile: PerformanceProfile,
    /// Estimated cost of this request on this provider
    pub cost: f64,
    /// Recorded average latency, if any call has been timed
    pub average_latency_ms: Option<f64>,
}

/// Inputs for one selection.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    /// Candidates; order does not matter
    pub candidates: Vec<Candidate>,
    /// Explicit, pinned or manual-default provider
    pub preferred: Option<String>,
    pub strategy: SelectionStrategy,
    pub fallback_enabled: bool,
    /// Stable caller key for the A/B strategy
    pub key: Option<String>,
    pub ab_test: AbTestSettings,
}

impl SelectionContext {
    fn contains(&self, id: &str) -> bool {
        self.candidates.iter().any(|c| c.id == id)
    }
}

/// Outcome of a successful selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub provider: String,
    /// Preferred provider that was unavailable and got replaced
    pub substituted_for: Option<String>,
}

impl Selection {
    fn direct(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            substituted_for: None,
        }
    }
}

/// Why no provider could be chosen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("No providers are enabled and configured")]
    NoCandidates,

    #[error("Provider '{0}' is not enabled or not configured, and fallback is disabled")]
    Unavailable(String),

    #[error("Manual selection requires a preferred provider")]
    NoPreference,
}

/// Chooses one provider per request.
#[derive(Debug, Default)]
pub struct SelectionEngine {
    round_robin: AtomicUsize,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose a provider for the context.
    ///
    /// A preferred provider wins when it is a candidate. When it is not, the
    /// engine substitutes the next best candidate if fallback is enabled and
    /// fails otherwise.
    pub fn select(&self, ctx: &SelectionContext) -> Result<Selection, SelectionError> {
        if ctx.candidates.is_empty() {
            return Err(SelectionError::NoCandidates);
        }

        if let Some(ref preferred) = ctx.preferred {
            if ctx.contains(preferred) {
                return Ok(Selection::direct(preferred.clone()));
            }
            return self.substitute(ctx, preferred);
        }

        match ctx.strategy {
            SelectionStrategy::Manual => Err(SelectionError::NoPreference),
            SelectionStrategy::RoundRobin => Ok(Selection::direct(self.next_round_robin(ctx))),
            SelectionStrategy::AbTest => {
                let variant = ab_variant(ctx);
                if ctx.contains(&variant) {
                    Ok(Selection::direct(variant))
                } else {
                    self.substitute(ctx, &variant)
                }
            }
            strategy => rank(strategy, &ctx.candidates)
                .first()
                .map(|c| Selection::direct(c.id.clone()))
                .ok_or(SelectionError::NoCandidates),
        }
    }

    /// Best candidate other than `exclude`, ranked for fallback.
    pub fn next_best(&self, ctx: &SelectionContext, exclude: &str) -> Option<String> {
        let remaining: Vec<Candidate> = ctx
            .candidates
            .iter()
            .filter(|c| c.id != exclude)
            .cloned()
            .collect();
        rank(fallback_strategy(ctx.strategy), &remaining)
            .first()
            .map(|c| c.id.clone())
    }

    fn substitute(
        &self,
        ctx: &SelectionContext,
        unavailable: &str,
    ) -> Result<Selection, SelectionError> {
        if !ctx.fallback_enabled {
            return Err(SelectionError::Unavailable(unavailable.to_string()));
        }

        let provider = match ctx.strategy {
            SelectionStrategy::RoundRobin => self.next_round_robin(ctx),
            _ => self
                .next_best(ctx, unavailable)
                .ok_or(SelectionError::NoCandidates)?,
        };

        tracing::warn!(
            preferred = %unavailable,
            provider = %provider,
            "Preferred provider unavailable, substituting"
        );

        Ok(Selection {
            provider,
            substituted_for: Some(unavailable.to_string()),
        })
    }

    fn next_round_robin(&self, ctx: &SelectionContext) -> String {
        let mut ids: Vec<&str> = ctx.candidates.iter().map(|c| c.id.as_str()).collect();
        ids.sort_unstable();
        let turn = self.round_robin.fetch_add(1, AtomicOrdering::SeqCst);
        ids[turn % ids.len()].to_string()
    }
}

/// Strategy used to rank fallback candidates.
///
/// Strategies without an intrinsic order fall back by performance.
fn fallback_strategy(strategy: SelectionStrategy) -> SelectionStrategy {
    match strategy {
        SelectionStrategy::CostOptimized | SelectionStrategy::QualityOptimized => strategy,
        _ => SelectionStrategy::PerformanceOptimized,
    }
}

/// Order candidates best-first for a ranking strategy.
pub fn rank(strategy: SelectionStrategy, candidates: &[Candidate]) -> Vec<&Candidate> {
    let mut ranked: Vec<&Candidate> = candidates.iter().collect();
    match strategy {
        SelectionStrategy::CostOptimized => ranked.sort_by(|a, b| {
            a.cost
                .partial_cmp(&b.cost)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        }),
        SelectionStrategy::QualityOptimized => ranked.sort_by(|a, b| {
            b.profile
                .accuracy
                .partial_cmp(&a.profile.accuracy)
                .unwrap_or(Ordering::Equal)
                .then_with(|| by_latency_then_id(a, b))
        }),
        _ => ranked.sort_by(|a, b| {
            b.profile
                .score()
                .partial_cmp(&a.profile.score())
                .unwrap_or(Ordering::Equal)
                .then_with(|| by_latency_then_id(a, b))
        }),
    }
    ranked
}

/// Lowest recorded latency first; untimed providers last; then id.
fn by_latency_then_id(a: &Candidate, b: &Candidate) -> Ordering {
    let latency = match (a.average_latency_ms, b.average_latency_ms) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    latency.then_with(|| a.id.cmp(&b.id))
}

/// Map a key to a stable bucket in `[0, 1)`.
///
/// Uses SHA-256 so the assignment survives restarts and toolchain upgrades.
pub fn ab_bucket(key: &str) -> f64 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(bytes);
    (value >> 11) as f64 / (1u64 << 53) as f64
}

fn ab_variant(ctx: &SelectionContext) -> String {
    let mut ids: Vec<&str> = ctx.candidates.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();

    let variant_a = ctx
        .ab_test
        .variant_a
        .clone()
        .unwrap_or_else(|| ids[0].to_string());
    let variant_b = ctx
        .ab_test
        .variant_b
        .clone()
        .unwrap_or_else(|| ids.get(1).copied().unwrap_or(ids[0]).to_string());

    let key = ctx.key.as_deref().unwrap_or(DEFAULT_SELECTION_KEY);
    if ab_bucket(key) < ctx.ab_test.split {
        variant_a
    } else {
        variant_b
    }
}
