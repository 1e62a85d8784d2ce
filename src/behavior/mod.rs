//! Per-MX-host behavior learning.
//!
//! Every probe reports one [`Observation`]; the aggregate is used to derive a
//! [`BehaviorHint`] (timeouts, retry budget) for the next probe of that host.
//! The aggregate is advisory: lookups fall back to defaults and failed writes
//! are dropped.

mod types;

pub use types::{BehaviorHint, EWMA_ALPHA, HintProfile, MxBehaviorStats, Observation};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::address::normalize_host;
use crate::clock::Clock;
use crate::smtp::classify_code;
use crate::store::{ResolutionStore, StoreError};

/// Read side and write side of the behavior aggregate, as seen by the probe
/// client.
pub trait BehaviorObserver: Send + Sync {
    fn hint(&self, mx_host: &str, domain: Option<&str>) -> Result<BehaviorHint, StoreError>;
    fn record(&self, observation: Observation);
}

pub struct BehaviorTracker {
    store: Arc<dyn ResolutionStore>,
    clock: Arc<dyn Clock>,
}

impl BehaviorTracker {
    pub fn new(store: Arc<dyn ResolutionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn record_observation(
        &self,
        mx_host: &str,
        domain: Option<&str>,
        code: Option<u16>,
        elapsed_ms: u64,
        error_kind: Option<&str>,
    ) {
        let host = normalize_host(mx_host);
        let category = classify_code(code);
        let now = self.clock.now();
        let mut merge = |stats: &mut MxBehaviorStats| {
            stats.observe(
                category,
                elapsed_ms,
                code,
                error_kind.map(str::to_string),
                now,
            )
        };
        match self.store.merge_behavior(&host, domain, &mut merge) {
            Ok(true) => debug!(mx_host = %host, %category, elapsed_ms, "behavior recorded"),
            Ok(false) => debug!(mx_host = %host, "no resolution row for host, observation dropped"),
            Err(err) => warn!(mx_host = %host, error = %err, "behavior update failed"),
        }
    }

    pub fn get_hint(
        &self,
        mx_host: &str,
        domain: Option<&str>,
    ) -> Result<BehaviorHint, StoreError> {
        let host = normalize_host(mx_host);
        let stats = self.store.behavior_for(&host, domain)?;
        Ok(BehaviorHint::from_stats(stats.as_ref()))
    }
}

impl BehaviorObserver for BehaviorTracker {
    fn hint(&self, mx_host: &str, domain: Option<&str>) -> Result<BehaviorHint, StoreError> {
        self.get_hint(mx_host, domain)
    }

    fn record(&self, observation: Observation) {
        self.record_observation(
            &observation.mx_host,
            observation.domain.as_deref(),
            observation.code,
            observation.elapsed_ms,
            observation.error_kind.as_deref(),
        );
    }
}

#[cfg(test)]
mod tests;
