//! Persistence of [`DomainResolution`] rows.
//!
//! The engine only talks to the [`ResolutionStore`] trait. [`MemoryStore`] is
//! the bundled implementation; it can be dumped to and restored from a
//! versioned JSON snapshot (see [`snapshot`]).

mod error;
mod memory;
pub mod snapshot;
mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use types::{CatchAllRecord, DomainResolution, ResolutionUpdate};

use crate::behavior::MxBehaviorStats;

/// Keyed by `(company_id, domain)`; `domain` is always the canonical form.
///
/// Implementations must be safe to share between worker threads. The
/// behavior methods are best-effort: concurrent merges may lose updates.
pub trait ResolutionStore: Send + Sync {
    fn latest(&self, company_id: i64, domain: &str)
    -> Result<Option<DomainResolution>, StoreError>;

    /// Inserts or replaces the MX fields of the row, preserving any stored
    /// catch-all verdict and behavior stats.
    fn upsert_resolution(&self, update: ResolutionUpdate) -> Result<DomainResolution, StoreError>;

    /// Returns `false` when no row exists for `(company_id, domain)`.
    fn record_catch_all(
        &self,
        company_id: i64,
        domain: &str,
        record: CatchAllRecord,
    ) -> Result<bool, StoreError>;

    fn behavior_for(
        &self,
        mx_host: &str,
        domain: Option<&str>,
    ) -> Result<Option<MxBehaviorStats>, StoreError>;

    /// Applies `merge` to the stats of `mx_host` on the most relevant row.
    /// Returns `false` when no relevant row exists.
    fn merge_behavior(
        &self,
        mx_host: &str,
        domain: Option<&str>,
        merge: &mut dyn FnMut(&mut MxBehaviorStats),
    ) -> Result<bool, StoreError>;
}

/// Picks the row behavior stats for `mx_host` belong to: newest row of the
/// same domain, else newest row whose `lowest_mx` is the host, else newest
/// row listing a matching exchange.
pub fn select_relevant<'a, I>(
    rows: I,
    mx_host: &str,
    domain: Option<&str>,
) -> Option<&'a DomainResolution>
where
    I: Iterator<Item = &'a DomainResolution> + Clone,
{
    if mx_host.is_empty() {
        return None;
    }

    if let Some(domain) = domain.filter(|d| !d.is_empty()) {
        if let Some(row) = newest(rows.clone().filter(|row| row.domain == domain)) {
            return Some(row);
        }
    }
    if let Some(row) = newest(
        rows.clone()
            .filter(|row| row.lowest_mx.as_deref() == Some(mx_host)),
    ) {
        return Some(row);
    }
    newest(rows.filter(|row| row.mx_hosts.iter().any(|host| host.contains(mx_host))))
}

fn newest<'a>(rows: impl Iterator<Item = &'a DomainResolution>) -> Option<&'a DomainResolution> {
    rows.max_by_key(|row| row.resolved_at)
}
