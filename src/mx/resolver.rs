use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::address::{normalize_domain, normalize_host};
use crate::clock::Clock;
use crate::error::EngineError;
use crate::store::{ResolutionStore, ResolutionUpdate};

use super::{DnsLookup, LookupError, MxFailure, MxRecord, MxResult};

pub struct MxResolver {
    dns: Arc<dyn DnsLookup>,
    store: Arc<dyn ResolutionStore>,
    clock: Arc<dyn Clock>,
}

impl MxResolver {
    pub fn new(
        dns: Arc<dyn DnsLookup>,
        store: Arc<dyn ResolutionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { dns, store, clock }
    }

    /// Resolves the exchangers of `domain` for `company_id`.
    ///
    /// A stored row is reused when `force` is false, it recorded no failure
    /// and `ttl` has not elapsed since it was resolved. Otherwise DNS is
    /// queried and the row is upserted, keeping its catch-all verdict and
    /// behavior statistics.
    pub fn resolve(
        &self,
        company_id: i64,
        domain: &str,
        force: bool,
        ttl: Duration,
    ) -> Result<MxResult, EngineError> {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return Err(EngineError::EmptyDomain);
        }
        let now = self.clock.now();

        if !force {
            if let Some(row) = self.store.latest(company_id, &domain)? {
                if row.is_fresh(now) {
                    debug!(company_id, domain = %domain, "MX cache hit");
                    return Ok(MxResult::from_row(&row, true));
                }
            }
        }

        let (records, failure) = match lookup_exchangers(self.dns.as_ref(), &domain) {
            Ok(records) => (records, None),
            Err(failure) => (Vec::new(), Some(failure)),
        };
        let preference_map: BTreeMap<String, u16> = records
            .iter()
            .map(|record| (record.exchange.clone(), record.preference))
            .collect();
        let update = ResolutionUpdate {
            company_id,
            domain: domain.clone(),
            mx_hosts: records.iter().map(|r| r.exchange.clone()).collect(),
            preference_map,
            lowest_mx: records.first().map(|r| r.exchange.clone()),
            resolved_at: now,
            ttl: ttl.as_secs(),
            failure: failure.as_ref().map(ToString::to_string),
        };
        let row = self.store.upsert_resolution(update)?;

        info!(
            company_id,
            domain = %domain,
            lowest_mx = ?row.lowest_mx,
            hosts = row.mx_hosts.len(),
            failure = ?row.failure,
            "MX resolved"
        );
        Ok(MxResult::from_row(&row, false))
    }
}

/// Queries MX records for an already normalized domain and returns them
/// sorted by (preference, name) with duplicate hosts removed.
///
/// Falls back to an implicit MX (the domain itself, preference 0) when the
/// domain has no MX records but has an address record.
pub(crate) fn lookup_exchangers(
    dns: &dyn DnsLookup,
    domain: &str,
) -> Result<Vec<MxRecord>, MxFailure> {
    let raw = match dns.lookup_mx(domain) {
        Ok(records) => records,
        Err(LookupError::NoRecords) => return implicit_mx(dns, domain),
        Err(LookupError::Unavailable(reason)) => {
            warn!(domain, reason = %reason, "DNS resolver unavailable");
            return Err(MxFailure::LookupUnavailable);
        }
        Err(LookupError::Failed { kind, message }) => {
            warn!(domain, kind = %kind, error = %message, "MX lookup failed");
            return Err(MxFailure::LookupFailed { kind });
        }
    };

    let mut records: Vec<MxRecord> = raw
        .into_iter()
        .map(|record| MxRecord::new(record.preference, normalize_host(&record.exchange)))
        .collect();

    // The root name normalizes to an empty exchange.
    if records.len() == 1 && records[0].exchange.is_empty() {
        debug!(domain, "null MX published");
        return Err(MxFailure::NullMx);
    }

    records.retain(|record| !record.exchange.is_empty());
    records.sort();
    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.exchange.clone()));

    if records.is_empty() {
        return implicit_mx(dns, domain);
    }
    Ok(records)
}

fn implicit_mx(dns: &dyn DnsLookup, domain: &str) -> Result<Vec<MxRecord>, MxFailure> {
    match dns.has_address(domain) {
        Ok(true) => {
            debug!(domain, "no MX records, using implicit MX");
            Ok(vec![MxRecord::new(0, domain)])
        }
        Ok(false) => Err(MxFailure::NoMxAndNoA),
        Err(err) => {
            debug!(domain, error = %err, "address lookup failed");
            Err(MxFailure::NoMxAndNoA)
        }
    }
}
