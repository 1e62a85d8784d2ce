use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::behavior::MxBehaviorStats;
use crate::catchall::CatchallStatus;

/// One persisted resolution per (company, domain).
///
/// Fields added after schema version 1 carry `#[serde(default)]` so older
/// snapshots load with empty/`None` values instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainResolution {
    pub company_id: i64,
    pub domain: String,
    #[serde(default)]
    pub mx_hosts: Vec<String>,
    #[serde(default)]
    pub preference_map: BTreeMap<String, u16>,
    #[serde(default)]
    pub lowest_mx: Option<String>,
    pub resolved_at: DateTime<Utc>,
    /// Seconds.
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default)]
    pub catch_all: Option<CatchAllRecord>,
    #[serde(default)]
    pub mx_behavior: BTreeMap<String, MxBehaviorStats>,
}

impl DomainResolution {
    pub fn new(company_id: i64, domain: impl Into<String>, resolved_at: DateTime<Utc>) -> Self {
        Self {
            company_id,
            domain: domain.into(),
            mx_hosts: Vec::new(),
            preference_map: BTreeMap::new(),
            lowest_mx: None,
            resolved_at,
            ttl: 0,
            failure: None,
            catch_all: None,
            mx_behavior: BTreeMap::new(),
        }
    }

    /// A row is a cache hit only when it recorded no failure and its TTL has
    /// not elapsed.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        if self.failure.is_some() {
            return false;
        }
        let expires = i64::try_from(self.ttl)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| self.resolved_at.checked_add_signed(ttl));
        match expires {
            Some(expires) => expires > now,
            // TTL too large to represent: never expires.
            None => true,
        }
    }

    /// Replaces the MX fields, leaving `catch_all` and `mx_behavior` intact.
    pub(crate) fn apply(&mut self, update: &ResolutionUpdate) {
        self.mx_hosts = update.mx_hosts.clone();
        self.preference_map = update.preference_map.clone();
        self.lowest_mx = update.lowest_mx.clone();
        self.resolved_at = update.resolved_at;
        self.ttl = update.ttl;
        self.failure = update.failure.clone();
    }
}

/// Result of a fresh MX resolution, written atomically by
/// [`ResolutionStore::upsert_resolution`](super::ResolutionStore::upsert_resolution).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionUpdate {
    pub company_id: i64,
    pub domain: String,
    pub mx_hosts: Vec<String>,
    pub preference_map: BTreeMap<String, u16>,
    pub lowest_mx: Option<String>,
    pub resolved_at: DateTime<Utc>,
    pub ttl: u64,
    pub failure: Option<String>,
}

/// Catch-all verdict stored next to the MX data, refreshed on its own schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchAllRecord {
    pub status: CatchallStatus,
    pub checked_at: DateTime<Utc>,
    #[serde(default)]
    pub localpart: Option<String>,
    #[serde(default)]
    pub smtp_code: Option<u16>,
    #[serde(default)]
    pub smtp_msg: Option<String>,
    /// Host the verdict was probed against.
    #[serde(default)]
    pub mx_host: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
