use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::store::DomainResolution;

/// Ordered by preference, then exchange name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(preference: u16, exchange: impl Into<String>) -> Self {
        Self {
            preference,
            exchange: exchange.into(),
        }
    }
}

/// Why a domain has no usable exchangers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MxFailure {
    /// RFC 7505: the domain explicitly accepts no mail.
    NullMx,
    NoMxAndNoA,
    /// Resolver error tagged with its kind, e.g. `Timeout`.
    LookupFailed { kind: String },
    LookupUnavailable,
}

impl MxFailure {
    /// Parses the persisted form. Unrecognized strings are kept as a lookup
    /// failure so that stored rows never fail to load.
    pub fn parse(value: &str) -> Self {
        match value {
            "null_mx" => Self::NullMx,
            "no_mx_and_no_a" => Self::NoMxAndNoA,
            "mx_lookup_unavailable" => Self::LookupUnavailable,
            other => Self::LookupFailed {
                kind: other
                    .strip_prefix("mx_lookup_failed:")
                    .unwrap_or(other)
                    .to_string(),
            },
        }
    }

    /// The domain cannot receive mail at all, as opposed to a lookup that
    /// went wrong.
    pub fn is_no_mail(&self) -> bool {
        matches!(self, Self::NullMx | Self::NoMxAndNoA)
    }
}

impl fmt::Display for MxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullMx => f.write_str("null_mx"),
            Self::NoMxAndNoA => f.write_str("no_mx_and_no_a"),
            Self::LookupFailed { kind } => write!(f, "mx_lookup_failed:{kind}"),
            Self::LookupUnavailable => f.write_str("mx_lookup_unavailable"),
        }
    }
}

impl Serialize for MxFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MxResult {
    pub domain: String,
    /// Sorted by (preference, name).
    pub mx_hosts: Vec<String>,
    pub preference_map: BTreeMap<String, u16>,
    pub lowest_mx: Option<String>,
    pub resolved_at: DateTime<Utc>,
    /// Seconds.
    pub ttl: u64,
    pub failure: Option<MxFailure>,
    /// Served from the store without DNS traffic.
    pub cached: bool,
}

impl MxResult {
    pub(crate) fn from_row(row: &DomainResolution, cached: bool) -> Self {
        Self {
            domain: row.domain.clone(),
            mx_hosts: row.mx_hosts.clone(),
            preference_map: row.preference_map.clone(),
            lowest_mx: row.lowest_mx.clone(),
            resolved_at: row.resolved_at,
            ttl: row.ttl,
            failure: row.failure.as_deref().map(MxFailure::parse),
            cached,
        }
    }

    pub fn records(&self) -> Vec<MxRecord> {
        self.mx_hosts
            .iter()
            .map(|host| {
                let preference = self.preference_map.get(host).copied().unwrap_or_default();
                MxRecord::new(preference, host.clone())
            })
            .collect()
    }
}
