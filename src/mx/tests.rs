use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::TimeDelta;

use super::resolver::lookup_exchangers;
use super::*;
use crate::catchall::CatchallStatus;
use crate::clock::{Clock, ManualClock};
use crate::error::EngineError;
use crate::store::{CatchAllRecord, MemoryStore, ResolutionStore};

type MxFn = dyn Fn(&str) -> Result<Vec<MxRecord>, LookupError> + Send + Sync;
type AddrFn = dyn Fn(&str) -> Result<bool, LookupError> + Send + Sync;

pub(crate) struct StubDns {
    on_mx: Box<MxFn>,
    on_address: Box<AddrFn>,
    pub mx_calls: AtomicUsize,
    pub address_calls: AtomicUsize,
}

impl StubDns {
    pub(crate) fn new<F, G>(on_mx: F, on_address: G) -> Self
    where
        F: Fn(&str) -> Result<Vec<MxRecord>, LookupError> + Send + Sync + 'static,
        G: Fn(&str) -> Result<bool, LookupError> + Send + Sync + 'static,
    {
        Self {
            on_mx: Box::new(on_mx),
            on_address: Box::new(on_address),
            mx_calls: AtomicUsize::new(0),
            address_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn records(records: Vec<MxRecord>) -> Self {
        Self::new(move |_| Ok(records.clone()), |_| Ok(true))
    }

    pub(crate) fn mx_calls(&self) -> usize {
        self.mx_calls.load(Ordering::SeqCst)
    }
}

impl DnsLookup for StubDns {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, LookupError> {
        self.mx_calls.fetch_add(1, Ordering::SeqCst);
        (self.on_mx)(domain)
    }

    fn has_address(&self, domain: &str) -> Result<bool, LookupError> {
        self.address_calls.fetch_add(1, Ordering::SeqCst);
        (self.on_address)(domain)
    }

    fn lookup_addrs(&self, _host: &str) -> Result<Vec<IpAddr>, LookupError> {
        Err(LookupError::NoRecords)
    }
}

fn single_mx(preference: u16) -> StubDns {
    StubDns::records(vec![MxRecord::new(preference, "mx.example.com")])
}

const DAY: Duration = Duration::from_secs(86_400);

fn setup(dns: StubDns) -> (MxResolver, Arc<StubDns>, Arc<MemoryStore>, Arc<ManualClock>) {
    let dns = Arc::new(dns);
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::at("2024-05-01T12:00:00Z"));
    let resolver = MxResolver::new(dns.clone(), store.clone(), clock.clone());
    (resolver, dns, store, clock)
}

#[test]
fn records_are_sorted_and_deduplicated() {
    let dns = StubDns::records(vec![
        MxRecord::new(20, "mx2.example.com."),
        MxRecord::new(10, "MX1.example.com."),
        MxRecord::new(10, "mx1.example.com"),
        MxRecord::new(30, "mx1.example.com"),
        MxRecord::new(10, "alt.example.com"),
    ]);
    let records = lookup_exchangers(&dns, "example.com").unwrap();
    assert_eq!(
        records,
        vec![
            MxRecord::new(10, "alt.example.com"),
            MxRecord::new(10, "mx1.example.com"),
            MxRecord::new(20, "mx2.example.com"),
        ]
    );
}

#[test]
fn null_mx_skips_address_fallback() {
    let dns = StubDns::records(vec![MxRecord::new(0, ".")]);
    let err = lookup_exchangers(&dns, "nomail.example").unwrap_err();
    assert_eq!(err, MxFailure::NullMx);
    assert_eq!(dns.address_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_mx_uses_implicit_exchanger() {
    let dns = StubDns::new(|_| Err(LookupError::NoRecords), |_| Ok(true));
    let records = lookup_exchangers(&dns, "example.org").unwrap();
    assert_eq!(records, vec![MxRecord::new(0, "example.org")]);

    let empty = StubDns::new(|_| Ok(Vec::new()), |_| Ok(true));
    assert_eq!(
        lookup_exchangers(&empty, "example.org").unwrap(),
        vec![MxRecord::new(0, "example.org")]
    );
}

#[test]
fn missing_mx_and_address_is_no_mail() {
    let dns = StubDns::new(|_| Err(LookupError::NoRecords), |_| Ok(false));
    assert_eq!(
        lookup_exchangers(&dns, "example.org").unwrap_err(),
        MxFailure::NoMxAndNoA
    );

    let flaky = StubDns::new(
        |_| Err(LookupError::NoRecords),
        |_| Err(LookupError::failed("Timeout", "address lookup timed out")),
    );
    assert_eq!(
        lookup_exchangers(&flaky, "example.org").unwrap_err(),
        MxFailure::NoMxAndNoA
    );
}

#[test]
fn lookup_errors_map_to_failure_strings() {
    let timeout = StubDns::new(
        |_| Err(LookupError::failed("Timeout", "request timed out")),
        |_| Ok(true),
    );
    let failure = lookup_exchangers(&timeout, "example.com").unwrap_err();
    assert_eq!(failure.to_string(), "mx_lookup_failed:Timeout");

    let unavailable = UnavailableDns::new("no resolv.conf");
    let failure = lookup_exchangers(&unavailable, "example.com").unwrap_err();
    assert_eq!(failure.to_string(), "mx_lookup_unavailable");
}

#[test]
fn failure_strings_parse_back() {
    for failure in [
        MxFailure::NullMx,
        MxFailure::NoMxAndNoA,
        MxFailure::LookupUnavailable,
        MxFailure::LookupFailed {
            kind: "Proto".to_string(),
        },
    ] {
        assert_eq!(MxFailure::parse(&failure.to_string()), failure);
    }
    assert!(MxFailure::NullMx.is_no_mail());
    assert!(!MxFailure::LookupUnavailable.is_no_mail());
}

#[test]
fn fresh_row_is_served_without_dns() {
    let (resolver, dns, _, clock) = setup(StubDns::records(vec![
        MxRecord::new(10, "mx1.example.com"),
        MxRecord::new(20, "mx2.example.com"),
    ]));

    let first = resolver.resolve(1, "Example.COM.", false, DAY).unwrap();
    assert!(!first.cached);
    assert_eq!(first.domain, "example.com");
    assert_eq!(first.lowest_mx.as_deref(), Some("mx1.example.com"));
    assert_eq!(first.preference_map.get("mx2.example.com"), Some(&20));
    assert_eq!(first.ttl, 86_400);

    clock.advance(TimeDelta::hours(23));
    let second = resolver.resolve(1, "example.com", false, DAY).unwrap();
    assert!(second.cached);
    assert_eq!(second.mx_hosts, first.mx_hosts);
    assert_eq!(second.resolved_at, first.resolved_at);
    assert_eq!(dns.mx_calls(), 1);
}

#[test]
fn cache_is_scoped_per_company() {
    let (resolver, dns, _, _) = setup(single_mx(10));
    resolver.resolve(1, "example.com", false, DAY).unwrap();
    let other = resolver.resolve(2, "example.com", false, DAY).unwrap();
    assert!(!other.cached);
    assert_eq!(dns.mx_calls(), 2);
}

#[test]
fn expired_or_forced_rows_are_refreshed() {
    let (resolver, dns, _, clock) = setup(single_mx(10));
    resolver.resolve(1, "example.com", false, DAY).unwrap();

    let forced = resolver.resolve(1, "example.com", true, DAY).unwrap();
    assert!(!forced.cached);
    assert_eq!(dns.mx_calls(), 2);

    clock.advance(TimeDelta::seconds(86_400));
    let expired = resolver.resolve(1, "example.com", false, DAY).unwrap();
    assert!(!expired.cached);
    assert_eq!(dns.mx_calls(), 3);
}

#[test]
fn failed_rows_are_never_cached() {
    let (resolver, dns, store, _) = setup(StubDns::new(
        |_| Err(LookupError::failed("Timeout", "request timed out")),
        |_| Ok(false),
    ));
    let first = resolver.resolve(7, "example.net", false, DAY).unwrap();
    assert_eq!(
        first.failure,
        Some(MxFailure::LookupFailed {
            kind: "Timeout".to_string()
        })
    );
    assert!(first.mx_hosts.is_empty());
    assert_eq!(first.lowest_mx, None);

    let row = store.latest(7, "example.net").unwrap().unwrap();
    assert_eq!(row.failure.as_deref(), Some("mx_lookup_failed:Timeout"));

    let second = resolver.resolve(7, "example.net", false, DAY).unwrap();
    assert!(!second.cached);
    assert_eq!(dns.mx_calls(), 2);
}

#[test]
fn refresh_keeps_catch_all_verdict() {
    let (resolver, _, store, clock) = setup(single_mx(5));
    resolver.resolve(1, "example.com", false, DAY).unwrap();
    let record = CatchAllRecord {
        status: CatchallStatus::NotCatchAll,
        checked_at: clock.now(),
        localpart: Some("_ca_0011223344556677".to_string()),
        smtp_code: Some(550),
        smtp_msg: Some("no such user".to_string()),
        mx_host: None,
        error: None,
    };
    assert!(store.record_catch_all(1, "example.com", record.clone()).unwrap());

    resolver.resolve(1, "example.com", true, DAY).unwrap();
    let row = store.latest(1, "example.com").unwrap().unwrap();
    assert_eq!(row.catch_all, Some(record));
}

#[test]
fn empty_domain_is_rejected() {
    let (resolver, dns, _, _) = setup(StubDns::records(Vec::new()));
    let err = resolver.resolve(1, "  . ", false, DAY).unwrap_err();
    assert!(matches!(err, EngineError::EmptyDomain));
    assert_eq!(dns.mx_calls(), 0);
}
