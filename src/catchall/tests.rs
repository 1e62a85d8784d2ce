use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::TimeDelta;

use super::*;
use crate::clock::ManualClock;
use crate::guard::SmtpPolicy;
use crate::mx::{DnsLookup, LookupError, MxRecord};
use crate::smtp::{ProbeFailure, ProbeOutcome, SmtpReply};
use crate::store::MemoryStore;

struct FixedDns {
    records: Mutex<Result<Vec<MxRecord>, LookupError>>,
    has_address: bool,
    calls: AtomicUsize,
}

impl FixedDns {
    fn new(records: Result<Vec<MxRecord>, LookupError>, has_address: bool) -> Self {
        Self {
            records: Mutex::new(records),
            has_address,
            calls: AtomicUsize::new(0),
        }
    }

    fn set_records(&self, records: Vec<MxRecord>) {
        *self.records.lock().unwrap() = Ok(records);
    }
}

impl DnsLookup for FixedDns {
    fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().clone()
    }

    fn has_address(&self, _domain: &str) -> Result<bool, LookupError> {
        Ok(self.has_address)
    }

    fn lookup_addrs(&self, _host: &str) -> Result<Vec<IpAddr>, LookupError> {
        Err(LookupError::NoRecords)
    }
}

/// Answers every probe with the configured reply or failure.
struct StubProber {
    reply: Mutex<Result<SmtpReply, ProbeFailure>>,
    requests: Mutex<Vec<ProbeRequest>>,
}

impl StubProber {
    fn replying(code: u16, message: &str) -> Self {
        Self::new(Ok(SmtpReply {
            code,
            message: message.to_string(),
        }))
    }

    fn new(reply: Result<SmtpReply, ProbeFailure>) -> Self {
        Self {
            reply: Mutex::new(reply),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn set_reply(&self, code: u16, message: &str) {
        *self.reply.lock().unwrap() = Ok(SmtpReply {
            code,
            message: message.to_string(),
        });
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl MailboxProber for StubProber {
    fn probe(&self, request: &ProbeRequest) -> Result<ProbeOutcome, EngineError> {
        self.requests.lock().unwrap().push(request.clone());
        let outcome = match self.reply.lock().unwrap().clone() {
            Ok(reply) => ProbeOutcome::from_reply(&request.mx_host, reply, 12),
            Err(failure) => ProbeOutcome::failed(&request.mx_host, failure, 12),
        };
        Ok(outcome)
    }
}

struct Harness {
    detector: CatchAllDetector,
    dns: Arc<FixedDns>,
    prober: Arc<StubProber>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness(dns: FixedDns, prober: StubProber, policy: SmtpPolicy) -> Harness {
    let dns = Arc::new(dns);
    let prober = Arc::new(prober);
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::at("2024-05-01T08:00:00Z"));
    let config = Arc::new(EngineConfig::default());
    let resolver = Arc::new(MxResolver::new(dns.clone(), store.clone(), clock.clone()));
    let detector = CatchAllDetector::new(
        resolver,
        prober.clone(),
        Arc::new(policy),
        store.clone(),
        clock.clone(),
        config,
    );
    Harness {
        detector,
        dns,
        prober,
        store,
        clock,
    }
}

fn example_mx() -> FixedDns {
    FixedDns::new(
        Ok(vec![
            MxRecord::new(20, "mx2.example.com"),
            MxRecord::new(10, "mx1.example.com"),
        ]),
        true,
    )
}

#[test]
fn classification_table() {
    assert_eq!(classify_catchall(Some(250), false), CatchallStatus::CatchAll);
    assert_eq!(classify_catchall(Some(550), false), CatchallStatus::NotCatchAll);
    assert_eq!(classify_catchall(Some(451), false), CatchallStatus::Tempfail);
    assert_eq!(classify_catchall(None, true), CatchallStatus::Tempfail);
    assert_eq!(classify_catchall(None, false), CatchallStatus::Error);
    assert_eq!(classify_catchall(Some(354), false), CatchallStatus::Error);
}

#[test]
fn localparts_are_random_hex() {
    let first = random_localpart();
    let second = random_localpart();
    assert_ne!(first, second);
    let hex = first.strip_prefix(LOCALPART_PREFIX).unwrap();
    assert_eq!(hex.len(), 16);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn accepting_mx_is_catch_all_and_cached() {
    let h = harness(
        example_mx(),
        StubProber::replying(250, "2.1.5 Ok"),
        SmtpPolicy::allow_all(),
    );

    let first = h.detector.check(1, "Example.com", false).unwrap();
    assert_eq!(first.status, CatchallStatus::CatchAll);
    assert!(!first.cached);
    assert_eq!(first.mx_host.as_deref(), Some("mx1.example.com"));
    assert_eq!(first.rcpt_code, Some(250));

    let requests = h.prober.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].mx_host, "mx1.example.com");
    let localpart = first.localpart.clone().unwrap();
    assert_eq!(requests[0].email, format!("{localpart}@example.com"));

    let second = h.detector.check(1, "example.com", false).unwrap();
    assert!(second.cached);
    assert_eq!(second.status, first.status);
    assert_eq!(second.rcpt_code, first.rcpt_code);
    assert_eq!(second.localpart, first.localpart);
    assert_eq!(second.message, first.message);
    assert_eq!(second.mx_host, first.mx_host);
    assert_eq!(second.checked_at, first.checked_at);
    assert_eq!(h.prober.calls(), 1);
    assert_eq!(h.dns.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn cached_verdict_keeps_the_host_it_was_taken_from() {
    let h = harness(
        example_mx(),
        StubProber::replying(250, "Ok"),
        SmtpPolicy::allow_all(),
    );
    h.detector.check(1, "example.com", false).unwrap();

    h.dns.set_records(vec![MxRecord::new(5, "mx0.example.com")]);
    let resolver = MxResolver::new(h.dns.clone(), h.store.clone(), h.clock.clone());
    let refreshed = resolver
        .resolve(1, "example.com", true, EngineConfig::default().mx_ttl)
        .unwrap();
    assert_eq!(refreshed.lowest_mx.as_deref(), Some("mx0.example.com"));

    let cached = h.detector.check(1, "example.com", false).unwrap();
    assert!(cached.cached);
    assert_eq!(cached.mx_host.as_deref(), Some("mx1.example.com"));
    assert_eq!(h.prober.calls(), 1);
}

#[test]
fn cached_tempfail_keeps_its_error() {
    let h = harness(
        example_mx(),
        StubProber::new(Err(ProbeFailure::from_io(&std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out",
        )))),
        SmtpPolicy::allow_all(),
    );
    let fresh = h.detector.check(1, "example.com", false).unwrap();
    assert_eq!(fresh.status, CatchallStatus::Tempfail);

    let cached = h.detector.check(1, "example.com", false).unwrap();
    assert!(cached.cached);
    assert_eq!(cached.error, fresh.error);
    assert!(cached.error.unwrap().starts_with("timeout:"));

    let stored = h.store.latest(1, "example.com").unwrap().unwrap();
    let record = stored.catch_all.unwrap();
    assert_eq!(record.mx_host.as_deref(), Some("mx1.example.com"));
    assert!(record.error.is_some());
}

#[test]
fn rejecting_mx_is_not_catch_all() {
    let h = harness(
        example_mx(),
        StubProber::replying(550, "5.1.1 User unknown"),
        SmtpPolicy::allow_all(),
    );
    let result = h.detector.check(1, "example.com", false).unwrap();
    assert_eq!(result.status, CatchallStatus::NotCatchAll);

    let stored = h.store.latest(1, "example.com").unwrap().unwrap();
    let record = stored.catch_all.unwrap();
    assert_eq!(record.status, CatchallStatus::NotCatchAll);
    assert_eq!(record.smtp_code, Some(550));
    assert_eq!(record.smtp_msg.as_deref(), Some("5.1.1 User unknown"));
    assert_eq!(record.localpart, result.localpart);
}

#[test]
fn transient_reply_or_timeout_is_tempfail() {
    let h = harness(
        example_mx(),
        StubProber::replying(451, "4.7.1 Try again later"),
        SmtpPolicy::allow_all(),
    );
    assert_eq!(
        h.detector.check(1, "example.com", false).unwrap().status,
        CatchallStatus::Tempfail
    );

    let h = harness(
        example_mx(),
        StubProber::new(Err(ProbeFailure::from_io(&std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "read timed out",
        )))),
        SmtpPolicy::allow_all(),
    );
    let result = h.detector.check(1, "example.com", false).unwrap();
    assert_eq!(result.status, CatchallStatus::Tempfail);
    assert_eq!(result.rcpt_code, None);
    assert!(result.error.unwrap().starts_with("timeout:"));
}

#[test]
fn force_reprobes_and_overwrites() {
    let h = harness(
        example_mx(),
        StubProber::replying(250, "Ok"),
        SmtpPolicy::allow_all(),
    );
    h.detector.check(1, "example.com", false).unwrap();

    h.prober.set_reply(550, "no such user");
    let forced = h.detector.check(1, "example.com", true).unwrap();
    assert!(!forced.cached);
    assert_eq!(forced.status, CatchallStatus::NotCatchAll);
    assert_eq!(h.prober.calls(), 2);

    let stored = h.store.latest(1, "example.com").unwrap().unwrap();
    assert_eq!(stored.catch_all.unwrap().status, CatchallStatus::NotCatchAll);
}

#[test]
fn expired_verdict_is_reprobed() {
    let h = harness(
        example_mx(),
        StubProber::replying(250, "Ok"),
        SmtpPolicy::allow_all(),
    );
    h.detector.check(1, "example.com", false).unwrap();

    h.clock.advance(TimeDelta::hours(23));
    assert!(h.detector.check(1, "example.com", false).unwrap().cached);

    h.clock.advance(TimeDelta::hours(2));
    let refreshed = h.detector.check(1, "example.com", false).unwrap();
    assert!(!refreshed.cached);
    assert_eq!(h.prober.calls(), 2);
}

#[test]
fn null_mx_is_no_mx_without_smtp() {
    let h = harness(
        FixedDns::new(Ok(vec![MxRecord::new(0, ".")]), true),
        StubProber::replying(250, "Ok"),
        SmtpPolicy::allow_all(),
    );
    let result = h.detector.check(3, "nomail.example", false).unwrap();
    assert_eq!(result.status, CatchallStatus::NoMx);
    assert_eq!(result.error.as_deref(), Some("null_mx"));
    assert_eq!(h.prober.calls(), 0);

    let stored = h.store.latest(3, "nomail.example").unwrap().unwrap();
    assert_eq!(stored.catch_all.unwrap().status, CatchallStatus::NoMx);
}

#[test]
fn lookup_failure_is_error_and_persisted() {
    let h = harness(
        FixedDns::new(Err(LookupError::failed("Timeout", "timed out")), false),
        StubProber::replying(250, "Ok"),
        SmtpPolicy::allow_all(),
    );
    let result = h.detector.check(1, "example.com", false).unwrap();
    assert_eq!(result.status, CatchallStatus::Error);
    assert_eq!(result.error.as_deref(), Some("mx_lookup_failed:Timeout"));
    assert_eq!(h.prober.calls(), 0);
    let stored = h.store.latest(1, "example.com").unwrap().unwrap();
    assert_eq!(stored.catch_all.unwrap().status, CatchallStatus::Error);
}

#[test]
fn invalid_domains_are_rejected() {
    let h = harness(
        example_mx(),
        StubProber::replying(250, "Ok"),
        SmtpPolicy::allow_all(),
    );
    for input in ["", "   ", "user@example.com"] {
        let err = h.detector.check(1, input, false).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDomain(_)), "{input:?}");
    }
    assert_eq!(h.dns.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn guard_refusal_stops_before_smtp() {
    let h = harness(
        example_mx(),
        StubProber::replying(250, "Ok"),
        SmtpPolicy::default(),
    );
    let err = h.detector.check(1, "example.com", false).unwrap_err();
    assert!(matches!(err, EngineError::SmtpNotAllowed { .. }));
    assert_eq!(h.prober.calls(), 0);
    let stored = h.store.latest(1, "example.com").unwrap().unwrap();
    assert!(stored.catch_all.is_none());
}
