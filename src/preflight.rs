//! Cheap TCP reachability check run before investing in a full handshake.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::address::normalize_host;
use crate::mx::{DnsLookup, LookupError};
use crate::smtp::ProbeFailure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightResult {
    pub ok: bool,
    pub ip: Option<IpAddr>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// Connects to port 25 of `mx_host`. See [`check_port`].
pub fn check_port25(
    dns: &dyn DnsLookup,
    mx_host: &str,
    timeout: Duration,
    max_addrs: usize,
) -> PreflightResult {
    check_port(dns, mx_host, 25, timeout, max_addrs)
}

/// Resolves up to `max_addrs` addresses (IPv4 first) through `dns` and tries
/// a bare TCP connect to each in turn until one succeeds or `timeout` is
/// spent. Time spent resolving counts against the budget.
pub fn check_port(
    dns: &dyn DnsLookup,
    host: &str,
    port: u16,
    timeout: Duration,
    max_addrs: usize,
) -> PreflightResult {
    let started = Instant::now();
    let host = normalize_host(host);
    if host.is_empty() {
        return failed(started, "error:EmptyMxHost:mx host is empty".to_string());
    }

    let addrs = match resolve_addrs(dns, &host, port) {
        Ok(addrs) => addrs,
        Err(failure) => return failed(started, failure.to_string()),
    };

    let mut last_error = None;
    for addr in addrs.iter().take(max_addrs.max(1)) {
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            last_error = Some("timeout:preflight budget exhausted".to_string());
            break;
        }
        match TcpStream::connect_timeout(addr, remaining) {
            Ok(_) => {
                debug!(host = %host, %addr, "port reachable");
                return PreflightResult {
                    ok: true,
                    ip: Some(addr.ip()),
                    elapsed_ms: elapsed_ms(started),
                    error: None,
                };
            }
            Err(err) => {
                debug!(host = %host, %addr, error = %err, "connect failed");
                last_error = Some(ProbeFailure::from_io(&err).to_string());
            }
        }
    }
    failed(
        started,
        last_error.unwrap_or_else(|| "timeout:preflight budget exhausted".to_string()),
    )
}

/// Socket addresses of `host:port`. IP literals skip DNS; names go through
/// `dns`, which carries the resolver timeout.
pub(crate) fn resolve_addrs(
    dns: &dyn DnsLookup,
    host: &str,
    port: u16,
) -> Result<Vec<SocketAddr>, ProbeFailure> {
    let ips = match host.parse::<IpAddr>() {
        Ok(ip) => vec![ip],
        Err(_) => dns
            .lookup_addrs(host)
            .map_err(|err| ProbeFailure::from_lookup(&err))?,
    };
    let addrs = order_addrs(ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect());
    if addrs.is_empty() {
        return Err(ProbeFailure::from_lookup(&LookupError::NoRecords));
    }
    Ok(addrs)
}

/// IPv4 before IPv6, resolver order kept otherwise, duplicates dropped.
pub(crate) fn order_addrs(mut addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
    addrs.sort_by_key(|addr| addr.is_ipv6());
    let mut seen = HashSet::new();
    addrs.retain(|addr| seen.insert(*addr));
    addrs
}

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn failed(started: Instant, error: String) -> PreflightResult {
    PreflightResult {
        ok: false,
        ip: None,
        elapsed_ms: elapsed_ms(started),
        error: Some(error),
    }
}
