//! Catch-all detection: does the domain's primary MX accept a mailbox that
//! cannot exist?
//!
//! The verdict is stored on the domain's resolution row and reused until
//! `catchall_ttl` elapses.

mod types;

pub use types::{CatchallResult, CatchallStatus, classify_catchall};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, info, warn};

use crate::address::normalize_domain;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::guard::SmtpGuard;
use crate::mx::MxResolver;
use crate::preflight::elapsed_ms;
use crate::smtp::{MailboxProber, ProbeRequest};
use crate::store::{CatchAllRecord, DomainResolution, ResolutionStore};

/// Prefix of generated probe mailboxes.
pub const LOCALPART_PREFIX: &str = "_ca_";

pub struct CatchAllDetector {
    resolver: Arc<MxResolver>,
    prober: Arc<dyn MailboxProber>,
    guard: Arc<dyn SmtpGuard>,
    store: Arc<dyn ResolutionStore>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl CatchAllDetector {
    pub fn new(
        resolver: Arc<MxResolver>,
        prober: Arc<dyn MailboxProber>,
        guard: Arc<dyn SmtpGuard>,
        store: Arc<dyn ResolutionStore>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            resolver,
            prober,
            guard,
            store,
            clock,
            config,
        }
    }

    /// Returns the catch-all verdict for `domain`, probing its lowest MX with
    /// a random mailbox unless a fresh verdict is stored and `force` is false.
    pub fn check(
        &self,
        company_id: i64,
        domain: &str,
        force: bool,
    ) -> Result<CatchallResult, EngineError> {
        let trimmed = domain.trim();
        if trimmed.contains('@') {
            return Err(EngineError::InvalidDomain(domain.to_string()));
        }
        let domain = normalize_domain(trimmed);
        if domain.is_empty() {
            return Err(EngineError::InvalidDomain(trimmed.to_string()));
        }

        if !force {
            if let Some(cached) = self.cached(company_id, &domain)? {
                return Ok(cached);
            }
        }

        let started = Instant::now();
        let mx = self
            .resolver
            .resolve(company_id, &domain, false, self.config.mx_ttl)?;

        let lowest_mx = match (&mx.failure, &mx.lowest_mx) {
            (Some(failure), _) => {
                let status = if failure.is_no_mail() {
                    CatchallStatus::NoMx
                } else {
                    CatchallStatus::Error
                };
                let verdict = Verdict::failed(status, failure.to_string());
                return self.persist(company_id, &domain, None, verdict, started);
            }
            (None, None) => {
                let verdict = Verdict::failed(CatchallStatus::NoMx, "no lowest MX");
                return self.persist(company_id, &domain, None, verdict, started);
            }
            (None, Some(host)) => host.clone(),
        };

        self.guard.check(&lowest_mx)?;

        let localpart = random_localpart();
        let request = ProbeRequest {
            helo_domain: self.config.helo_name().to_string(),
            mail_from: self.config.envelope_sender().to_string(),
            connect_timeout: self.config.connect_timeout,
            command_timeout: self.config.command_timeout,
            ..ProbeRequest::new(format!("{localpart}@{domain}"), lowest_mx.clone())
        };
        let outcome = self.prober.probe(&request)?;

        let verdict = Verdict {
            status: classify_catchall(outcome.code, outcome.error.is_some()),
            localpart: Some(localpart),
            code: outcome.code,
            message: outcome.message.clone(),
            error: outcome.error_string(),
        };
        self.persist(company_id, &domain, Some(lowest_mx), verdict, started)
    }

    fn cached(&self, company_id: i64, domain: &str) -> Result<Option<CatchallResult>, EngineError> {
        let Some(row) = self.store.latest(company_id, domain)? else {
            return Ok(None);
        };
        let Some(record) = row.catch_all.as_ref() else {
            return Ok(None);
        };
        if !within_ttl(record.checked_at, self.clock.now(), &self.config) {
            return Ok(None);
        }
        debug!(company_id, domain, status = %record.status, "catch-all cache hit");
        Ok(Some(from_record(&row, record)))
    }

    fn persist(
        &self,
        company_id: i64,
        domain: &str,
        mx_host: Option<String>,
        verdict: Verdict,
        started: Instant,
    ) -> Result<CatchallResult, EngineError> {
        let checked_at = self.clock.now();
        let record = CatchAllRecord {
            status: verdict.status,
            checked_at,
            localpart: verdict.localpart.clone(),
            smtp_code: verdict.code,
            smtp_msg: verdict.message.clone(),
            mx_host: mx_host.clone(),
            error: verdict.error.clone(),
        };
        if !self.store.record_catch_all(company_id, domain, record)? {
            warn!(company_id, domain, "no resolution row, catch-all verdict not stored");
        }

        info!(
            company_id,
            domain,
            status = %verdict.status,
            mx_host = ?mx_host,
            code = ?verdict.code,
            "catch-all checked"
        );
        Ok(CatchallResult {
            domain: domain.to_string(),
            status: verdict.status,
            mx_host,
            rcpt_code: verdict.code,
            message: verdict.message,
            localpart: verdict.localpart,
            checked_at,
            cached: false,
            elapsed_ms: elapsed_ms(started),
            error: verdict.error,
        })
    }
}

struct Verdict {
    status: CatchallStatus,
    localpart: Option<String>,
    code: Option<u16>,
    message: Option<String>,
    error: Option<String>,
}

impl Verdict {
    fn failed(status: CatchallStatus, error: impl Into<String>) -> Self {
        Self {
            status,
            localpart: None,
            code: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

fn within_ttl(checked_at: DateTime<Utc>, now: DateTime<Utc>, config: &EngineConfig) -> bool {
    match TimeDelta::from_std(config.catchall_ttl) {
        Ok(ttl) => now.signed_duration_since(checked_at) < ttl,
        Err(_) => true,
    }
}

fn from_record(row: &DomainResolution, record: &CatchAllRecord) -> CatchallResult {
    CatchallResult {
        domain: row.domain.clone(),
        status: record.status,
        mx_host: record.mx_host.clone(),
        rcpt_code: record.smtp_code,
        message: record.smtp_msg.clone(),
        localpart: record.localpart.clone(),
        checked_at: record.checked_at,
        cached: true,
        elapsed_ms: 0,
        error: record.error.clone(),
    }
}

/// `_ca_` followed by 16 hex digits from the OS random source.
pub fn random_localpart() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{LOCALPART_PREFIX}{hex}")
}

#[cfg(test)]
mod tests;
