use std::sync::Arc;
use std::time::{Duration, Instant};

use native_tls::TlsConnector;
use tracing::{debug, info, warn};

use crate::address::{NormalizedAddress, normalize_email, normalize_host};
use crate::behavior::{BehaviorObserver, Observation};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::guard::SmtpGuard;
use crate::mx::DnsLookup;
use crate::preflight::{check_port, elapsed_ms, resolve_addrs};

use super::session::{SmtpSession, TlsUpgrade};
use super::types::{ProbeFailure, ProbeOutcome, ProbeRequest, SmtpEvent, SmtpReply, Stage};

/// Anything able to answer "what does this MX say to RCPT TO for this
/// address". The catch-all detector depends on this seam only.
pub trait MailboxProber: Send + Sync {
    fn probe(&self, request: &ProbeRequest) -> Result<ProbeOutcome, EngineError>;
}

/// Live SMTP implementation of [`MailboxProber`].
pub struct ProbeClient {
    dns: Arc<dyn DnsLookup>,
    observer: Arc<dyn BehaviorObserver>,
    guard: Arc<dyn SmtpGuard>,
    connector: TlsConnector,
    port: u16,
    quit_timeout: Duration,
    preflight: Option<Preflight>,
}

#[derive(Debug, Clone, Copy)]
struct Preflight {
    timeout: Duration,
    max_addrs: usize,
}

impl ProbeClient {
    pub fn new(
        config: &EngineConfig,
        dns: Arc<dyn DnsLookup>,
        observer: Arc<dyn BehaviorObserver>,
        guard: Arc<dyn SmtpGuard>,
    ) -> Result<Self, EngineError> {
        // Opportunistic TLS towards MX hosts: certificates are rarely valid for
        // the name we dial, and a failed check must not abort the probe.
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|source| EngineError::Tls { source })?;
        let preflight = config.preflight.then_some(Preflight {
            timeout: config.preflight_timeout,
            max_addrs: config.preflight_max_addrs,
        });
        Ok(Self {
            dns,
            observer,
            guard,
            connector,
            port: config.smtp_port,
            quit_timeout: config.quit_timeout,
            preflight,
        })
    }

    /// Runs one EHLO → [STARTTLS → EHLO] → MAIL FROM → RCPT TO exchange.
    ///
    /// Network and protocol failures are returned inside the outcome. `Err` is
    /// reserved for a guardrail refusal. Exactly one behavior observation is
    /// recorded per call, whichever path is taken.
    pub fn probe(&self, request: &ProbeRequest) -> Result<ProbeOutcome, EngineError> {
        let started = Instant::now();
        let mx_host = normalize_host(&request.mx_host);

        if mx_host.is_empty() {
            let outcome = ProbeOutcome::failed(
                &mx_host,
                ProbeFailure::other("EmptyMxHost", "mx host is empty"),
                elapsed_ms(started),
            );
            self.observe(&outcome, None);
            return Ok(outcome);
        }

        let address = match normalize_email(&request.email) {
            Ok(address) => address,
            Err(err) => {
                let outcome = ProbeOutcome::failed(
                    &mx_host,
                    ProbeFailure::other("InvalidEmail", err.to_string()),
                    elapsed_ms(started),
                );
                self.observe(&outcome, None);
                return Ok(outcome);
            }
        };
        let domain = Some(address.domain.as_str());

        if let Err(err) = self.guard.check(&mx_host) {
            let outcome = ProbeOutcome::failed(
                &mx_host,
                ProbeFailure::other("SmtpNotAllowed", err.to_string()),
                elapsed_ms(started),
            );
            self.observe(&outcome, domain);
            return Err(err);
        }

        let (connect_timeout, command_timeout) = self.timeouts(request, &mx_host, domain);

        if let Some(preflight) = self.preflight {
            let check = check_port(
                self.dns.as_ref(),
                &mx_host,
                self.port,
                preflight.timeout,
                preflight.max_addrs,
            );
            if !check.ok {
                let failure = check
                    .error
                    .map(|error| ProbeFailure::other("Preflight", error))
                    .unwrap_or_else(|| ProbeFailure::other("Preflight", "unreachable"));
                let outcome = ProbeOutcome::failed(&mx_host, failure, elapsed_ms(started));
                self.observe(&outcome, domain);
                return Ok(outcome);
            }
        }

        let mut transcript = Vec::new();
        let mut tls = false;
        let result = self.exchange(
            &mx_host,
            &address,
            request,
            (connect_timeout, command_timeout),
            &mut transcript,
            &mut tls,
        );
        let elapsed = elapsed_ms(started);
        let mut outcome = match result {
            Ok(reply) => ProbeOutcome::from_reply(&mx_host, reply, elapsed),
            Err(failure) => ProbeOutcome::failed(&mx_host, failure, elapsed),
        };
        outcome.tls = tls;
        outcome.transcript = transcript;

        info!(
            mx_host = %mx_host,
            category = %outcome.category,
            code = ?outcome.code,
            elapsed_ms = outcome.elapsed_ms,
            error = ?outcome.error_string(),
            "probe finished"
        );
        self.observe(&outcome, domain);
        Ok(outcome)
    }

    /// Hint timeouts win; on a lookup error the caller's values are used.
    fn timeouts(
        &self,
        request: &ProbeRequest,
        mx_host: &str,
        domain: Option<&str>,
    ) -> (Duration, Duration) {
        let hint = match request.hint {
            Some(hint) => Ok(hint),
            None => self.observer.hint(mx_host, domain),
        };
        match hint {
            Ok(hint) => {
                debug!(mx_host, profile = %hint.profile, "applying behavior hint");
                (hint.connect_timeout, hint.command_timeout)
            }
            Err(err) => {
                warn!(mx_host, error = %err, "behavior hint unavailable");
                (request.connect_timeout, request.command_timeout)
            }
        }
    }

    fn exchange(
        &self,
        mx_host: &str,
        address: &NormalizedAddress,
        request: &ProbeRequest,
        (connect_timeout, command_timeout): (Duration, Duration),
        transcript: &mut Vec<SmtpEvent>,
        tls: &mut bool,
    ) -> Result<SmtpReply, ProbeFailure> {
        let addrs = resolve_addrs(self.dns.as_ref(), mx_host, self.port)?;
        let mut session = SmtpSession::connect(mx_host, &addrs, connect_timeout, command_timeout)
            .map_err(|err| ProbeFailure::from_io(&err))?;
        debug!(mx_host, peer = %session.peer(), "connected");

        let timeouts = (connect_timeout, command_timeout);
        let result = self.converse(&mut session, address, request, timeouts);
        session.quit(self.quit_timeout);
        *tls = session.is_tls();
        transcript.append(&mut session.events);
        result
    }

    fn converse(
        &self,
        session: &mut SmtpSession,
        address: &NormalizedAddress,
        request: &ProbeRequest,
        (connect_timeout, command_timeout): (Duration, Duration),
    ) -> Result<SmtpReply, ProbeFailure> {
        let helo = if request.helo_domain.trim().is_empty() {
            "localhost"
        } else {
            request.helo_domain.trim()
        };

        open(session, helo)?;

        if session.supports("STARTTLS") {
            match session.starttls(&self.connector) {
                TlsUpgrade::Upgraded => greet(session, helo)?,
                TlsUpgrade::Refused(reply) => {
                    debug!(code = reply.code, "STARTTLS refused, continuing in plaintext");
                }
                TlsUpgrade::Failed(reason) => {
                    warn!(reason = %reason, "TLS upgrade failed, reconnecting in plaintext");
                    session
                        .reopen(connect_timeout, command_timeout)
                        .map_err(|err| ProbeFailure::from_io(&err))?;
                    open(session, helo)?;
                }
            }
        }

        let mail_from = format!("MAIL FROM:<{}>", request.mail_from.trim());
        let mail_reply = session
            .command(Stage::MailFrom, &mail_from)
            .map_err(|err| ProbeFailure::from_io(&err))?;
        if !mail_reply.is_positive_completion() {
            return Ok(mail_reply);
        }

        let rcpt = format!("RCPT TO:<{address}>");
        session
            .command(Stage::RcptTo, &rcpt)
            .map_err(|err| ProbeFailure::from_io(&err))
    }

    fn observe(&self, outcome: &ProbeOutcome, domain: Option<&str>) {
        self.observer.record(Observation {
            mx_host: outcome.mx_host.clone(),
            domain: domain.map(str::to_string),
            code: outcome.code,
            elapsed_ms: outcome.elapsed_ms,
            error_kind: outcome.error_string(),
        });
    }
}

/// Greeting, then EHLO/HELO. Both must be positive.
fn open(session: &mut SmtpSession, helo: &str) -> Result<(), ProbeFailure> {
    let greeting = session
        .read_greeting()
        .map_err(|err| ProbeFailure::from_io(&err))?;
    if !greeting.is_positive_completion() {
        return Err(ProbeFailure::smtp(format!(
            "greeting {} {}",
            greeting.code, greeting.message
        )));
    }
    greet(session, helo)
}

/// EHLO, falling back to HELO; the final reply must be positive.
fn greet(session: &mut SmtpSession, helo: &str) -> Result<(), ProbeFailure> {
    let hello = session.hello(helo).map_err(|err| ProbeFailure::from_io(&err))?;
    if !hello.is_positive_completion() {
        return Err(ProbeFailure::smtp(format!(
            "HELO rejected {} {}",
            hello.code, hello.message
        )));
    }
    Ok(())
}

impl MailboxProber for ProbeClient {
    fn probe(&self, request: &ProbeRequest) -> Result<ProbeOutcome, EngineError> {
        ProbeClient::probe(self, request)
    }
}
