use std::sync::Arc;

use tracing::warn;

use crate::behavior::{BehaviorHint, BehaviorTracker};
use crate::catchall::{CatchAllDetector, CatchallResult};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::guard::SmtpGuard;
use crate::mx::{DnsLookup, MxResolver, MxResult, SystemDns, UnavailableDns};
use crate::preflight::{PreflightResult, check_port};
use crate::smtp::{ProbeClient, ProbeOutcome, ProbeRequest};
use crate::store::ResolutionStore;

/// All components wired around one store and one clock.
///
/// `Engine` is `Send + Sync`; share it behind an `Arc` between worker
/// threads.
pub struct Engine {
    config: Arc<EngineConfig>,
    store: Arc<dyn ResolutionStore>,
    dns: Arc<dyn DnsLookup>,
    resolver: Arc<MxResolver>,
    tracker: Arc<BehaviorTracker>,
    prober: Arc<ProbeClient>,
    detector: CatchAllDetector,
}

impl Engine {
    /// Uses the system DNS configuration, the wall clock and
    /// `config.policy` as the SMTP guard.
    pub fn new(config: EngineConfig, store: Arc<dyn ResolutionStore>) -> Result<Self, EngineError> {
        let dns: Arc<dyn DnsLookup> = match SystemDns::from_system_conf(config.dns_timeout) {
            Ok(dns) => Arc::new(dns),
            Err(err) => {
                warn!(error = %err, "system resolver configuration unavailable");
                Arc::new(UnavailableDns::new(err.to_string()))
            }
        };
        let guard = Arc::new(config.policy.clone());
        Self::with_parts(config, store, dns, Arc::new(SystemClock), guard)
    }

    pub fn with_parts(
        config: EngineConfig,
        store: Arc<dyn ResolutionStore>,
        dns: Arc<dyn DnsLookup>,
        clock: Arc<dyn Clock>,
        guard: Arc<dyn SmtpGuard>,
    ) -> Result<Self, EngineError> {
        let config = Arc::new(config);
        let resolver = Arc::new(MxResolver::new(dns.clone(), store.clone(), clock.clone()));
        let tracker = Arc::new(BehaviorTracker::new(store.clone(), clock.clone()));
        let prober = Arc::new(ProbeClient::new(
            &config,
            dns.clone(),
            tracker.clone(),
            guard.clone(),
        )?);
        let detector = CatchAllDetector::new(
            resolver.clone(),
            prober.clone(),
            guard,
            store.clone(),
            clock,
            config.clone(),
        );
        Ok(Self {
            config,
            store,
            dns,
            resolver,
            tracker,
            prober,
            detector,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResolutionStore> {
        &self.store
    }

    pub fn resolve_mx(
        &self,
        company_id: i64,
        domain: &str,
        force: bool,
    ) -> Result<MxResult, EngineError> {
        self.resolver
            .resolve(company_id, domain, force, self.config.mx_ttl)
    }

    /// Probes `email` at `mx_host` with the configured envelope and timeouts;
    /// the behavior hint of the host overrides the timeouts.
    pub fn probe(&self, email: &str, mx_host: &str) -> Result<ProbeOutcome, EngineError> {
        let request = ProbeRequest {
            helo_domain: self.config.helo_name().to_string(),
            mail_from: self.config.envelope_sender().to_string(),
            connect_timeout: self.config.connect_timeout,
            command_timeout: self.config.command_timeout,
            ..ProbeRequest::new(email, mx_host)
        };
        self.prober.probe(&request)
    }

    pub fn probe_with(&self, request: &ProbeRequest) -> Result<ProbeOutcome, EngineError> {
        self.prober.probe(request)
    }

    pub fn check_catchall(
        &self,
        company_id: i64,
        domain: &str,
        force: bool,
    ) -> Result<CatchallResult, EngineError> {
        self.detector.check(company_id, domain, force)
    }

    pub fn hint(&self, mx_host: &str, domain: Option<&str>) -> Result<BehaviorHint, EngineError> {
        Ok(self.tracker.get_hint(mx_host, domain)?)
    }

    pub fn check_port25(&self, mx_host: &str) -> PreflightResult {
        check_port(
            self.dns.as_ref(),
            mx_host,
            self.config.smtp_port,
            self.config.preflight_timeout,
            self.config.preflight_max_addrs,
        )
    }
}
