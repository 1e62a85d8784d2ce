use std::net::IpAddr;
use std::time::Duration;

use trust_dns_resolver::Resolver;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::system_conf::read_system_conf;

use crate::address::normalize_host;

use super::{LookupError, MxRecord};

/// DNS questions the resolver needs answered.
pub trait DnsLookup: Send + Sync {
    /// MX records of `domain`, exchange names as returned by DNS.
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, LookupError>;

    /// Whether `domain` has at least one A or AAAA record.
    fn has_address(&self, domain: &str) -> Result<bool, LookupError>;

    /// A and AAAA records of `host`, in resolver order.
    fn lookup_addrs(&self, host: &str) -> Result<Vec<IpAddr>, LookupError>;
}

/// Blocking resolver built from the host's resolver configuration.
pub struct SystemDns {
    resolver: Resolver,
}

impl SystemDns {
    pub fn from_system_conf(timeout: Duration) -> std::io::Result<Self> {
        let (config, mut opts) = read_system_conf()?;
        opts.timeout = timeout;
        let resolver = Resolver::new(config, opts)?;
        Ok(Self { resolver })
    }
}

impl DnsLookup for SystemDns {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, LookupError> {
        let lookup = self.resolver.mx_lookup(domain).map_err(lookup_error)?;
        Ok(lookup
            .iter()
            .map(|mx| {
                let exchange = normalize_host(&mx.exchange().to_utf8());
                MxRecord::new(mx.preference(), exchange)
            })
            .collect())
    }

    fn has_address(&self, domain: &str) -> Result<bool, LookupError> {
        match self.lookup_addrs(domain) {
            Ok(addrs) => Ok(!addrs.is_empty()),
            Err(LookupError::NoRecords) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn lookup_addrs(&self, host: &str) -> Result<Vec<IpAddr>, LookupError> {
        let lookup = self.resolver.lookup_ip(host).map_err(lookup_error)?;
        Ok(lookup.iter().collect())
    }
}

/// Stands in when the system resolver could not be configured; every lookup
/// reports the resolver as unavailable.
#[derive(Debug, Clone)]
pub struct UnavailableDns {
    reason: String,
}

impl UnavailableDns {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl DnsLookup for UnavailableDns {
    fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>, LookupError> {
        Err(LookupError::Unavailable(self.reason.clone()))
    }

    fn has_address(&self, _domain: &str) -> Result<bool, LookupError> {
        Err(LookupError::Unavailable(self.reason.clone()))
    }

    fn lookup_addrs(&self, _host: &str) -> Result<Vec<IpAddr>, LookupError> {
        Err(LookupError::Unavailable(self.reason.clone()))
    }
}

fn lookup_error(err: ResolveError) -> LookupError {
    let kind = match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => return LookupError::NoRecords,
        ResolveErrorKind::Message(_) | ResolveErrorKind::Msg(_) => "Message",
        ResolveErrorKind::NoConnections => "NoConnections",
        ResolveErrorKind::Io(_) => "Io",
        ResolveErrorKind::Proto(_) => "Proto",
        ResolveErrorKind::Timeout => "Timeout",
        _ => "Unknown",
    };
    LookupError::failed(kind, err.to_string())
}
