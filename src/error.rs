use thiserror::Error;

use crate::store::StoreError;

/// Errors signalled synchronously to the caller.
///
/// Network and protocol conditions are never reported through this type: they
/// are encoded in [`ProbeOutcome`](crate::ProbeOutcome),
/// [`MxResult`](crate::MxResult) and [`CatchallResult`](crate::CatchallResult).
/// What remains are caller bugs, guardrail refusals and store failures.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("domain is empty")]
    EmptyDomain,
    #[error("invalid domain '{0}'")]
    InvalidDomain(String),
    #[error("SMTP probing not allowed for {host}: {reason}")]
    SmtpNotAllowed { host: String, reason: String },
    #[error("TLS connector initialization failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn not_allowed(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SmtpNotAllowed {
            host: host.into(),
            reason: reason.into(),
        }
    }
}
