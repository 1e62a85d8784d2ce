use thiserror::Error;

/// What a [`DnsLookup`](super::DnsLookup) backend can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Empty answer or NXDOMAIN.
    #[error("no records found")]
    NoRecords,
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
    #[error("{kind}: {message}")]
    Failed { kind: String, message: String },
}

impl LookupError {
    pub(crate) fn failed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            kind: kind.into(),
            message: message.into(),
        }
    }
}
