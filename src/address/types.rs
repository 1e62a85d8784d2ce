use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAddress {
    /// Local part exactly as supplied.
    pub local: String,
    /// Lowercase IDNA-ASCII domain.
    pub domain: String,
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must contain '@'")]
    MissingAt,
    #[error("local part is empty")]
    EmptyLocalPart,
    #[error("local part length {0} > 64")]
    LocalPartTooLong(usize),
    #[error("domain is empty")]
    EmptyDomain,
    #[error("address length {0} > 254")]
    TooLong(usize),
}
