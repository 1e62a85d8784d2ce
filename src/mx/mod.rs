//! MX resolution with a per-company cache.
//!
//! [`MxResolver::resolve`] answers from the stored [`DomainResolution`] when
//! it is fresh, otherwise queries DNS through a [`DnsLookup`] and upserts the
//! row. Resolution problems are reported as an [`MxFailure`] on the result,
//! never as an error.
//!
//! [`DomainResolution`]: crate::store::DomainResolution

mod dns;
mod error;
mod resolver;
mod types;

pub use dns::{DnsLookup, SystemDns, UnavailableDns};
pub use error::LookupError;
pub use resolver::MxResolver;
pub use types::{MxFailure, MxRecord, MxResult};

#[cfg(test)]
mod tests;
