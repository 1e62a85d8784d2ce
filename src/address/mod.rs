//! Canonical forms for domains and mailbox addresses.
//!
//! Every component keys its state by the output of [`normalize_domain`], so
//! cache lookups, behavior matching and RCPT envelopes agree on one spelling.

mod domain;
mod types;

pub(crate) use domain::normalize_host;
pub use domain::normalize_domain;
pub use types::{AddressError, NormalizedAddress};

/// RFC 5321 limits.
const MAX_LOCAL_LEN: usize = 64;
const MAX_ADDRESS_LEN: usize = 254;

/// Splits `email` on its last `@`, keeps the local part byte-for-byte and
/// canonicalizes the domain.
pub fn normalize_email(email: &str) -> Result<NormalizedAddress, AddressError> {
    let input = email.trim();
    let (local, domain) = input.rsplit_once('@').ok_or(AddressError::MissingAt)?;

    if local.is_empty() {
        return Err(AddressError::EmptyLocalPart);
    }
    if local.len() > MAX_LOCAL_LEN {
        return Err(AddressError::LocalPartTooLong(local.len()));
    }

    let ascii = normalize_domain(domain);
    if ascii.is_empty() {
        return Err(AddressError::EmptyDomain);
    }

    let normalized = NormalizedAddress {
        local: local.to_string(),
        domain: ascii,
    };
    let total = normalized.local.len() + 1 + normalized.domain.len();
    if total > MAX_ADDRESS_LEN {
        return Err(AddressError::TooLong(total));
    }
    Ok(normalized)
}
