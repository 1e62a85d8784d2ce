//! SMTP RCPT probing.
//!
//! [`ProbeClient::probe`] runs one EHLO → [STARTTLS → EHLO] → MAIL FROM →
//! RCPT TO exchange against a single MX host and classifies the RCPT reply
//! into a [`SmtpCategory`]. Failures never escape as errors: they are
//! captured as a [`ProbeFailure`] on the returned [`ProbeOutcome`].

mod probe;
mod session;
mod types;

pub use probe::{MailboxProber, ProbeClient};
pub use types::{
    FailureKind, ProbeFailure, ProbeOutcome, ProbeRequest, SmtpCategory, SmtpEvent, SmtpReply,
    Stage, classify_code,
};
