use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::behavior::BehaviorHint;
use crate::mx::LookupError;

/// Canonical SMTP verdict vocabulary shared with verdict consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpCategory {
    Accept,
    HardFail,
    TempFail,
    Unknown,
}

impl SmtpCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::HardFail => "hard_fail",
            Self::TempFail => "temp_fail",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SmtpCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 2xx accept, 5xx hard fail, 4xx temp fail, anything else unknown.
pub fn classify_code(code: Option<u16>) -> SmtpCategory {
    match code {
        Some(200..=299) => SmtpCategory::Accept,
        Some(500..=599) => SmtpCategory::HardFail,
        Some(400..=499) => SmtpCategory::TempFail,
        _ => SmtpCategory::Unknown,
    }
}

/// A raw SMTP reply, preserving the numeric status code and message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_transient_failure(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    Greeting,
    Ehlo,
    Helo,
    StartTls,
    MailFrom,
    RcptTo,
    Quit,
}

/// A recorded SMTP transcript event used for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpEvent {
    Sent { stage: Stage, command: String },
    Received { stage: Stage, reply: SmtpReply },
    Error { stage: Stage, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Disconnected,
    Smtp,
    /// Anything else, tagged with the error type name.
    Other(String),
}

/// Why an exchange ended without a usable reply.
///
/// Renders as `timeout:…`, `disconnected:…`, `smtp_error:…` or
/// `error:<Kind>:…`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ProbeFailure {
    pub fn smtp(detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Smtp,
            detail: detail.into(),
        }
    }

    pub fn other(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Other(kind.into()),
            detail: detail.into(),
        }
    }

    pub fn from_io(err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FailureKind::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => FailureKind::Disconnected,
            io::ErrorKind::InvalidData => FailureKind::Smtp,
            other => FailureKind::Other(format!("{other:?}")),
        };
        Self {
            kind,
            detail: err.to_string(),
        }
    }

    /// Host address resolution failures.
    pub fn from_lookup(err: &LookupError) -> Self {
        match err {
            LookupError::NoRecords => Self::other("NoAddress", "no address resolved"),
            LookupError::Unavailable(reason) => Self::other("ResolverUnavailable", reason.clone()),
            LookupError::Failed { kind, message } if kind == "Timeout" => Self {
                kind: FailureKind::Timeout,
                detail: message.clone(),
            },
            LookupError::Failed { kind, message } => Self::other(kind.clone(), message.clone()),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FailureKind::Timeout => write!(f, "timeout:{}", self.detail),
            FailureKind::Disconnected => write!(f, "disconnected:{}", self.detail),
            FailureKind::Smtp => write!(f, "smtp_error:{}", self.detail),
            FailureKind::Other(kind) => write!(f, "error:{kind}:{}", self.detail),
        }
    }
}

/// Parameters of a single RCPT probe.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub email: String,
    pub mx_host: String,
    pub helo_domain: String,
    /// Empty means the null sender `<>`.
    pub mail_from: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// When `None` the client asks the behavior tracker.
    pub hint: Option<BehaviorHint>,
}

impl ProbeRequest {
    pub fn new(email: impl Into<String>, mx_host: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            mx_host: mx_host.into(),
            helo_domain: "localhost".to_string(),
            mail_from: String::new(),
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            hint: None,
        }
    }
}

/// Result of one probe. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    /// An RCPT (or deciding MAIL FROM) reply was captured without transport error.
    pub ok: bool,
    pub category: SmtpCategory,
    pub code: Option<u16>,
    pub message: Option<String>,
    pub mx_host: String,
    pub elapsed_ms: u64,
    #[serde(serialize_with = "serialize_failure")]
    pub error: Option<ProbeFailure>,
    /// Whether the exchange ran over TLS.
    pub tls: bool,
    pub transcript: Vec<SmtpEvent>,
}

impl ProbeOutcome {
    pub(crate) fn from_reply(mx_host: &str, reply: SmtpReply, elapsed_ms: u64) -> Self {
        Self {
            ok: true,
            category: classify_code(Some(reply.code)),
            code: Some(reply.code),
            message: Some(reply.message),
            mx_host: mx_host.to_string(),
            elapsed_ms,
            error: None,
            tls: false,
            transcript: Vec::new(),
        }
    }

    pub(crate) fn failed(mx_host: &str, failure: ProbeFailure, elapsed_ms: u64) -> Self {
        Self {
            ok: false,
            category: SmtpCategory::Unknown,
            code: None,
            message: None,
            mx_host: mx_host.to_string(),
            elapsed_ms,
            error: Some(failure),
            tls: false,
            transcript: Vec::new(),
        }
    }

    pub fn error_string(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

fn serialize_failure<S>(failure: &Option<ProbeFailure>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match failure {
        Some(failure) => serializer.serialize_some(&failure.to_string()),
        None => serializer.serialize_none(),
    }
}
