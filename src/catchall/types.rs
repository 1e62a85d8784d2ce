use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchallStatus {
    /// The MX accepted a random local part.
    CatchAll,
    NotCatchAll,
    Tempfail,
    /// The domain publishes no usable exchanger.
    NoMx,
    Error,
}

impl CatchallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatchAll => "catch_all",
            Self::NotCatchAll => "not_catch_all",
            Self::Tempfail => "tempfail",
            Self::NoMx => "no_mx",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CatchallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 2xx catch-all, 5xx not catch-all, 4xx (or no reply because of an error)
/// tempfail, anything else error.
pub fn classify_catchall(code: Option<u16>, has_error: bool) -> CatchallStatus {
    match code {
        Some(200..=299) => CatchallStatus::CatchAll,
        Some(500..=599) => CatchallStatus::NotCatchAll,
        Some(400..=499) => CatchallStatus::Tempfail,
        None if has_error => CatchallStatus::Tempfail,
        _ => CatchallStatus::Error,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatchallResult {
    pub domain: String,
    pub status: CatchallStatus,
    pub mx_host: Option<String>,
    pub rcpt_code: Option<u16>,
    pub message: Option<String>,
    pub localpart: Option<String>,
    pub checked_at: DateTime<Utc>,
    /// Served from the stored verdict without any network traffic.
    pub cached: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}
