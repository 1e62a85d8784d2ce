//! Allow-check gating every live SMTP exchange.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::address::normalize_host;
use crate::error::EngineError;

pub const ENV_ENABLED: &str = "MAILPROBE_SMTP_ENABLED";
pub const ENV_ALLOW: &str = "MAILPROBE_SMTP_ALLOW";
pub const ENV_DENY: &str = "MAILPROBE_SMTP_DENY";

/// Refusal is a hard stop, not a retryable condition.
pub trait SmtpGuard: Send + Sync {
    fn check(&self, mx_host: &str) -> Result<(), EngineError>;
}

/// Host-suffix policy. Disabled unless explicitly enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpPolicy {
    pub enabled: bool,
    /// When non-empty, only hosts matching one of these suffixes are probed.
    pub allowed_hosts: Vec<String>,
    /// Always refused; wins over `allowed_hosts`.
    pub denied_hosts: Vec<String>,
}

impl SmtpPolicy {
    pub fn allow_all() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// Applies `MAILPROBE_SMTP_*` variables on top of `self`.
    pub fn overlay_env(mut self) -> Self {
        if let Ok(value) = std::env::var(ENV_ENABLED) {
            self.enabled = parse_flag(&value);
        }
        if let Ok(value) = std::env::var(ENV_ALLOW) {
            self.allowed_hosts = split_list(&value);
        }
        if let Ok(value) = std::env::var(ENV_DENY) {
            self.denied_hosts = split_list(&value);
        }
        self
    }
}

impl SmtpGuard for SmtpPolicy {
    fn check(&self, mx_host: &str) -> Result<(), EngineError> {
        let host = normalize_host(mx_host);
        let refusal = if !self.enabled {
            Some("SMTP probing disabled")
        } else if self.denied_hosts.iter().any(|p| suffix_matches(&host, p)) {
            Some("host is denied")
        } else if !self.allowed_hosts.is_empty()
            && !self.allowed_hosts.iter().any(|p| suffix_matches(&host, p))
        {
            Some("host not in allow list")
        } else {
            None
        };
        match refusal {
            Some(reason) => {
                warn!(mx_host = %host, reason, "SMTP probe refused");
                Err(EngineError::not_allowed(host, reason))
            }
            None => Ok(()),
        }
    }
}

fn suffix_matches(host: &str, pattern: &str) -> bool {
    let pattern = normalize_host(pattern.trim_start_matches('.'));
    if pattern.is_empty() {
        return false;
    }
    host == pattern
        || host
            .strip_suffix(pattern.as_str())
            .is_some_and(|rest| rest.ends_with('.'))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
