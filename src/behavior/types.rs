use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::smtp::SmtpCategory;

/// Smoothing factor of the latency average.
pub const EWMA_ALPHA: f64 = 0.3;

/// Rolling statistics for one MX host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MxBehaviorStats {
    pub n: u64,
    pub accept: u64,
    pub hard_fail: u64,
    pub temp_fail: u64,
    pub unknown: u64,
    pub avg_ms: f64,
    pub last_code: Option<u16>,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MxBehaviorStats {
    pub fn observe(
        &mut self,
        category: SmtpCategory,
        elapsed_ms: u64,
        code: Option<u16>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) {
        let sample = elapsed_ms as f64;
        self.avg_ms = if self.n == 0 {
            sample
        } else {
            EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * self.avg_ms
        };
        self.n += 1;
        match category {
            SmtpCategory::Accept => self.accept += 1,
            SmtpCategory::HardFail => self.hard_fail += 1,
            SmtpCategory::TempFail => self.temp_fail += 1,
            SmtpCategory::Unknown => self.unknown += 1,
        }
        self.last_code = code;
        self.last_error = error;
        self.updated_at = Some(now);
    }

    fn ratio(&self, count: u64) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            count as f64 / self.n as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintProfile {
    Normal,
    Tarpit,
    Fast,
}

impl fmt::Display for HintProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Tarpit => "tarpit",
            Self::Fast => "fast",
        })
    }
}

/// Timeouts and retry budget suggested for the next probe of a host.
///
/// `max_retries` is advisory: nothing in this crate retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorHint {
    pub profile: HintProfile,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub max_retries: u8,
}

impl BehaviorHint {
    pub fn normal() -> Self {
        Self {
            profile: HintProfile::Normal,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            max_retries: 1,
        }
    }

    pub fn tarpit() -> Self {
        Self {
            profile: HintProfile::Tarpit,
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
            max_retries: 0,
        }
    }

    pub fn fast() -> Self {
        Self {
            profile: HintProfile::Fast,
            connect_timeout: Duration::from_secs(8),
            command_timeout: Duration::from_secs(8),
            max_retries: 1,
        }
    }

    pub fn from_stats(stats: Option<&MxBehaviorStats>) -> Self {
        let Some(stats) = stats else {
            return Self::normal();
        };
        let slow_or_flaky =
            stats.ratio(stats.temp_fail + stats.unknown) >= 0.5 || stats.avg_ms >= 800.0;
        if stats.n >= 4 && slow_or_flaky {
            return Self::tarpit();
        }
        if stats.n >= 5 && stats.avg_ms <= 150.0 && stats.ratio(stats.hard_fail) < 0.05 {
            return Self::fast();
        }
        Self::normal()
    }
}

impl Default for BehaviorHint {
    fn default() -> Self {
        Self::normal()
    }
}

/// One probe's contribution to the host statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub mx_host: String,
    pub domain: Option<String>,
    pub code: Option<u16>,
    pub elapsed_ms: u64,
    pub error_kind: Option<String>,
}
