use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::guard::SmtpPolicy;

/// Knobs shared by every component of the [`Engine`](crate::Engine).
///
/// Durations are (de)serialized as whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub helo_domain: String,
    /// Envelope sender; empty means the null sender `<>`.
    pub mail_from: String,
    pub smtp_port: u16,
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    #[serde(with = "secs")]
    pub command_timeout: Duration,
    #[serde(with = "secs")]
    pub quit_timeout: Duration,
    #[serde(with = "secs")]
    pub dns_timeout: Duration,
    #[serde(with = "secs")]
    pub mx_ttl: Duration,
    #[serde(with = "secs")]
    pub catchall_ttl: Duration,
    /// Run a port-25 connect check before each SMTP handshake.
    pub preflight: bool,
    #[serde(with = "secs")]
    pub preflight_timeout: Duration,
    pub preflight_max_addrs: usize,
    pub policy: SmtpPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            helo_domain: "localhost".to_string(),
            mail_from: String::new(),
            smtp_port: 25,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(10),
            quit_timeout: Duration::from_secs(2),
            dns_timeout: Duration::from_secs(5),
            mx_ttl: Duration::from_secs(24 * 3600),
            catchall_ttl: Duration::from_secs(24 * 3600),
            preflight: false,
            preflight_timeout: Duration::from_secs(3),
            preflight_max_addrs: 2,
            policy: SmtpPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Envelope sender for `MAIL FROM`, falling back to the null sender.
    pub fn envelope_sender(&self) -> &str {
        self.mail_from.trim()
    }

    pub fn helo_name(&self) -> &str {
        let helo = self.helo_domain.trim();
        if helo.is_empty() { "localhost" } else { helo }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
