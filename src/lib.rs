#![forbid(unsafe_code)]
//! mailprobe: MX resolution, SMTP mailbox probing and catch-all detection.
//!
//! The [`Engine`] wires the components around one [`ResolutionStore`]:
//!
//! * [`MxResolver`] resolves and caches exchangers per (company, domain);
//! * [`ProbeClient`] runs a single RCPT TO probe against one MX host;
//! * [`BehaviorTracker`] learns per-host latency and reply mix and suggests
//!   timeouts for the next probe;
//! * [`CatchAllDetector`] probes a random mailbox to tell whether a domain
//!   accepts everything.
//!
//! Every live SMTP exchange is gated by an [`SmtpGuard`]; the bundled
//! [`SmtpPolicy`] is disabled unless explicitly enabled.

pub mod address;
pub mod behavior;
pub mod catchall;
pub mod clock;
pub mod config;
mod engine;
mod error;
pub mod guard;
pub mod mx;
pub mod preflight;
pub mod smtp;
pub mod store;

pub use address::{AddressError, NormalizedAddress, normalize_domain, normalize_email};
pub use behavior::{BehaviorHint, BehaviorObserver, BehaviorTracker, HintProfile, MxBehaviorStats};
pub use catchall::{CatchAllDetector, CatchallResult, CatchallStatus};
pub use clock::{Clock, SystemClock};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use guard::{SmtpGuard, SmtpPolicy};
pub use mx::{DnsLookup, MxFailure, MxRecord, MxResolver, MxResult};
pub use preflight::{PreflightResult, check_port25};
pub use smtp::{MailboxProber, ProbeClient, ProbeOutcome, ProbeRequest, SmtpCategory, classify_code};
pub use store::{DomainResolution, MemoryStore, ResolutionStore, StoreError};
