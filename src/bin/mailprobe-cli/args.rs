use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "mailprobe-cli",
    version,
    about = "MX resolution, SMTP mailbox probing and catch-all detection"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,

    /// engine configuration (JSON, partial files keep defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// resolution store snapshot, loaded at start and saved back on success
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Human)]
    pub format: Format,

    /// company the cached rows belong to
    #[arg(long, global = true, default_value_t = 0)]
    pub company: i64,

    /// allow live SMTP traffic (same as MAILPROBE_SMTP_ENABLED=1)
    #[arg(long, global = true)]
    pub enable_smtp: bool,

    /// name used for EHLO/HELO
    #[arg(long, global = true)]
    pub helo: Option<String>,

    /// envelope MAIL FROM (null sender when omitted)
    #[arg(long = "from", global = true)]
    pub mail_from: Option<String>,

    /// connect-check port 25 before each SMTP handshake
    #[arg(long, global = true)]
    pub preflight: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve the MX hosts of a domain
    Mx {
        domain: String,
        /// ignore the cached resolution
        #[arg(long)]
        force: bool,
    },
    /// Ask one MX host whether it accepts a mailbox (RCPT TO)
    Probe {
        email: String,
        /// MX host to probe; defaults to the lowest MX of the address domain
        #[arg(long)]
        mx: Option<String>,
        /// print the SMTP transcript
        #[arg(long)]
        transcript: bool,
    },
    /// Check whether a domain accepts mail for any local part
    Catchall {
        domain: String,
        /// ignore the stored verdict
        #[arg(long)]
        force: bool,
    },
    /// TCP connect check against port 25
    Preflight { mx_host: String },
    /// Show the timeouts suggested for the next probe of an MX host
    Hint {
        mx_host: String,
        #[arg(long)]
        domain: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Human,
    Json,
}
