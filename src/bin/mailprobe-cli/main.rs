mod args;
mod output;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};
use mailprobe::{CatchallStatus, Engine, EngineConfig, MemoryStore, SmtpCategory, normalize_email};

// exit codes: 0 OK, 2 negative verdict, 1 fatal
fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let store = match &cli.store {
        Some(path) => MemoryStore::load(path)
            .with_context(|| format!("load store snapshot {}", path.display()))?,
        None => MemoryStore::new(),
    };
    let store = Arc::new(store);
    let engine = Engine::new(config, store.clone()).context("build engine")?;

    let negative = run(&cli, &engine)?;

    if let Some(path) = &cli.store {
        store
            .save(path)
            .with_context(|| format!("save store snapshot {}", path.display()))?;
    }
    if negative {
        std::process::exit(2);
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// File, then `MAILPROBE_SMTP_*`, then flags.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    config.policy = config.policy.overlay_env();
    if cli.enable_smtp {
        config.policy.enabled = true;
    }
    if let Some(helo) = &cli.helo {
        config.helo_domain = helo.clone();
    }
    if let Some(from) = &cli.mail_from {
        config.mail_from = from.clone();
    }
    if cli.preflight {
        config.preflight = true;
    }
    Ok(config)
}

/// Returns whether the verdict is negative.
fn run(cli: &Cli, engine: &Engine) -> Result<bool> {
    match &cli.cmd {
        Commands::Mx { domain, force } => {
            let result = engine.resolve_mx(cli.company, domain, *force)?;
            output::mx(cli.format, &result)?;
            Ok(result.failure.is_some())
        }
        Commands::Probe {
            email,
            mx,
            transcript,
        } => {
            let mx_host = match mx {
                Some(host) => host.clone(),
                None => {
                    let address = normalize_email(email)
                        .with_context(|| format!("invalid address '{email}'"))?;
                    let resolved = engine.resolve_mx(cli.company, &address.domain, false)?;
                    match resolved.lowest_mx.clone() {
                        Some(host) => host,
                        None => {
                            output::mx(cli.format, &resolved)?;
                            return Ok(true);
                        }
                    }
                }
            };
            let outcome = engine.probe(email, &mx_host)?;
            output::probe(cli.format, &outcome, *transcript)?;
            Ok(outcome.category != SmtpCategory::Accept)
        }
        Commands::Catchall { domain, force } => {
            let result = engine.check_catchall(cli.company, domain, *force)?;
            output::catchall(cli.format, &result)?;
            Ok(!matches!(
                result.status,
                CatchallStatus::CatchAll | CatchallStatus::NotCatchAll
            ))
        }
        Commands::Preflight { mx_host } => {
            let result = engine.check_port25(mx_host);
            output::preflight(cli.format, mx_host, &result)?;
            Ok(!result.ok)
        }
        Commands::Hint { mx_host, domain } => {
            let hint = engine.hint(mx_host, domain.as_deref())?;
            output::hint(cli.format, mx_host, &hint)?;
            Ok(false)
        }
    }
}
