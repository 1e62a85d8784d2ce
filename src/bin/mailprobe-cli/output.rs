use anyhow::Result;
use serde::Serialize;

use mailprobe::smtp::SmtpEvent;
use mailprobe::{BehaviorHint, CatchallResult, MxResult, PreflightResult, ProbeOutcome};

use crate::args::Format;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn mx(format: Format, result: &MxResult) -> Result<()> {
    if format == Format::Json {
        return print_json(result);
    }
    let origin = if result.cached { " (cached)" } else { "" };
    match &result.failure {
        Some(failure) => println!("[NO MX] {} :: {failure}{origin}", result.domain),
        None => {
            let records = result
                .records()
                .iter()
                .map(|r| format!("{}:{}", r.preference, r.exchange))
                .collect::<Vec<_>>()
                .join(", ");
            println!("[OK]    {} :: {records}{origin}", result.domain);
        }
    }
    Ok(())
}

pub fn probe(format: Format, outcome: &ProbeOutcome, transcript: bool) -> Result<()> {
    if format == Format::Json {
        return print_json(outcome);
    }
    let code = outcome
        .code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "[{}] {} code={code} {}ms{}",
        outcome.category,
        outcome.mx_host,
        outcome.elapsed_ms,
        if outcome.tls { " tls" } else { "" }
    );
    if let Some(message) = &outcome.message {
        println!("        {message}");
    }
    if let Some(error) = outcome.error_string() {
        println!("        error: {error}");
    }
    if transcript {
        for event in &outcome.transcript {
            match event {
                SmtpEvent::Sent { command, .. } => println!("  > {command}"),
                SmtpEvent::Received { reply, .. } => {
                    for line in reply.message.lines() {
                        println!("  < {} {line}", reply.code);
                    }
                }
                SmtpEvent::Error { stage, message } => println!("  ! {stage:?}: {message}"),
            }
        }
    }
    Ok(())
}

pub fn catchall(format: Format, result: &CatchallResult) -> Result<()> {
    if format == Format::Json {
        return print_json(result);
    }
    let mx_host = result.mx_host.as_deref().unwrap_or("-");
    let code = result
        .rcpt_code
        .map(|code| code.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "[{}] {} via {mx_host} code={code}{}",
        result.status,
        result.domain,
        if result.cached { " (cached)" } else { "" }
    );
    if let Some(error) = &result.error {
        println!("        error: {error}");
    }
    Ok(())
}

pub fn preflight(format: Format, mx_host: &str, result: &PreflightResult) -> Result<()> {
    if format == Format::Json {
        return print_json(result);
    }
    match (&result.ip, &result.error) {
        (Some(ip), _) if result.ok => {
            println!("[OK]    {mx_host} reachable at {ip} ({}ms)", result.elapsed_ms)
        }
        (_, error) => println!(
            "[FAIL]  {mx_host} :: {} ({}ms)",
            error.as_deref().unwrap_or("unreachable"),
            result.elapsed_ms
        ),
    }
    Ok(())
}

#[derive(Serialize)]
struct HintView<'a> {
    mx_host: &'a str,
    profile: String,
    connect_timeout_secs: u64,
    command_timeout_secs: u64,
    max_retries: u8,
}

pub fn hint(format: Format, mx_host: &str, hint: &BehaviorHint) -> Result<()> {
    let view = HintView {
        mx_host,
        profile: hint.profile.to_string(),
        connect_timeout_secs: hint.connect_timeout.as_secs(),
        command_timeout_secs: hint.command_timeout.as_secs(),
        max_retries: hint.max_retries,
    };
    if format == Format::Json {
        return print_json(&view);
    }
    println!(
        "[{}] {} connect={}s command={}s retries={}",
        view.profile,
        view.mx_host,
        view.connect_timeout_secs,
        view.command_timeout_secs,
        view.max_retries
    );
    Ok(())
}
