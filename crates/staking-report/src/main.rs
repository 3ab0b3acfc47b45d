//! Staking Report
//!
//! Runs the staking analytics pipeline over one staking-analysis API payload
//! and prints the derived events, aggregates, timeline and performance
//! metrics as JSON.
//!
//! ```text
//! staking-report payload.json
//! curl -s "$API/staking-analysis/$WALLET" | staking-report
//! ```

mod config;

use std::fs;
use std::io::{self, Read, Write};

use anyhow::Context;
use staking_core::{analyze, parse_payload, to_json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, ReportConfig};

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("staking_report=info,staking_core=warn")
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Using default configuration");
        AppConfig::default()
    });

    if let Some(input) = std::env::args().nth(1) {
        config.report.input = input;
    }

    tracing::info!(
        input = %config.report.input,
        pretty = config.report.pretty,
        "Configuration loaded"
    );

    let raw = read_input(&config.report)?;
    let payload = parse_payload(&raw).context("Failed to parse staking payload")?;
    let analytics = analyze(&payload);

    tracing::info!(
        events = analytics.events.len(),
        days = analytics.timeline.len(),
        roi = analytics.performance.roi,
        "Staking analytics computed"
    );

    let report = to_json(&analytics, config.report.pretty)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", report).context("Failed to write report")?;
    stdout.flush().context("Failed to flush report")?;

    Ok(())
}

fn read_input(report: &ReportConfig) -> anyhow::Result<String> {
    if report.reads_stdin() {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read payload from stdin")?;
        return Ok(raw);
    }

    fs::read_to_string(&report.input)
        .with_context(|| format!("Failed to read payload from {}", report.input))
}
