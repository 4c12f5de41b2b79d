use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use facegate_core::GateStatus;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod enroll;
mod frames;
mod remote;

use config::Config;
use remote::{HttpEnrollmentValidator, HttpMatcher};

#[derive(Parser)]
#[command(name = "facegated")]
#[command(version, about = "Liveness-gated face check-in driven by detector output")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify faces from detector output on stdin; status lines go to stdout
    Run {
        /// Identity-match endpoint (overrides FACEGATE_MATCHER_URL)
        #[arg(long)]
        matcher_url: Option<String>,
    },
    /// Capture consistent scans from stdin and submit them for enrollment
    Enroll {
        /// Enrollment-validation endpoint (overrides FACEGATE_ENROLL_URL)
        #[arg(long)]
        enroll_url: Option<String>,
    },
}

/// One line of the stdout status stream.
#[derive(Serialize)]
struct StatusLine<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    status: &'a GateStatus,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the status stream
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Run { matcher_url } => {
            if let Some(url) = matcher_url {
                config.matcher_url = url;
            }
            run(&config).await
        }
        Commands::Enroll { enroll_url } => {
            if let Some(url) = enroll_url {
                config.enroll_url = url;
            }
            enroll(&config).await
        }
    }
}

async fn run(config: &Config) -> Result<()> {
    tracing::info!(matcher = %config.matcher_url, "facegated starting");

    let matcher = Arc::new(HttpMatcher::new(
        config.matcher_url.clone(),
        Duration::from_millis(config.match_timeout_ms),
    ));
    let (handle, gate_task) = engine::spawn_gate(config.gate_config(), matcher);
    let printer = tokio::spawn(print_status(handle.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            next = frames::next_detection(&mut lines, config.min_detection_confidence) => {
                match next.context("reading detector output")? {
                    Some(detection) => handle.submit(detection).await?,
                    None => {
                        tracing::info!("detector output ended");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    drop(handle);
    gate_task.await.context("gate task failed")?;
    printer.await.context("status printer failed")??;
    tracing::info!("facegated shutting down");
    Ok(())
}

/// Write every published status as a JSON line until the gate task exits.
async fn print_status(mut rx: watch::Receiver<GateStatus>) -> Result<()> {
    loop {
        {
            let status = rx.borrow_and_update();
            let line = StatusLine {
                at: Utc::now(),
                status: &status,
            };
            let mut out = std::io::stdout().lock();
            serde_json::to_writer(&mut out, &line).context("encoding status")?;
            writeln!(out).context("writing status")?;
            out.flush().context("writing status")?;
        }
        if rx.changed().await.is_err() {
            return Ok(());
        }
    }
}

async fn enroll(config: &Config) -> Result<()> {
    let timeout = Duration::from_millis(config.match_timeout_ms);
    let validator = Arc::new(HttpEnrollmentValidator::new(
        config.enroll_url.clone(),
        timeout,
    ));
    let options = enroll::EnrollOptions {
        config: config.enrollment_config(),
        min_confidence: config.min_detection_confidence,
        scan_interval: Duration::from_millis(config.enroll_interval_ms),
        timeout,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let verdict = enroll::run_enroll(&mut lines, &options, validator).await?;
    println!(
        "{}",
        serde_json::to_string(&verdict).context("encoding verdict")?
    );
    if !verdict.is_accepted() {
        anyhow::bail!(
            "enrollment rejected: {}",
            verdict.message.as_deref().unwrap_or("no reason given")
        );
    }
    Ok(())
}
