//! Warden governance core: demo CLI
//!
//! Wires every component from an optional TOML configuration and runs the
//! end-to-end governance scenarios.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- --config governance.toml policy
//!   RUST_LOG=debug cargo run -p demo -- identity

mod governance;
mod scenarios;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use warden_contracts::config::GovernanceConfig;

use governance::Governance;
use scenarios::DemoResult;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Warden: runtime governance for autonomous agents.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Warden governance core demo",
    long_about = "Runs Warden scenarios showing policy enforcement, prompt-injection\n\
                  shielding, PII detection, risk scoring, drift detection, identity\n\
                  revocation and the hash-chained audit trail."
)]
struct Cli {
    /// Governance configuration (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence, then print an executive summary.
    RunAll,
    /// Deleting restricted data is blocked with one critical violation.
    Policy,
    /// An instruction-override prompt is flagged and sanitized.
    Injection,
    /// Email and a Luhn-valid card are found and redacted.
    Pii,
    /// A context with no estimates yields low risk confidence.
    Risk,
    /// A delete action outside a read-only scope is drift.
    Drift,
    /// Revoking an agent removes its permissions and credentials.
    Identity,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for per-evaluation detail.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    match run(cli).await {
        Ok(()) => {
            println!();
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> DemoResult {
    let config = match &cli.config {
        Some(path) => GovernanceConfig::from_file(path)?,
        None => GovernanceConfig::default(),
    };
    let gov = Governance::build(config)?;

    match cli.command {
        Command::RunAll => {
            scenarios::restricted_delete(&gov).await?;
            scenarios::prompt_injection(&gov)?;
            scenarios::pii_scan(&gov)?;
            scenarios::risk_confidence(&gov)?;
            scenarios::scope_drift(&gov).await?;
            scenarios::revocation(&gov)?;
            scenarios::audit_report(&gov)?;
        }
        Command::Policy => scenarios::restricted_delete(&gov).await?,
        Command::Injection => scenarios::prompt_injection(&gov)?,
        Command::Pii => scenarios::pii_scan(&gov)?,
        Command::Risk => scenarios::risk_confidence(&gov)?,
        Command::Drift => scenarios::scope_drift(&gov).await?,
        Command::Identity => scenarios::revocation(&gov)?,
    }

    println!();
    println!("  events published: {}", gov.events.events().len());
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Warden: Agent Governance Core");
    println!("=============================");
    println!();
    println!("Governance pipeline per request:");
    println!("  [1] Text inputs scanned for PII and prompt injection");
    println!("  [2] Ten-factor risk score attached");
    println!("  [3] Task adherence scored when an execution is supplied");
    println!("  [4] Every enabled policy evaluated; failures recorded as violations");
    println!("  [5] Decision record appended to the SHA-256 audit chain");
}
