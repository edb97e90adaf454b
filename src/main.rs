//! opscrew — safety-gated IT incident orchestration
//!
//! Usage:
//!   opscrew                        → interactive issue loop (lab topology, simulation)
//!   opscrew --config opscrew.json  → run against a real topology
//!   opscrew --simulate             → force canned transcripts regardless of config

use clap::Parser;
use opscrew_agent::{Orchestrator, RemediationExecutor};
use opscrew_core::commands::BundleRegistry;
use opscrew_core::config::{OpscrewConfig, ServerRegistry};
use opscrew_core::types::TicketStatus;
use opscrew_exec::{CommandExecutor, SafetyGate};
use opscrew_oracle::{OllamaOracle, Oracle};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(
    name = "opscrew",
    about = "Safety-gated IT incident orchestration",
    version = env!("CARGO_PKG_VERSION"),
    long_about = "opscrew classifies free-text issues, routes them through\n\
                  diagnostics or remediation planning, validates every plan,\n\
                  and executes approved commands against registered hosts."
)]
struct Cli {
    /// Path to the config file (JSON). Falls back to the built-in lab
    /// topology when absent.
    #[arg(short, long, default_value = "opscrew.json")]
    config: PathBuf,

    /// User on whose behalf commands run (role lookup + audit log)
    #[arg(short, long, default_value = "system")]
    user: String,

    /// Force simulation mode on, regardless of the config
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Audit log file for executed commands
    #[arg(long, default_value = "opscrew-audit.log")]
    audit_log: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _audit_guard = init_tracing(&cli.audit_log)?;

    let mut config = if cli.config.exists() {
        OpscrewConfig::load(&cli.config)?
    } else {
        eprintln!(
            "config {} not found; using the built-in lab topology (simulation on)",
            cli.config.display()
        );
        OpscrewConfig::lab()
    };
    if cli.simulate {
        config.simulation.enabled = true;
    }

    run(cli, config).await
}

async fn run(cli: Cli, config: OpscrewConfig) -> anyhow::Result<()> {
    let registry = Arc::new(ServerRegistry::from_config(&config));
    if registry.is_empty() {
        anyhow::bail!("no servers registered; nothing to manage");
    }
    let gate = Arc::new(SafetyGate::new(config.roles.clone(), config.commands.clone()));
    let executor = Arc::new(CommandExecutor::new(
        Arc::clone(&registry),
        gate,
        &config.simulation,
    ));
    let remediation = Arc::new(RemediationExecutor::new(
        Arc::clone(&executor),
        Arc::clone(&registry),
    ));
    let oracle: Arc<dyn Oracle> = Arc::new(OllamaOracle::new(&config.oracle));
    let orchestrator = Orchestrator::new(
        oracle,
        executor,
        remediation,
        registry,
        BundleRegistry::with_builtin(),
    );

    info!(
        simulation = config.simulation.enabled,
        user = %cli.user,
        "opscrew ready"
    );
    println!("opscrew — describe your issue ('exit' to quit)\n");

    let stdin = std::io::stdin();
    loop {
        print!("issue> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let issue = line.trim();
        if issue.is_empty() {
            continue;
        }
        if matches!(issue.to_ascii_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        let ticket = orchestrator.handle_issue(&cli.user, issue).await;
        println!("{}", serde_json::to_string_pretty(&ticket)?);

        if ticket.status == TicketStatus::AwaitingApproval {
            print!("execute this plan on {}? [y/N] ", plan_target(&ticket));
            std::io::stdout().flush()?;
            let mut answer = String::new();
            stdin.lock().read_line(&mut answer)?;
            let approved = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
            match orchestrator.approve(ticket.id, &cli.user, approved).await {
                Ok(updated) => println!("{}", serde_json::to_string_pretty(&updated)?),
                Err(e) => eprintln!("approval failed: {e}"),
            }
        }
    }

    println!("bye");
    Ok(())
}

fn plan_target(ticket: &opscrew_core::types::IssueTicket) -> String {
    ticket
        .plan
        .as_ref()
        .map(|p| format!("{}/{}", p.server, p.service))
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Console logging via env-filter, plus a non-blocking file layer that
/// captures only the `audit` target (every executed command).
fn init_tracing(audit_log: &PathBuf) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let audit_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_log)?;
    let (audit_writer, guard) = tracing_appender::non_blocking(audit_file);

    let audit_layer = tracing_subscriber::fmt::layer()
        .with_writer(audit_writer)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target() == "audit"
        }));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "opscrew=info".into()),
            ),
        )
        .with(audit_layer)
        .init();

    Ok(guard)
}
