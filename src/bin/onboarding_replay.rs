//! Onboarding Session Replay
//!
//! Drives a workflow session from a YAML script of user actions and prints
//! what the engine did with each one. Useful for checking a flow definition
//! end to end without a UI.
//!
//! Usage:
//!   cargo run --features cli --bin onboarding_replay -- \
//!     --script scripts/driver_happy_path.yaml
//!
//! Examples:
//!   # Machine-readable output
//!   cargo run --features cli --bin onboarding_replay -- \
//!     --script scripts/driver_happy_path.yaml --json
//!
//!   # Use flow definitions from a directory, keep the final snapshot
//!   ONBOARDING_FLOWS_DIR=./flows cargo run --features cli --bin onboarding_replay -- \
//!     --script scripts/driver_happy_path.yaml \
//!     --snapshot-dir ./snapshots

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use onboarding_flow::{
    DryRunSubmitter, FieldKey, FieldUpdate, FieldValue, FileSnapshotStore, FlowRegistry,
    SnapshotStore, StepId, SubmissionReceipt, Transition, VerificationReceipt, WizardSession,
    WorkflowStatus,
};

/// Replay a scripted onboarding session
#[derive(Parser, Debug)]
#[command(name = "onboarding_replay")]
#[command(about = "Replay a scripted session against an onboarding flow")]
struct Args {
    /// Script of actions to replay (YAML)
    #[arg(long, short = 's')]
    script: PathBuf,

    /// Flow id; overrides the script's `flow`
    #[arg(long, short = 'f')]
    flow: Option<String>,

    /// Directory of flow definitions layered over the built-in flows
    #[arg(long, short = 'd', env = "ONBOARDING_FLOWS_DIR")]
    flows_dir: Option<PathBuf>,

    /// Write the final snapshot to this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    flow: Option<String>,
    actions: Vec<Action>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Action {
    SetField { key: FieldKey, value: FieldValue },
    Report { step: StepId, valid: bool },
    Verify { subject: String },
    Advance,
    Retreat,
    Jump { step: StepId },
    Submit,
    Reset,
    Status,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::SetField { .. } => "set_field",
            Action::Report { .. } => "report",
            Action::Verify { .. } => "verify",
            Action::Advance => "advance",
            Action::Retreat => "retreat",
            Action::Jump { .. } => "jump",
            Action::Submit => "submit",
            Action::Reset => "reset",
            Action::Status => "status",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Outcome {
    Done,
    FieldSet { update: FieldUpdate },
    Transition { transition: Transition },
    Submitted { receipt: SubmissionReceipt },
    Status { status: Box<WorkflowStatus> },
    Error { error: String },
}

#[derive(Debug, Serialize)]
struct ActionResult {
    index: usize,
    action: &'static str,
    current_step: StepId,
    outcome: Outcome,
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    session_id: Uuid,
    flow: String,
    results: Vec<ActionResult>,
    final_status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_path: Option<PathBuf>,
}

async fn apply(session: &mut WizardSession, action: &Action) -> Outcome {
    let result = match action {
        Action::SetField { key, value } => session
            .set_field(key.clone(), value.clone())
            .map(|update| Outcome::FieldSet { update })
            .map_err(|e| e.to_string()),
        Action::Report { step, valid } => session
            .report_validity(step, *valid)
            .map(|_| Outcome::Done)
            .map_err(|e| e.to_string()),
        Action::Verify { subject } => session
            .record_verification(VerificationReceipt::issue(subject.clone()))
            .map(|_| Outcome::Done)
            .map_err(|e| e.to_string()),
        Action::Advance => Ok(Outcome::Transition {
            transition: session.advance(),
        }),
        Action::Retreat => Ok(Outcome::Transition {
            transition: session.retreat(),
        }),
        Action::Jump { step } => session
            .jump_to(step)
            .map(|transition| Outcome::Transition { transition })
            .map_err(|e| e.to_string()),
        Action::Submit => session
            .submit(&DryRunSubmitter)
            .await
            .map(|receipt| Outcome::Submitted { receipt })
            .map_err(|e| e.to_string()),
        Action::Reset => {
            session.reset();
            Ok(Outcome::Done)
        }
        Action::Status => Ok(Outcome::Status {
            status: Box::new(session.status()),
        }),
    };
    result.unwrap_or_else(|error| Outcome::Error { error })
}

fn print_result(result: &ActionResult) {
    let prefix = format!("[{:>3}] {:<10}", result.index, result.action);
    match &result.outcome {
        Outcome::Done => println!("{} {}", prefix, "ok".green()),
        Outcome::FieldSet { update } => match &update.remapped {
            Some(remap) => println!(
                "{} {} pointer remapped {} -> {}",
                prefix,
                "ok".green(),
                remap.from,
                remap.to.to_string().yellow()
            ),
            None => println!("{} {}", prefix, "ok".green()),
        },
        Outcome::Transition { transition } => match transition {
            Transition::Moved { from, to } => {
                println!("{} {} -> {}", prefix, from, to.to_string().green())
            }
            Transition::Blocked(denial) => println!(
                "{} {} {} (now at {})",
                prefix,
                "BLOCKED".red().bold(),
                denial.reason,
                denial.redirect_to.to_string().yellow()
            ),
            Transition::Unchanged { reason } => {
                println!("{} {} {:?}", prefix, "unchanged".dimmed(), reason)
            }
        },
        Outcome::Submitted { receipt } => println!(
            "{} {} reference {}",
            prefix,
            "SUBMITTED".green().bold(),
            receipt.reference
        ),
        Outcome::Status { status } => print_status(status),
        Outcome::Error { error } => println!("{} {} {}", prefix, "ERROR:".red().bold(), error),
    }
}

fn print_status(status: &WorkflowStatus) {
    println!(
        "\n{} {} ({}, {:.0}% complete)",
        "Flow:".cyan().bold(),
        status.flow_id,
        status.phase,
        status.progress
    );
    for step in &status.steps {
        let marker = match step.state {
            onboarding_flow::StepState::Current => ">".cyan().bold(),
            onboarding_flow::StepState::Complete => "x".green(),
            onboarding_flow::StepState::Pending => " ".normal(),
            onboarding_flow::StepState::Locked => "-".dimmed(),
        };
        println!("  [{}] {:<20} {}", marker, step.id, step.label);
    }
    if let Some(missing) = &status.missing {
        println!("  {} {}", "Missing:".yellow(), missing);
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut registry = FlowRegistry::builtin().context("built-in flows failed to compile")?;
    if let Some(dir) = &args.flows_dir {
        registry
            .extend_from_dir(dir)
            .with_context(|| format!("loading flows from {}", dir.display()))?;
    }

    let script_text = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;
    let script: Script = serde_yaml::from_str(&script_text)
        .with_context(|| format!("parsing script {}", args.script.display()))?;

    let flow_id = args
        .flow
        .or(script.flow)
        .unwrap_or_else(|| onboarding_flow::flows::driver::FLOW_ID.to_string());
    let flow = registry.require(&flow_id).with_context(|| {
        format!("available flows: {}", registry.list_ids().join(", "))
    })?;

    let mut session = WizardSession::new(flow);

    if !args.json {
        println!("\n{} {}", "Flow:".cyan().bold(), flow_id);
        println!("{} {}", "Session:".cyan(), session.session_id());
        println!("{} {}\n", "Actions:".cyan(), script.actions.len());
    }

    let mut results = Vec::with_capacity(script.actions.len());
    for (index, action) in script.actions.iter().enumerate() {
        let outcome = apply(&mut session, action).await;
        let result = ActionResult {
            index,
            action: action.name(),
            current_step: session.current_step().clone(),
            outcome,
        };
        if !args.json {
            print_result(&result);
        }
        results.push(result);
    }

    let snapshot_path = match &args.snapshot_dir {
        Some(dir) => {
            let store = FileSnapshotStore::new(dir);
            store
                .save(&session.snapshot())
                .await
                .with_context(|| format!("saving snapshot to {}", dir.display()))?;
            Some(store.path_for(session.session_id()))
        }
        None => None,
    };

    let report = ReplayReport {
        session_id: session.session_id(),
        flow: flow_id,
        results,
        final_status: session.status(),
        snapshot_path,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_status(&report.final_status);
        if let Some(path) = &report.snapshot_path {
            println!("{} {}", "Snapshot:".cyan(), path.display());
        }
    }

    Ok(())
}
