use crate::infra::{
    apply_assignments, open_session, parse_assignment, read_batch_csv, CliOrchestrator,
    FieldAssignment,
};
use chrono::Utc;
use clap::{ArgAction, Args, Subcommand};
use credishield::config::AppConfig;
use credishield::error::AppError;
use credishield::workflows::assessment::{
    feature_label, format_delta, FactorContribution, Language, OrchestratorEvent,
    PredictionClient, RiskApi, Role, ServiceStatus,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Default)]
pub(crate) struct AssessArgs {
    /// Form edit applied over the defaults (repeatable)
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    pub(crate) set: Vec<FieldAssignment>,
    /// Save the assessed form as a scenario
    #[arg(long)]
    pub(crate) save: bool,
}

#[derive(Args, Debug)]
pub(crate) struct SimulateArgs {
    /// Base form edit applied before the first assessment (repeatable)
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    pub(crate) set: Vec<FieldAssignment>,
    /// What-if edit applied after the first assessment (repeatable)
    #[arg(
        long = "what-if",
        value_name = "FIELD=VALUE",
        value_parser = parse_assignment,
        required = true
    )]
    pub(crate) what_if: Vec<FieldAssignment>,
    /// Save the simulated form as a scenario
    #[arg(long)]
    pub(crate) save: bool,
}

#[derive(Args, Debug)]
pub(crate) struct BatchArgs {
    /// CSV file with one applicant per row and form field names as headers
    #[arg(long)]
    pub(crate) csv: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct ReportArgs {
    /// Form edit applied over the defaults (repeatable)
    #[arg(long = "set", value_name = "FIELD=VALUE", value_parser = parse_assignment)]
    pub(crate) set: Vec<FieldAssignment>,
    /// Write the report to a file instead of stdout
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum SessionCommand {
    /// Show preferences, baseline, saved scenarios, and history
    Show,
    /// Clear the baseline, saved scenarios, and history
    Reset,
    /// Switch the active role
    Role {
        #[arg(value_parser = parse_role)]
        role: Role,
    },
    /// Switch the interface language
    Language {
        #[arg(value_parser = parse_language)]
        language: Language,
    },
    /// Show or hide the onboarding tour
    Tour {
        #[arg(action = ArgAction::Set)]
        open: bool,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::parse(raw).ok_or_else(|| format!("unknown role '{raw}' (end_user, analyst, admin)"))
}

fn parse_language(raw: &str) -> Result<Language, String> {
    Language::parse(raw).ok_or_else(|| format!("unsupported language '{raw}' (en, hi)"))
}

pub(crate) async fn run_assess(config: &AppConfig, args: AssessArgs) -> Result<(), AppError> {
    let mut orchestrator = open_session(config)?;
    apply_assignments(&mut orchestrator, args.set)?;
    render_hints(&orchestrator);

    assess_and_settle(&mut orchestrator).await?;
    render_assessment(&orchestrator);

    if args.save {
        render_saved(&mut orchestrator);
    }
    Ok(())
}

pub(crate) async fn run_simulate(config: &AppConfig, args: SimulateArgs) -> Result<(), AppError> {
    let mut orchestrator = open_session(config)?;
    apply_assignments(&mut orchestrator, args.set)?;

    assess_and_settle(&mut orchestrator).await?;
    println!("Initial assessment");
    render_assessment(&orchestrator);

    let edits = args.what_if.len();
    apply_assignments(&mut orchestrator, args.what_if)?;
    let events = orchestrator.settle().await;
    let issued = events
        .iter()
        .filter(|event| matches!(event, OrchestratorEvent::SimulationIssued { .. }))
        .count();

    if let Some(message) = orchestrator.error() {
        return Err(AppError::AssessmentFailed(format!(
            "what-if simulation: {message}"
        )));
    }

    println!("\nWhat-if result ({edits} edit(s), {issued} scoring request(s))");
    render_hints(&orchestrator);
    render_assessment(&orchestrator);

    if args.save {
        render_saved(&mut orchestrator);
    }
    Ok(())
}

pub(crate) async fn run_health(config: &AppConfig) -> Result<(), AppError> {
    let client = PredictionClient::new(&config.scoring)?;
    let status = ServiceStatus::from_probe(client.health_check().await);

    println!("{} ({})", status.message(), client.base_url());
    if let ServiceStatus::Down { reason } = &status {
        println!("  {reason}");
    }
    Ok(())
}

pub(crate) async fn run_batch(config: &AppConfig, args: BatchArgs) -> Result<(), AppError> {
    let rows = read_batch_csv(&args.csv)?;
    let mut orchestrator = open_session(config)?;
    let response = orchestrator.score_batch(&rows).await?;

    println!("Scored {} row(s) from {}", response.count, args.csv.display());
    for result in &response.results {
        let extras = result
            .extra
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        if extras.is_empty() {
            println!("  row {:>3}: {}", result.index, percent(result.probability_of_default));
        } else {
            println!(
                "  row {:>3}: {} ({extras})",
                result.index,
                percent(result.probability_of_default)
            );
        }
    }

    if await_oversight(&mut orchestrator, config.scoring.request_timeout).await {
        render_oversight(&orchestrator);
    }
    Ok(())
}

pub(crate) async fn run_session(config: &AppConfig, command: SessionCommand) -> Result<(), AppError> {
    let mut orchestrator = open_session(config)?;

    match command {
        SessionCommand::Show => {
            render_session(&orchestrator);
            if await_oversight(&mut orchestrator, config.scoring.request_timeout).await {
                render_oversight(&orchestrator);
            }
        }
        SessionCommand::Reset => {
            orchestrator.reset_session();
            println!("Session cleared; preferences kept");
        }
        SessionCommand::Role { role } => {
            orchestrator.set_role(role);
            println!("Role set to {role}");
        }
        SessionCommand::Language { language } => {
            orchestrator.set_language(language);
            println!("Language set to {language:?}");
        }
        SessionCommand::Tour { open } => {
            orchestrator.set_tour_open(open);
            println!("Onboarding tour {}", if open { "shown" } else { "hidden" });
        }
    }
    Ok(())
}

pub(crate) async fn run_report(config: &AppConfig, args: ReportArgs) -> Result<(), AppError> {
    let mut orchestrator = open_session(config)?;
    apply_assignments(&mut orchestrator, args.set)?;

    assess_and_settle(&mut orchestrator).await?;

    let Some(report) = orchestrator.report(Utc::now()) else {
        return Ok(());
    };
    let text = report.render_text();

    match args.output {
        Some(path) => {
            std::fs::write(&path, text)?;
            println!(
                "Report written to {} ({} page(s))",
                path.display(),
                report.page_count()
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Explicit assessment driven to completion; a failed round is an error.
async fn assess_and_settle(orchestrator: &mut CliOrchestrator) -> Result<(), AppError> {
    orchestrator.assess()?;
    orchestrator.settle().await;

    if let Some(message) = orchestrator.error() {
        println!("Check the scoring service with `credishield-api health` and try again.");
        return Err(AppError::AssessmentFailed(message.to_string()));
    }
    if orchestrator.prediction().is_none() {
        return Err(AppError::AssessmentFailed(
            "no prediction was returned".to_string(),
        ));
    }
    Ok(())
}

async fn await_oversight(orchestrator: &mut CliOrchestrator, limit: Duration) -> bool {
    if !orchestrator.role().can_view_oversight() {
        return false;
    }

    let refreshed = async {
        loop {
            if let OrchestratorEvent::OversightRefreshed { succeeded } =
                orchestrator.next_event().await
            {
                return succeeded;
            }
        }
    };
    tokio::time::timeout(limit, refreshed).await.unwrap_or(false)
}

fn percent(pd: f64) -> String {
    format!("{:.1}%", pd * 100.0)
}

fn render_factors(title: &str, factors: &[FactorContribution]) {
    if factors.is_empty() {
        return;
    }
    println!("{title}");
    for factor in factors.iter().take(3) {
        println!("  - {} ({:+.4})", feature_label(&factor.feature), factor.impact);
    }
}

fn render_assessment(orchestrator: &CliOrchestrator) {
    let Some(prediction) = orchestrator.prediction() else {
        return;
    };
    let confidence = orchestrator.confidence();

    println!(
        "Probability of default: {}",
        percent(prediction.probability_of_default)
    );
    println!(
        "Confidence: {} ({}) {}",
        confidence.band,
        confidence.percent_label(),
        confidence.rationale
    );
    if let Some(delta) = orchestrator.baseline_delta() {
        println!("Change vs baseline: {}", format_delta(delta));
    }

    render_factors("Top risk-increasing factors:", &prediction.top_risk_increasing);
    render_factors("Top risk-decreasing factors:", &prediction.top_risk_decreasing);

    println!("Recommendations:");
    for (index, tip) in orchestrator.recommendations().iter().enumerate() {
        println!("  {}. {tip}", index + 1);
    }
}

fn render_hints(orchestrator: &CliOrchestrator) {
    let hints = orchestrator.validation_hints();
    if hints.is_empty() {
        return;
    }
    println!("Before you submit:");
    for hint in hints {
        println!("  ! {hint}");
    }
}

fn render_saved(orchestrator: &mut CliOrchestrator) {
    if let Some(scenario) = orchestrator.save_scenario() {
        println!("Saved {} ({})", scenario.name, scenario.id);
    }
}

fn render_session(orchestrator: &CliOrchestrator) {
    let ledger = orchestrator.ledger();
    println!(
        "Role: {}  Language: {:?}  Tour: {}",
        orchestrator.role(),
        orchestrator.language(),
        if orchestrator.tour_open() { "open" } else { "closed" }
    );

    match ledger.baseline() {
        Some(baseline) => println!(
            "Baseline: {} at {}",
            percent(baseline.prediction.probability_of_default),
            baseline.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("Baseline: none yet"),
    }

    println!("Saved scenarios ({}):", ledger.scenarios().len());
    for scenario in ledger.scenarios() {
        let delta = ledger
            .delta_vs_baseline(&scenario.prediction)
            .map(format_delta)
            .unwrap_or_default();
        println!(
            "  {:<12} {} {delta}",
            scenario.name,
            percent(scenario.prediction.probability_of_default)
        );
    }

    println!("History ({}):", ledger.history().len());
    for entry in ledger.history() {
        println!(
            "  {} {} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            percent(entry.prediction.probability_of_default),
            entry.confidence_band
        );
    }
}

fn render_oversight(orchestrator: &CliOrchestrator) {
    let Some(snapshot) = orchestrator.oversight() else {
        return;
    };
    println!("Model oversight");
    if let Some(registry) = &snapshot.model_registry {
        println!("  registry: {registry}");
    }
    if let Some(fairness) = &snapshot.fairness_metrics {
        println!("  fairness: {fairness}");
    }
    println!("  audit log entries: {}", snapshot.audit_logs.len());
}
