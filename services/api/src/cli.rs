use crate::demo::{
    run_assess, run_batch, run_health, run_report, run_session, run_simulate, AssessArgs,
    BatchArgs, ReportArgs, SessionCommand, SimulateArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use credishield::config::AppConfig;
use credishield::error::AppError;
use credishield::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "CrediShield",
    about = "Assess loan default risk, explore what-if scenarios, and run the demo scorer",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the offline demo scoring service (default command)
    Serve(ServeArgs),
    /// Score the applicant form once and record it in the session
    Assess(AssessArgs),
    /// Assess a base form, apply what-if edits, and compare against the baseline
    Simulate(SimulateArgs),
    /// Probe the scoring service once
    Health,
    /// Score every row of a CSV file
    Batch(BatchArgs),
    /// Inspect or change the persisted session
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    /// Assess and print the paginated explanation report
    Report(ReportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(config, args).await,
        Command::Assess(args) => run_assess(&config, args).await,
        Command::Simulate(args) => run_simulate(&config, args).await,
        Command::Health => run_health(&config).await,
        Command::Batch(args) => run_batch(&config, args).await,
        Command::Session { command } => run_session(&config, command).await,
        Command::Report(args) => run_report(&config, args).await,
    }
}
