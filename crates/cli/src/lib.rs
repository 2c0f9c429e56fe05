pub mod commands;

use clap::{Args, Parser, Subcommand};
use commands::{CommandResult, Invocation};
use eduloop_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};
use eduloop_core::domain::approval::ReviewAction;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(
    name = "eduloop",
    about = "Eduloop review CLI",
    long_about = "Queue automated decisions for human approval, record reviewer verdicts, and collect feedback on recommendations.",
    after_help = "Examples:\n  eduloop migrate\n  eduloop approval submit --subject S1 --decision-type learning_path --data '{\"topic\":\"algebra\"}' --priority high\n  eduloop approval approve 1 --reviewer R1 --comments \"looks good\"\n  eduloop feedback average REC1\n  eduloop --config config/eduloop.toml doctor"
)]
pub struct Cli {
    #[arg(
        long = "config",
        global = true,
        value_name = "PATH",
        help = "Config file to load; it must exist"
    )]
    config_path: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Database URL, overriding env and file")]
    database_url: Option<String>,
    #[arg(long, global = true, value_name = "LEVEL", help = "Log level, overriding env and file")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config_path.clone(),
            require_file: self.config_path.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                log_level: self.log_level.clone(),
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Create the review tables if they do not exist")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, and schema readiness")]
    Doctor,
    /// Submit, review, and inspect approval requests
    #[command(subcommand)]
    Approval(ApprovalCommand),
    /// Record and summarize feedback on recommendations
    #[command(subcommand)]
    Feedback(FeedbackCommand),
}

#[derive(Debug, Subcommand)]
enum ApprovalCommand {
    #[command(about = "Queue an automated decision for human review")]
    Submit {
        #[arg(long, help = "Student the decision concerns")]
        subject: String,
        #[arg(long)]
        decision_type: String,
        #[arg(long, help = "Decision payload as a JSON document")]
        data: String,
        #[arg(long, help = "Queue priority (defaults to `normal`)")]
        priority: Option<String>,
    },
    #[command(about = "Approve a request")]
    Approve(ReviewArgs),
    #[command(about = "Reject a request")]
    Reject(ReviewArgs),
    #[command(about = "Send a request back for revision")]
    Revise(ReviewArgs),
    #[command(about = "List pending requests, oldest first")]
    Pending {
        #[arg(long, help = "Only list requests with this exact priority")]
        priority: Option<String>,
    },
    #[command(about = "Show one request")]
    Status { id: String },
}

#[derive(Debug, Args)]
struct ReviewArgs {
    id: String,
    #[arg(long)]
    reviewer: String,
    #[arg(long, default_value = "")]
    comments: String,
}

#[derive(Debug, Subcommand)]
enum FeedbackCommand {
    #[command(about = "Record feedback on a recommendation")]
    Submit {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        recommendation: String,
        #[arg(long, help = "positive, negative, or neutral")]
        feedback_type: String,
        #[arg(long, default_value = "")]
        comments: String,
        #[arg(long, help = "Rating from 1 to 5")]
        rating: Option<i64>,
    },
    #[command(about = "List a student's feedback, newest first")]
    History { subject: String },
    #[command(about = "Average rating of a recommendation")]
    Average { recommendation: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let invocation = Invocation::load(cli.load_options());

    init_logging(&logging_settings(&invocation));
    if let Err(error) = &invocation.config {
        warn!(
            event_name = "cli.config.invalid",
            error = %error,
            "configuration failed to load; logging with defaults"
        );
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&invocation),
        Command::Config => commands::config::run(&invocation),
        Command::Doctor => commands::doctor::run(&invocation),
        Command::Approval(command) => run_approval(&invocation, command),
        Command::Feedback(command) => run_feedback(&invocation, command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn run_approval(invocation: &Invocation, command: ApprovalCommand) -> CommandResult {
    use commands::approval;

    match command {
        ApprovalCommand::Submit { subject, decision_type, data, priority } => {
            approval::submit(invocation, &subject, &decision_type, &data, priority.as_deref())
        }
        ApprovalCommand::Approve(args) => review(invocation, ReviewAction::Approve, &args),
        ApprovalCommand::Reject(args) => review(invocation, ReviewAction::Reject, &args),
        ApprovalCommand::Revise(args) => review(invocation, ReviewAction::RequestRevision, &args),
        ApprovalCommand::Pending { priority } => approval::pending(invocation, priority.as_deref()),
        ApprovalCommand::Status { id } => approval::status(invocation, &id),
    }
}

fn review(invocation: &Invocation, action: ReviewAction, args: &ReviewArgs) -> CommandResult {
    commands::approval::review(invocation, action, &args.id, &args.reviewer, &args.comments)
}

fn run_feedback(invocation: &Invocation, command: FeedbackCommand) -> CommandResult {
    use commands::feedback;

    match command {
        FeedbackCommand::Submit { subject, recommendation, feedback_type, comments, rating } => {
            feedback::submit(
                invocation,
                &subject,
                &recommendation,
                &feedback_type,
                &comments,
                rating,
            )
        }
        FeedbackCommand::History { subject } => feedback::history(invocation, &subject),
        FeedbackCommand::Average { recommendation } => {
            feedback::average(invocation, &recommendation)
        }
    }
}

/// Logging settings from the loaded config, or the defaults when loading
/// failed so the failure itself still gets logged.
fn logging_settings(invocation: &Invocation) -> LoggingConfig {
    match &invocation.config {
        Ok(config) => config.logging.clone(),
        Err(_) => AppConfig::default().logging,
    }
}

/// Logs go to stderr so stdout carries only the command's JSON output.
fn init_logging(logging: &LoggingConfig) {
    use tracing::Level;

    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
