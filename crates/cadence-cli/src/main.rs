mod ops;
mod server;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use rmcp::{ServiceExt, service::ServerInitializeError, transport::stdio};
use serde::Serialize;

use cadence_core::{AttemptOutcome, Clock, Engine, FixedClock, ScheduleState, SystemClock};
use cadence_store::{Config, Workspace};

use crate::ops::{AppEngine, calendar_window, due_entries, parse_rfc3339, record_review, with_retry};

#[derive(Parser)]
#[command(name = "cadence", about = "Adaptive review scheduler CLI and MCP server")]
struct Cli {
    /// Data directory (default: $CADENCE_DATA_DIR, else ~/.cadence)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this RFC 3339 instant as the current time instead of the system clock
    #[arg(long, global = true, value_parser = parse_rfc3339)]
    now: Option<DateTime<Utc>>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// The observed outcome of one attempt.
#[derive(Args)]
struct AttemptArgs {
    /// The answer was correct
    #[arg(long)]
    correct: bool,

    /// Seconds taken to answer
    #[arg(long)]
    response_time: Option<f64>,

    /// Self-reported confidence in [0, 1]
    #[arg(long)]
    confidence: Option<f64>,

    /// Use this 0-5 quality as-is instead of deriving one
    #[arg(long)]
    quality: Option<f64>,

    /// Emotion label observed during the attempt
    #[arg(long)]
    emotion: Option<String>,
}

impl AttemptArgs {
    fn outcome(&self) -> AttemptOutcome {
        AttemptOutcome {
            correct: self.correct,
            response_time_seconds: self.response_time,
            confidence: self.confidence,
            explicit_quality: self.quality,
            emotion: self.emotion.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server on stdio transport
    Serve,

    /// Score an attempt without recording it
    Score {
        #[command(flatten)]
        attempt: AttemptArgs,
    },

    /// Record an attempt: update the item schedule and, if tagged, the topic mastery
    Review {
        learner: String,
        item: String,

        /// Topic the item belongs to
        #[arg(long)]
        topic: Option<String>,

        #[command(flatten)]
        attempt: AttemptArgs,
    },

    /// Show topic mastery, or record a topic attempt with --correct/--incorrect
    Mastery {
        learner: String,
        topic: String,

        #[arg(long, conflicts_with = "incorrect")]
        correct: bool,

        #[arg(long)]
        incorrect: bool,
    },

    /// List items due now
    Due {
        learner: String,

        /// Maximum number of items (default: due_limit from config)
        #[arg(long)]
        limit: Option<usize>,

        /// Most overdue first
        #[arg(long)]
        overdue_first: bool,

        /// Only items already past their due time
        #[arg(long)]
        overdue_only: bool,
    },

    /// Upcoming reviews grouped by UTC date
    Calendar {
        learner: String,

        /// First day (default: today)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day (default: from + calendar_days from config)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Show one item's schedule, optionally creating it
    Schedule {
        learner: String,
        item: String,

        /// Create the schedule with default state if missing
        #[arg(long)]
        create: bool,

        /// Topic to tag a newly created schedule with
        #[arg(long, requires = "create")]
        topic: Option<String>,
    },

    /// Shift an item's due time by a signed number of days
    Reschedule {
        learner: String,
        item: String,

        #[arg(allow_negative_numbers = true)]
        days: i64,
    },

    /// Push an item's review later
    Snooze {
        learner: String,
        item: String,

        #[arg(default_value_t = 1)]
        days: i64,
    },

    /// Revision statistics for a learner
    Stats { learner: String },

    /// Emotion insights from a learner's review history
    Insights { learner: String },

    /// Mastery profile across a learner's topics
    Profile { learner: String },

    /// Export records to a JSON snapshot file
    Export {
        /// Output file path
        path: PathBuf,

        /// Only this learner's records
        #[arg(long)]
        learner: Option<String>,
    },

    /// Import records from a JSON snapshot file
    Import {
        /// Input file path
        path: PathBuf,
    },
}

struct App {
    engine: AppEngine,
    config: Config,
    base: PathBuf,
}

fn open_app(cli: &Cli) -> Result<App> {
    let workspace =
        Workspace::open(cli.data_dir.as_deref()).context("failed to open cadence store")?;
    let clock: Arc<dyn Clock> = match cli.now {
        Some(now) => Arc::new(FixedClock::new(now)),
        None => Arc::new(SystemClock),
    };
    let engine = Engine::new(workspace.store, clock).with_strategy(workspace.config.strategy);
    Ok(App {
        engine,
        config: workspace.config,
        base: workspace.base,
    })
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Serve => cmd_serve(&cli).await,
        Commands::Score { attempt } => cmd_score(attempt),
        Commands::Review {
            learner,
            item,
            topic,
            attempt,
        } => cmd_review(&cli, learner, item, topic.as_deref(), attempt),
        Commands::Mastery {
            learner,
            topic,
            correct,
            incorrect,
        } => {
            let attempt = match (*correct, *incorrect) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_mastery(&cli, learner, topic, attempt)
        }
        Commands::Due {
            learner,
            limit,
            overdue_first,
            overdue_only,
        } => cmd_due(&cli, learner, *limit, *overdue_first, *overdue_only),
        Commands::Calendar { learner, from, to } => cmd_calendar(&cli, learner, *from, *to),
        Commands::Schedule {
            learner,
            item,
            create,
            topic,
        } => cmd_schedule(&cli, learner, item, *create, topic.as_deref()),
        Commands::Reschedule {
            learner,
            item,
            days,
        } => cmd_reschedule(&cli, learner, item, *days, false),
        Commands::Snooze {
            learner,
            item,
            days,
        } => cmd_reschedule(&cli, learner, item, *days, true),
        Commands::Stats { learner } => {
            let app = open_app(&cli)?;
            print_json(&app.engine.stats(learner)?)
        }
        Commands::Insights { learner } => {
            let app = open_app(&cli)?;
            print_json(&app.engine.insights(learner)?)
        }
        Commands::Profile { learner } => {
            let app = open_app(&cli)?;
            print_json(&app.engine.profile(learner)?)
        }
        Commands::Export { path, learner } => cmd_export(&cli, path, learner.as_deref()),
        Commands::Import { path } => cmd_import(&cli, path),
    }
}

// ---------------------------------------------------------------------------
// Advisory pidfile for observability
// ---------------------------------------------------------------------------

const PIDFILE: &str = "cadence-serve.pid";

/// Removes the pidfile when dropped, so every exit path from `serve` cleans up.
struct Pidfile {
    path: PathBuf,
}

impl Pidfile {
    /// Check for an existing pidfile and log accordingly, then write our own.
    fn acquire(base: &Path) -> Option<Self> {
        let path = base.join(PIDFILE);
        if let Ok(content) = std::fs::read_to_string(&path)
            && let Ok(pid) = content.trim().parse::<u32>()
        {
            if is_process_alive(pid) {
                tracing::warn!(
                    "another cadence serve (PID {pid}) is running, sharing the database"
                );
            } else {
                tracing::info!("cleaned up stale pidfile (PID {pid} is dead)");
                let _ = std::fs::remove_file(&path);
            }
        }

        match std::fs::File::create(&path) {
            Ok(mut f) => {
                let _ = write!(f, "{}", std::process::id());
                tracing::info!("wrote pidfile: {}", path.display());
                Some(Self { path })
            }
            Err(e) => {
                tracing::warn!("failed to write pidfile: {e}");
                None
            }
        }
    }
}

impl Drop for Pidfile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        tracing::info!("removed pidfile: {}", self.path.display());
    }
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0) checks existence without sending a signal
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    false
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn cmd_serve(cli: &Cli) -> Result<()> {
    let app = open_app(cli)?;
    tracing::info!(
        "starting MCP server ({} scheduling) in {}",
        app.config.strategy,
        app.base.display()
    );

    let _pidfile = Pidfile::acquire(&app.base);

    let server = server::CadenceServer::new(app.engine, app.config);
    let started = tokio::select! {
        started = server.clone().serve(stdio()) => Some(started),
        _ = shutdown_signal() => None,
    };

    match started {
        Some(Ok(service)) => {
            tokio::select! {
                quit = service.waiting() => {
                    quit.context("MCP server task failed")?;
                }
                _ = shutdown_signal() => {
                    tracing::info!("received shutdown signal");
                }
            }
        }
        // Client went away before initializing; nothing was served.
        Some(Err(ServerInitializeError::ConnectionClosed(during))) => {
            tracing::info!("stdin closed during MCP handshake ({during})");
        }
        Some(Err(e)) => return Err(e).context("failed to start MCP server"),
        None => tracing::info!("received shutdown signal before MCP handshake"),
    }

    server.checkpoint_wal().await;
    Ok(())
}

fn cmd_score(attempt: &AttemptArgs) -> Result<()> {
    let score = cadence_core::score_quality(&attempt.outcome())?;
    print_json(&score)
}

fn cmd_review(
    cli: &Cli,
    learner: &str,
    item: &str,
    topic: Option<&str>,
    attempt: &AttemptArgs,
) -> Result<()> {
    let app = open_app(cli)?;
    let result = record_review(
        &app.engine,
        app.config.max_retries,
        learner,
        item,
        topic,
        &attempt.outcome(),
    )
    .with_context(|| format!("failed to record review of '{item}' for '{learner}'"))?;
    print_json(&result)
}

fn cmd_mastery(cli: &Cli, learner: &str, topic: &str, attempt: Option<bool>) -> Result<()> {
    let app = open_app(cli)?;
    let record = match attempt {
        Some(correct) => Some(
            with_retry(app.config.max_retries, || {
                app.engine.record_topic_attempt(learner, topic, correct)
            })
            .with_context(|| format!("failed to record attempt on '{topic}'"))?,
        ),
        None => app.engine.mastery(learner, topic)?,
    };
    print_json(&record)
}

fn cmd_due(
    cli: &Cli,
    learner: &str,
    limit: Option<usize>,
    overdue_first: bool,
    overdue_only: bool,
) -> Result<()> {
    let app = open_app(cli)?;
    let limit = limit.unwrap_or(app.config.due_limit);
    let items = due_entries(&app.engine, learner, limit, overdue_first, overdue_only)?;
    print_json(&serde_json::json!({
        "count": items.len(),
        "items": items,
    }))
}

fn cmd_calendar(
    cli: &Cli,
    learner: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let app = open_app(cli)?;
    let (from, to, days) =
        calendar_window(&app.engine, learner, from, to, app.config.calendar_days)?;
    print_json(&serde_json::json!({
        "from": from,
        "to": to,
        "days": days,
    }))
}

fn cmd_schedule(
    cli: &Cli,
    learner: &str,
    item: &str,
    create: bool,
    topic: Option<&str>,
) -> Result<()> {
    let app = open_app(cli)?;
    let record = if create {
        Some(with_retry(app.config.max_retries, || {
            app.engine.ensure_scheduled(learner, item, topic)
        })?)
    } else {
        app.engine.schedule(learner, item)?
    };
    let state = ScheduleState::of(record.as_ref(), app.engine.now());
    print_json(&serde_json::json!({
        "state": state,
        "record": record,
    }))
}

fn cmd_reschedule(cli: &Cli, learner: &str, item: &str, days: i64, snooze: bool) -> Result<()> {
    let app = open_app(cli)?;
    let record = with_retry(app.config.max_retries, || {
        if snooze {
            app.engine.snooze(learner, item, days)
        } else {
            app.engine.reschedule(learner, item, days)
        }
    })?;
    print_json(&record)
}

fn cmd_export(cli: &Cli, path: &Path, learner: Option<&str>) -> Result<()> {
    let app = open_app(cli)?;
    app.engine
        .store()
        .export_json_file(path, learner, app.engine.now())
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let app = open_app(cli)?;
    let summary = app
        .engine
        .store()
        .import_json_file(path)
        .context("failed to import JSON")?;
    print_json(&summary)
}
