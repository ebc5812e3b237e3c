//! Entry point for the Leave Engine binary.
//!
//! A small command line front end over the library.  Recurring
//! requests are read from JSON files and expanded locally; quota
//! commands run the quota engine against a JSON snapshot of one
//! user's balance and rules.  Safety caps, the quota policy file and
//! the default log filter come from `LEAVE_*` environment variables
//! (see `config::EngineConfig`).

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use leave_engine::config::EngineConfig;
use leave_engine::engine::QuotaEngine;
use leave_engine::flow::{ActionFlow, PendingAction};
use leave_engine::history::{filter_history, sort_history, HistoryFilter, HistorySortField, SortDirection};
use leave_engine::models::{CarryOverParams, CheckQuotaParams, LeaveType, RecurringLeaveRequest, TransferQuotaParams};
use leave_engine::policy::QuotaPolicy;
use leave_engine::ports::Collaborators;
use leave_engine::recurrence::{
    format_recurrence_pattern, generate_recurring_dates, preview_batch, validate_recurrence_pattern,
    GenerateOptions,
};
use leave_engine::snapshot::{load_snapshot, SnapshotService};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "leave-engine")]
#[command(version)]
#[command(about = "Recurring leave generation and leave quota bookkeeping", long_about = None)]
struct Cli {
    /// Date used as "today" (defaults to the local date)
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand one recurring request, or an array of them, into occurrences
    Preview {
        #[arg(long)]
        request: PathBuf,

        /// JSON array of holiday dates
        #[arg(long)]
        holidays: Option<PathBuf>,
    },
    /// Report problems with a recurring request
    Validate {
        #[arg(long)]
        request: PathBuf,
    },
    /// Print per-type quotas and balance totals
    Quotas {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Check whether a date range fits in the quota
    Check {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        leave_type: LeaveType,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Simulate a transfer between two leave types, optionally executing it
    Transfer {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        source: LeaveType,
        #[arg(long)]
        target: LeaveType,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        execute: bool,
        /// Write the updated snapshot here after execution
        #[arg(long, requires = "execute")]
        out: Option<PathBuf>,
    },
    /// Simulate a carry-over into the next year, optionally executing it
    CarryOver {
        #[arg(long)]
        snapshot: PathBuf,
        #[arg(long)]
        leave_type: LeaveType,
        #[arg(long)]
        from_year: i32,
        #[arg(long)]
        to_year: i32,
        #[arg(long)]
        execute: bool,
        #[arg(long, requires = "execute")]
        out: Option<PathBuf>,
    },
    /// List recorded transfers
    History {
        #[arg(long)]
        snapshot: PathBuf,
        /// Only transfers from or to this type
        #[arg(long)]
        leave_type: Option<LeaveType>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = SortArg::Date)]
        sort: SortArg,
        #[arg(long)]
        descending: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Date,
    Source,
    Target,
    Debited,
    Credited,
    Status,
}

impl From<SortArg> for HistorySortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Date => HistorySortField::RecordedAt,
            SortArg::Source => HistorySortField::SourceType,
            SortArg::Target => HistorySortField::TargetType,
            SortArg::Debited => HistorySortField::DaysDebited,
            SortArg::Credited => HistorySortField::DaysCredited,
            SortArg::Status => HistorySortField::Status,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RequestFile {
    Many(Vec<RecurringLeaveRequest>),
    One(Box<RecurringLeaveRequest>),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A quota engine wired to the snapshot at `path`, already refreshed.
async fn open_engine(
    path: &Path,
    policy: Arc<QuotaPolicy>,
    today: NaiveDate,
) -> Result<(QuotaEngine, Arc<SnapshotService>, String)> {
    let snapshot = load_snapshot(path)?;
    let user_id = snapshot.balance.user_id.clone();
    let service = Arc::new(SnapshotService::new(snapshot, policy.clone()).with_today(today));
    let mut engine = QuotaEngine::new(Collaborators::from_single(service.clone()), policy)
        .with_reference_date(today);
    engine.refresh_quotas(&user_id).await;
    if let Some(err) = engine.error() {
        bail!("refreshing quotas for {}: {}", user_id, err);
    }
    Ok((engine, service, user_id))
}

async fn run_action(
    engine: &mut QuotaEngine,
    service: &SnapshotService,
    action: PendingAction,
    execute: bool,
    out: Option<PathBuf>,
) -> Result<()> {
    let mut flow = ActionFlow::new();
    let preview = flow.simulate(engine, action).await?;
    println!("{}", preview.message());
    if !execute {
        return Ok(());
    }
    if !preview.is_success() {
        bail!("not executed: the simulation was rejected");
    }

    let outcome = flow.confirm(engine).await?;
    tracing::info!(?outcome, "action confirmed");
    print_json(&engine.quotas_by_type())?;
    if let Some(path) = out {
        let snapshot = service.snapshot().await;
        std::fs::write(&path, serde_json::to_string_pretty(&snapshot)?)
            .with_context(|| format!("writing {:?}", path))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());
    let options = GenerateOptions {
        reference_date: today,
        ..config.generate_options()
    };
    let policy = Arc::new(config.load_policy()?);

    match cli.command {
        Commands::Preview { request, holidays } => {
            let holidays: Vec<NaiveDate> = match holidays {
                Some(path) => read_json(&path)?,
                None => Vec::new(),
            };
            let options = options.with_holidays(holidays);
            match read_json::<RequestFile>(&request)? {
                RequestFile::One(request) => {
                    println!("{}", format_recurrence_pattern(&request.recurrence_pattern));
                    print_json(&generate_recurring_dates(&request, &options))?;
                }
                RequestFile::Many(requests) => {
                    let results = preview_batch(&requests, &options);
                    for (request, result) in requests.iter().zip(&results) {
                        println!(
                            "{}: {} ({} occurrence(s))",
                            request.id,
                            format_recurrence_pattern(&request.recurrence_pattern),
                            result.occurrences.len()
                        );
                    }
                    print_json(&results)?;
                }
            }
        }
        Commands::Validate { request } => {
            let request: RecurringLeaveRequest = read_json(&request)?;
            let issues = validate_recurrence_pattern(&request, &options);
            if issues.is_empty() {
                println!("{}", format_recurrence_pattern(&request.recurrence_pattern));
            } else {
                print_json(&issues)?;
                bail!("{} problem(s) found in request {}", issues.len(), request.id);
            }
        }
        Commands::Quotas { snapshot } => {
            let (engine, _, _) = open_engine(&snapshot, policy, today).await?;
            print_json(&engine.quotas_by_type())?;
            print_json(&engine.total_balance())?;
        }
        Commands::Check {
            snapshot,
            leave_type,
            start,
            end,
        } => {
            let (engine, _, user_id) = open_engine(&snapshot, policy, today).await?;
            let result = engine
                .check_quota(&CheckQuotaParams {
                    start_date: Some(start),
                    end_date: Some(end),
                    leave_type,
                    user_id,
                })
                .await;
            print_json(&result)?;
        }
        Commands::Transfer {
            snapshot,
            source,
            target,
            amount,
            comment,
            execute,
            out,
        } => {
            let (mut engine, service, user_id) = open_engine(&snapshot, policy, today).await?;
            let action = PendingAction::Transfer(TransferQuotaParams {
                user_id,
                source_type: source,
                target_type: target,
                source_amount: amount,
                comment,
            });
            run_action(&mut engine, &service, action, execute, out).await?;
        }
        Commands::CarryOver {
            snapshot,
            leave_type,
            from_year,
            to_year,
            execute,
            out,
        } => {
            let (mut engine, service, user_id) = open_engine(&snapshot, policy, today).await?;
            let action = PendingAction::CarryOver(CarryOverParams {
                user_id,
                leave_type,
                from_year,
                to_year,
            });
            run_action(&mut engine, &service, action, execute, out).await?;
        }
        Commands::History {
            snapshot,
            leave_type,
            from,
            to,
            sort,
            descending,
        } => {
            let (engine, _, user_id) = open_engine(&snapshot, policy, today).await?;
            let filter = HistoryFilter {
                leave_type,
                from,
                to,
                ..HistoryFilter::default()
            };
            let records = engine.transfer_history(&user_id).await?;
            let mut selected: Vec<_> = filter_history(&records, &filter).into_iter().cloned().collect();
            let direction = if descending {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            sort_history(&mut selected, sort.into(), direction);
            print_json(&selected)?;
        }
    }
    Ok(())
}
