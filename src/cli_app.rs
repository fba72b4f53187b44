//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use visit_panel::analytics::categorical::CategoryCount;
use visit_panel::analytics::filter::{FilterState, Granularity, Period};
use visit_panel::analytics::kpi::{EMPTY_CELL, format_local};
use visit_panel::analytics::report::{OverviewReport, SiteReport};
use visit_panel::analytics::series::TimeSeries;
use visit_panel::core::cache::DatasetCache;
use visit_panel::core::config::Config;
use visit_panel::daemon::loop_main::{WatchLoop, WatchSummary};
use visit_panel::daemon::refresh::{OverallStatus, PanelContext, RefreshOutcome, SourceStatus};
use visit_panel::daemon::signals::SignalHandler;
use visit_panel::ingest::gviz::GvizRowSource;
use visit_panel::ingest::source::RowSource;
use visit_panel::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use visit_panel::logger::jsonl::JsonlConfig;

/// Visit Panel: multi-source visit analytics from spreadsheet feeds.
#[derive(Debug, Parser)]
#[command(
    name = "vpanel",
    author,
    version,
    about = "Visit Panel - visit-log analytics across spreadsheet sources",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Fetch every source once and update the cache.
    Refresh(RefreshArgs),
    /// Refresh on an interval until interrupted (SIGUSR1 forces a refresh).
    Watch(WatchArgs),
    /// Cross-source totals, time series, and busiest periods.
    Overview(ViewArgs),
    /// KPIs, series, distributions, and latest activity for one source.
    Site(SiteArgs),
    /// List configured sources.
    Sources,
    /// Inspect or clear the dataset cache.
    Cache(CacheArgs),
    /// Inspect and validate configuration.
    Config(ConfigArgs),
    /// Show version and build metadata.
    Version(VersionArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RefreshArgs {
    /// Replace the dataset even if the fetch brought nothing newer.
    #[arg(long)]
    force: bool,
    /// Neither read nor write the cache file.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct WatchArgs {
    /// Poll interval in seconds (defaults to `refresh.poll_interval_ms`).
    #[arg(long, value_name = "SECS")]
    interval_secs: Option<u64>,
    /// Exit after this many completed refreshes.
    #[arg(long, value_name = "N")]
    max_cycles: Option<u64>,
}

#[derive(Debug, Clone, Args, Default)]
struct FilterArgs {
    /// Bucket size: hour, day, month, or year.
    #[arg(long, value_name = "UNIT")]
    granularity: Option<String>,
    /// Period preset: all, 7d, 30d, 90d, or custom.
    #[arg(long, value_name = "PRESET")]
    period: Option<String>,
    /// Custom period start (YYYY-MM-DD); implies `--period custom`.
    #[arg(long, value_name = "DATE")]
    start: Option<String>,
    /// Custom period end (YYYY-MM-DD), inclusive; implies `--period custom`.
    #[arg(long, value_name = "DATE")]
    end: Option<String>,
}

#[derive(Debug, Clone, Args, Default)]
struct ViewArgs {
    #[command(flatten)]
    filters: FilterArgs,
    /// Use only the cache; never fetch.
    #[arg(long)]
    offline: bool,
}

#[derive(Debug, Clone, Args)]
struct SiteArgs {
    /// Source key (see `vpanel sources`).
    #[arg(value_name = "KEY")]
    key: String,
    #[command(flatten)]
    view: ViewArgs,
}

#[derive(Debug, Clone, Args)]
struct CacheArgs {
    /// Cache operation to run.
    #[command(subcommand)]
    command: Option<CacheCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum CacheCommand {
    /// Report cache location and freshness.
    Status,
    /// Delete the cache file.
    Clear,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

fn user_error(error: impl std::fmt::Display) -> CliError {
    CliError::User(error.to_string())
}

fn runtime_error(error: impl std::fmt::Display) -> CliError {
    CliError::Runtime(error.to_string())
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Refresh(args) => run_refresh(cli, args),
        Command::Watch(args) => run_watch(cli, args),
        Command::Overview(args) => run_overview(cli, args),
        Command::Site(args) => run_site(cli, args),
        Command::Sources => run_sources(cli),
        Command::Cache(args) => run_cache(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
    }
}

// ──────────────────── session ────────────────────

/// A configured [`PanelContext`] plus the activity logger feeding it.
struct Session {
    context: Arc<PanelContext>,
    logger: Option<(ActivityLoggerHandle, JoinHandle<()>)>,
    started: Instant,
}

impl Session {
    fn open(config: &Config, use_cache: bool) -> Result<Self, CliError> {
        let row_source: Arc<dyn RowSource> = Arc::new(GvizRowSource::new(
            &config.feed.base_url,
            config.refresh.fetch_timeout(),
        ));
        let mut context = PanelContext::new(config, row_source).map_err(runtime_error)?;
        if !use_cache {
            context = context.without_cache();
        }

        let logger = match spawn_logger(JsonlConfig::at(config.paths.jsonl_log.clone())) {
            Ok((handle, join)) => {
                handle.send(ActivityEvent::PanelStarted {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    config_hash: config.stable_hash().unwrap_or_default(),
                });
                context = context.with_logger(handle.clone());
                Some((handle, join))
            }
            Err(error) => {
                eprintln!("[VP-LOG] activity log disabled: {error}");
                None
            }
        };

        Ok(Self {
            context: Arc::new(context),
            logger,
            started: Instant::now(),
        })
    }

    fn close(self, reason: &str) {
        if let Some((handle, join)) = self.logger {
            handle.send(ActivityEvent::PanelStopped {
                reason: reason.to_string(),
                uptime_secs: self.started.elapsed().as_secs(),
            });
            handle.shutdown();
            let _ = join.join();
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(runtime_error)
}

/// Seed from a fresh cache, or fetch when there is none.
fn load_dataset(context: &PanelContext, offline: bool) -> Result<(), CliError> {
    let now = Utc::now();
    if context.load_cache_at_startup(now).is_some() {
        return Ok(());
    }
    if offline {
        return Err(CliError::User(
            "no fresh cache available; run `vpanel refresh` or drop --offline".to_string(),
        ));
    }
    context.refresh(false, now);
    Ok(())
}

// ──────────────────── filters ────────────────────

impl FilterArgs {
    fn to_filter_state(&self) -> Result<FilterState, CliError> {
        let granularity = self
            .granularity
            .as_deref()
            .map(str::parse::<Granularity>)
            .transpose()
            .map_err(user_error)?
            .unwrap_or_default();

        let has_bounds = self.start.is_some() || self.end.is_some();
        let period = match self.period.as_deref() {
            Some(raw) => raw.parse::<Period>().map_err(user_error)?,
            None if has_bounds => Period::Custom,
            None => Period::All,
        };
        if has_bounds && period != Period::Custom {
            return Err(CliError::User(format!(
                "--start/--end only apply to --period custom (got {period})"
            )));
        }

        Ok(FilterState {
            granularity,
            period,
            custom_start: checked_day("--start", self.start.as_deref())?,
            custom_end: checked_day("--end", self.end.as_deref())?,
        })
    }
}

fn checked_day(flag: &str, raw: Option<&str>) -> Result<String, CliError> {
    let Some(raw) = raw.map(str::trim) else {
        return Ok(String::new());
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| CliError::User(format!("{flag} expects YYYY-MM-DD, got {raw:?}: {error}")))?;
    Ok(raw.to_string())
}

fn describe_filters(filters: &FilterState) -> String {
    let period = match filters.period {
        Period::Custom => format!(
            "{} .. {}",
            if filters.custom_start.is_empty() { "*" } else { &filters.custom_start },
            if filters.custom_end.is_empty() { "*" } else { &filters.custom_end },
        ),
        other => other.to_string(),
    };
    format!("granularity={} period={period}", filters.granularity)
}

// ──────────────────── refresh / watch ────────────────────

fn run_refresh(cli: &Cli, args: &RefreshArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let session = Session::open(&config, !args.no_cache)?;
    let now = Utc::now();
    if !args.force {
        session.context.load_cache_at_startup(now);
    }
    let outcome = session.context.refresh(args.force, now);
    let result = emit_refresh(cli, &session.context, &outcome);
    session.close("refresh");
    result
}

fn emit_refresh(cli: &Cli, context: &PanelContext, outcome: &RefreshOutcome) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => {
            println!("{}", refresh_line(outcome));
            print_source_status(context);
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "refresh",
                "outcome": outcome,
                "overall": context.overall_status().as_str(),
                "sources": status_json(context),
                "last_fetched": context.last_fetched(),
            });
            write_json_line(&payload)?;
        }
    }

    match outcome {
        RefreshOutcome::Completed { failed_sources, .. } if !failed_sources.is_empty() => {
            Err(CliError::Partial(format!(
                "{} source(s) failed: {}",
                failed_sources.len(),
                failed_sources.join(", ")
            )))
        }
        _ => Ok(()),
    }
}

fn refresh_line(outcome: &RefreshOutcome) -> String {
    match outcome {
        RefreshOutcome::Skipped => format!("{} another refresh is in flight", "skipped:".yellow()),
        RefreshOutcome::Completed {
            replaced, records, ..
        } => {
            let action = if *replaced {
                "dataset replaced".green()
            } else {
                "kept previous dataset".normal()
            };
            format!("Refresh complete: {records} records ({action})")
        }
    }
}

fn print_source_status(context: &PanelContext) {
    for (key, status) in context.status() {
        let name = display_name(context, &key);
        match status {
            SourceStatus::Ok => println!("  {name:<28} {}", "ok".green()),
            SourceStatus::Error { code, message } => {
                println!("  {name:<28} {} {code} {message}", "error".red());
            }
        }
    }
}

fn status_json(context: &PanelContext) -> Value {
    Value::Array(
        context
            .status()
            .into_iter()
            .map(|(key, status)| json!({ "source": key, "status": status }))
            .collect(),
    )
}

fn run_watch(cli: &Cli, args: &WatchArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let interval = args
        .interval_secs
        .map_or_else(|| config.refresh.poll_interval(), Duration::from_secs);
    if interval.is_zero() {
        return Err(CliError::User("--interval-secs must be positive".to_string()));
    }

    let session = Session::open(&config, true)?;
    let mut watch = WatchLoop::new(Arc::clone(&session.context), SignalHandler::new(), interval);
    if let Some(max) = args.max_cycles {
        watch = watch.with_max_cycles(max);
    }

    let mode = output_mode(cli);
    let result = watch.run(|context, outcome| {
        if let Err(error) = emit_watch_outcome(mode, context, outcome) {
            eprintln!("[VP-WATCH] failed to report refresh: {error}");
        }
    });

    match result {
        Ok(summary) => {
            let emitted = emit_watch_summary(mode, &summary);
            session.close("shutdown");
            emitted
        }
        Err(error) => {
            session.close("error");
            Err(runtime_error(error))
        }
    }
}

fn emit_watch_outcome(
    mode: OutputMode,
    context: &PanelContext,
    outcome: &RefreshOutcome,
) -> Result<(), CliError> {
    let stamp = format_local(Utc::now(), context.offset());
    match mode {
        OutputMode::Human => {
            println!("[{stamp}] {}", refresh_line(outcome));
            if matches!(outcome, RefreshOutcome::Completed { failed_sources, .. } if !failed_sources.is_empty())
            {
                print_source_status(context);
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "event": "refresh",
                "ts": Utc::now(),
                "outcome": outcome,
                "overall": context.overall_status().as_str(),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn emit_watch_summary(mode: OutputMode, summary: &WatchSummary) -> Result<(), CliError> {
    match mode {
        OutputMode::Human => {
            println!(
                "Watch stopped after {}s: {} refreshes ({} replaced), {} skipped",
                summary.uptime.as_secs(),
                summary.completed,
                summary.replaced,
                summary.skipped
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "event": "stopped",
                "completed": summary.completed,
                "replaced": summary.replaced,
                "skipped": summary.skipped,
                "uptime_secs": summary.uptime.as_secs(),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── views ────────────────────

fn run_overview(cli: &Cli, args: &ViewArgs) -> Result<(), CliError> {
    let filters = args.filters.to_filter_state()?;
    let config = load_config(cli)?;
    let session = Session::open(&config, true)?;
    session.context.set_filters(filters);

    let result = load_dataset(&session.context, args.offline).and_then(|()| {
        let report = session.context.overview(Utc::now());
        emit_overview(cli, &session.context, &report)
    });
    session.close("overview");
    result
}

fn emit_overview(cli: &Cli, context: &PanelContext, report: &OverviewReport) -> Result<(), CliError> {
    let filters = context.filters();
    match output_mode(cli) {
        OutputMode::Human => {
            println!("{}", "Overview".bold());
            println!("  Filters: {}", describe_filters(&filters));
            println!("  Total visits:    {}", report.summary.total_visits);
            println!("  Unique sessions: {}", report.summary.unique_sessions);
            println!("  Last visit:");
            for entry in &report.summary.last_visits {
                let when = entry
                    .last_visit
                    .map_or_else(|| EMPTY_CELL.to_string(), |ts| format_local(ts, context.offset()));
                println!("    {:<26} {when}", display_name(context, &entry.source_key));
            }
            print_series(context, &report.series);

            println!("{}", "Busiest periods".bold());
            if report.top_periods.is_empty() {
                println!("  (no visits in period)");
            }
            for (rank, period) in report.top_periods.iter().enumerate() {
                println!("  {:>2}. {:<16} {}", rank + 1, period.label, period.total);
            }
            if context.overall_status() != OverallStatus::Ok {
                println!("{}", "Source status".bold());
                print_source_status(context);
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "overview",
                "filters": filters,
                "overall": context.overall_status().as_str(),
                "sources": status_json(context),
                "last_fetched": context.last_fetched(),
                "report": report,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_site(cli: &Cli, args: &SiteArgs) -> Result<(), CliError> {
    let filters = args.view.filters.to_filter_state()?;
    let config = load_config(cli)?;
    if config.source(&args.key).is_err() {
        return Err(CliError::User(format!(
            "unknown source {:?}; configured: {}",
            args.key,
            config.source_keys().join(", ")
        )));
    }

    let session = Session::open(&config, true)?;
    session.context.set_filters(filters);
    let result = load_dataset(&session.context, args.view.offline).and_then(|()| {
        let report = session
            .context
            .site_report(&args.key, Utc::now())
            .map_err(user_error)?;
        emit_site(cli, &session.context, &report)
    });
    session.close("site");
    result
}

fn emit_site(cli: &Cli, context: &PanelContext, report: &SiteReport) -> Result<(), CliError> {
    let filters = context.filters();
    let summary = &report.summary;
    match output_mode(cli) {
        OutputMode::Human => {
            println!("{}", display_name(context, &summary.source_key).bold());
            println!("  Filters: {}", describe_filters(&filters));
            println!("  Total visits:          {}", summary.total_visits);
            println!("  Unique sessions:       {}", summary.unique_sessions);
            println!("  Single-visit sessions: {}", summary.single_visit_sessions);
            println!("  Returning rate:        {}", summary.returning_rate);
            println!("  Visits in period:      {}", summary.in_period);
            print_series(context, &report.series);

            let d = &report.distributions;
            print_distribution("Timezones", &d.timezone);
            print_distribution("Referrers", &d.referrer);
            print_distribution("Operating systems", &d.os);
            print_distribution("Browsers", &d.browser);
            print_distribution("Devices", &d.device);

            println!("{}", "Latest activity".bold());
            if report.latest.is_empty() {
                println!("  (no visits recorded)");
            }
            for row in &report.latest {
                println!(
                    "  {:<17} {:<28} {:<22} {:<20} {}",
                    row.time, row.location, row.referrer, row.timezone, row.client
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "site",
                "source": summary.source_key,
                "filters": filters,
                "last_fetched": context.last_fetched(),
                "report": report,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_series(context: &PanelContext, series: &TimeSeries) {
    println!("{}", "Visits over time".bold());
    if series.labels.is_empty() {
        println!("  (no visits in period)");
        return;
    }
    for (idx, label) in series.labels.iter().enumerate() {
        let mut line = format!("  {label:<16}");
        for source in &series.series {
            let value = source.values.get(idx).copied().unwrap_or(0);
            line.push_str(&format!(" {}={value}", display_name(context, &source.source_key)));
        }
        if let Some(total) = series.totals.as_ref().and_then(|totals| totals.get(idx)) {
            line.push_str(&format!("  total={total}"));
        }
        println!("{line}");
    }
}

fn print_distribution(title: &str, counts: &[CategoryCount]) {
    println!("{}", title.bold());
    if counts.is_empty() {
        println!("  {EMPTY_CELL}");
    }
    for entry in counts {
        println!("  {:<32} {}", entry.label, entry.count);
    }
}

fn display_name<'a>(context: &'a PanelContext, key: &'a str) -> &'a str {
    context.source(key).map_or(key, |source| source.name.as_str())
}

// ──────────────────── sources / cache / config ────────────────────

fn run_sources(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    match output_mode(cli) {
        OutputMode::Human => {
            for source in &config.sources {
                println!(
                    "{:<16} {:<26} {:<10} sheet={} gids={}",
                    source.key.bold(),
                    source.name,
                    source.kind,
                    source.sheet_id,
                    source.gids.join(",")
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "sources",
                "sources": config.sources,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_cache(cli: &Cli, args: &CacheArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let cache = DatasetCache::new(config.cache.file.clone(), config.cache.max_age());

    match &args.command {
        None | Some(CacheCommand::Status) => {
            let (state, fetched_at, records, error) = match cache.load_fresh(Utc::now()) {
                Ok(Ok(entry)) => ("fresh", entry.fetched_at, Some(entry.data.len()), None),
                Ok(Err(miss)) => (miss.as_str(), None, None, None),
                Err(error) => ("unreadable", None, None, Some(error.to_string())),
            };

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", cache.path().display());
                    println!("  Enabled: {}", config.cache.enabled);
                    println!("  Max age: {} min", config.cache.max_age_minutes);
                    println!("  State:   {state}");
                    if let Some(ts) = fetched_at {
                        println!("  Fetched: {}", format_local(ts, config.display.offset()));
                    }
                    if let Some(records) = records {
                        println!("  Records: {records}");
                    }
                    if let Some(error) = &error {
                        println!("  Error:   {error}");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "cache status",
                        "path": cache.path().to_string_lossy(),
                        "enabled": config.cache.enabled,
                        "max_age_minutes": config.cache.max_age_minutes,
                        "state": state,
                        "fetched_at": fetched_at,
                        "records": records,
                        "error": error,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(CacheCommand::Clear) => {
            cache
                .clear()
                .map_err(|error| CliError::Runtime(format!("clear {}: {error}", cache.path().display())))?;
            match output_mode(cli) {
                OutputMode::Human => println!("Cache cleared: {}", cache.path().display()),
                OutputMode::Json => {
                    let payload = json!({
                        "command": "cache clear",
                        "path": cache.path().to_string_lossy(),
                        "cleared": true,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
    }
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": config,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash().map_err(runtime_error)?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Sources: {}", config.source_keys().join(", "));
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "sources": config.source_keys(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("vpanel {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "vpanel",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("VPANEL_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters_of(args: &[&str]) -> Result<FilterState, CliError> {
        let mut argv = vec!["vpanel", "overview"];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Overview(view) => view.filters.to_filter_state(),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_global_flags_before_and_after_subcommand() {
        let before = Cli::try_parse_from([
            "vpanel",
            "--config",
            "/tmp/vpanel.toml",
            "--json",
            "--no-color",
            "overview",
        ]);
        assert!(before.is_ok());

        let after = Cli::try_parse_from(["vpanel", "overview", "--json", "--no-color"]);
        assert!(after.is_ok());
    }

    #[test]
    fn parses_every_subcommand() {
        let cases = [
            vec!["vpanel", "refresh"],
            vec!["vpanel", "refresh", "--force", "--no-cache"],
            vec!["vpanel", "watch", "--interval-secs", "30", "--max-cycles", "2"],
            vec!["vpanel", "overview", "--granularity", "month", "--period", "90d"],
            vec!["vpanel", "site", "portfolio", "--start", "2024-01-01", "--offline"],
            vec!["vpanel", "sources"],
            vec!["vpanel", "cache", "status"],
            vec!["vpanel", "cache", "clear"],
            vec!["vpanel", "config", "path"],
            vec!["vpanel", "config", "show"],
            vec!["vpanel", "config", "validate"],
            vec!["vpanel", "version", "--verbose"],
        ];

        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
    }

    #[test]
    fn site_requires_a_key() {
        assert!(Cli::try_parse_from(["vpanel", "site"]).is_err());
    }

    #[test]
    fn filters_default_to_day_and_all() {
        let filters = filters_of(&[]).unwrap();
        assert_eq!(filters, FilterState::default());
    }

    #[test]
    fn custom_bounds_imply_custom_period() {
        let filters = filters_of(&["--start", "2024-01-02", "--granularity", "HOUR"]).unwrap();
        assert_eq!(filters.period, Period::Custom);
        assert_eq!(filters.granularity, Granularity::Hour);
        assert_eq!(filters.custom_start, "2024-01-02");
        assert!(filters.custom_end.is_empty());
    }

    #[test]
    fn bad_filter_input_is_a_user_error() {
        for args in [
            vec!["--granularity", "week"],
            vec!["--period", "1y"],
            vec!["--start", "02/01/2024"],
            vec!["--period", "7d", "--end", "2024-01-31"],
        ] {
            let err = filters_of(&args).unwrap_err();
            assert_eq!(err.exit_code(), 1, "args {args:?}");
        }
    }

    #[test]
    fn custom_period_description_marks_open_bounds() {
        let filters = FilterState {
            period: Period::Custom,
            custom_end: "2024-02-01".into(),
            ..FilterState::default()
        };
        assert_eq!(describe_filters(&filters), "granularity=day period=* .. 2024-02-01");
    }

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(CliError::User(String::new()).exit_code(), 1);
        assert_eq!(CliError::Runtime(String::new()).exit_code(), 2);
        assert_eq!(CliError::Partial(String::new()).exit_code(), 4);
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, Some("auto"), false), OutputMode::Json);
    }
}
