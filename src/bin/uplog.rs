use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use console::{Term, set_colors_enabled, style};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use uplog::config::Settings;
use uplog::stats::{find_outages, summarize};
use uplog::{
    LogStore, ObservationSink, Prober, Scheduler, UplogError, fmt, is_reachable_tcp,
};

#[derive(Parser, Debug)]
#[command(name = "uplog")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Probe a host periodically and keep a rotating log of its reachability")]
struct Cli {
    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the log segments
    #[arg(short = 'd', long, global = true)]
    data_dir: Option<PathBuf>,

    /// Disable colored output
    #[arg(long = "no-color", alias = "nocolor", global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the target on a fixed interval and append results to the log
    Run(RunArgs),
    /// Show the latest observations of the current segment
    Recent(RecentArgs),
    /// Show observations in a time window across all segments
    History(HistoryArgs),
    /// Probe once and print the result
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Host or IP to probe
    #[arg(short, long)]
    target: Option<String>,

    /// Seconds between probes
    #[arg(short, long)]
    interval: Option<u64>,

    /// Rotate the current segment once it exceeds this many bytes
    #[arg(long)]
    max_segment_bytes: Option<u64>,
}

#[derive(Args, Debug)]
struct RecentArgs {
    /// Number of entries (non-positive means 100)
    #[arg(short = 'n', long, default_value_t = 100, allow_negative_numbers = true)]
    limit: i64,

    /// Print JSON instead of text
    #[arg(short = 'j', long)]
    json: bool,

    /// Pretty-print JSON
    #[arg(short = 'p', long, requires = "json")]
    pretty: bool,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Window start, RFC 3339 (defaults to 24 hours before --end)
    #[arg(long, value_parser = parse_instant)]
    start: Option<DateTime<Utc>>,

    /// Window end, RFC 3339 (defaults to now)
    #[arg(long, value_parser = parse_instant)]
    end: Option<DateTime<Utc>>,

    /// Include the outage list
    #[arg(long)]
    outages: bool,

    /// Print the outage list as CSV only
    #[arg(long, conflicts_with = "json")]
    csv: bool,

    /// Print JSON instead of text
    #[arg(short = 'j', long)]
    json: bool,

    /// Pretty-print JSON
    #[arg(short = 'p', long, requires = "json")]
    pretty: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Host or IP to probe
    #[arg(short, long)]
    target: Option<String>,

    /// Check a TCP port instead of sending an ICMP echo
    #[arg(long)]
    tcp_port: Option<u16>,

    /// Timeout in seconds
    #[arg(long, default_value_t = 2.0)]
    timeout: f64,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let want_color = io::stdout().is_terminal()
        && std::env::var_os("NO_COLOR").is_none()
        && !cli.no_color;
    set_colors_enabled(want_color);
    let term = Term::stdout();

    let exit_code = match execute(&cli, &term).await {
        Ok(()) => 0,
        Err(e) => handle_error(&term, e),
    };
    process::exit(exit_code);
}

async fn execute(cli: &Cli, term: &Term) -> Result<(), UplogError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        settings.storage.data_dir = dir.clone();
    }

    match &cli.command {
        Command::Run(args) => {
            if let Some(target) = &args.target {
                settings.monitor.target = target.clone();
            }
            if let Some(interval) = args.interval {
                settings.monitor.interval_secs = interval;
            }
            if let Some(max) = args.max_segment_bytes {
                settings.storage.max_segment_bytes = max;
            }
            run(&settings).await
        }
        Command::Recent(args) => {
            let store = LogStore::open_read_only(settings.store_config());
            let series = store.recent(args.limit)?;
            if args.json {
                println!("{}", fmt::json::observations_to_json(&series, args.pretty)?);
            } else {
                term.write_line(&fmt::text::render_series(&series)).ok();
            }
            Ok(())
        }
        Command::History(args) => {
            let now = Utc::now();
            let end = args.end.unwrap_or(now);
            let start = args.start.unwrap_or(end - chrono::Duration::hours(24));
            let store = LogStore::open_read_only(settings.store_config());
            let series = store.range(start, end)?;
            let summary = summarize(&series, now.min(end));
            let outages = find_outages(&series, now.min(end));

            if args.csv {
                print!("{}", fmt::csv::outages_to_csv(&outages));
            } else if args.json {
                let outages = args.outages.then_some(outages.as_slice());
                println!(
                    "{}",
                    fmt::json::history_to_json(&series, &summary, outages, args.pretty)?
                );
            } else {
                term.write_line(&fmt::text::render_series(&series)).ok();
                term.write_line(&fmt::text::render_summary(&summary)).ok();
                if args.outages {
                    term.write_line(&fmt::text::render_outages(&outages)).ok();
                }
            }
            Ok(())
        }
        Command::Check(args) => {
            let target = args
                .target
                .clone()
                .unwrap_or_else(|| settings.scheduler_config().target);
            let timeout = Duration::try_from_secs_f64(args.timeout)
                .map_err(|e| UplogError::Config(format!("invalid timeout: {e}")))?;
            match args.tcp_port {
                Some(port) => {
                    let up = is_reachable_tcp(&target, port, timeout).await;
                    let state = if up {
                        style("reachable").green().bold()
                    } else {
                        style("unreachable").red().bold()
                    };
                    term.write_line(&format!("{} tcp/{port}: {state}", style(&target).green()))
                        .ok();
                }
                None => {
                    let observation = Prober::default().with_timeout(timeout).probe(&target).await;
                    term.write_line(&fmt::text::render_observation(&observation))
                        .ok();
                }
            }
            Ok(())
        }
    }
}

async fn run(settings: &Settings) -> Result<(), UplogError> {
    let store = Arc::new(LogStore::open(settings.store_config())?);
    let prober = Prober::default().with_timeout(settings.probe_timeout());
    let strategy = prober.strategy_name();
    let sink: Arc<dyn ObservationSink> = store.clone();
    let scheduler = Arc::new(Scheduler::new(settings.scheduler_config(), prober, sink));

    info!(
        host = %scheduler.config().target,
        strategy,
        interval_secs = scheduler.config().interval.as_secs(),
        data_dir = %store.data_dir().display(),
        "started monitoring"
    );

    let runner = Arc::clone(&scheduler);
    let mut handle = tokio::spawn(async move { runner.start().await });

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutting down");
            scheduler.stop();
            match handle.await {
                Ok(res) => res,
                Err(e) => Err(UplogError::Other(format!("scheduler task failed: {e}"))),
            }
        }
        res = &mut handle => match res {
            Ok(res) => res,
            Err(e) => Err(UplogError::Other(format!("scheduler task failed: {e}"))),
        },
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
                return;
            }
            Err(e) => warn!(error = %e, "cannot listen for SIGTERM"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let json = std::env::var("UPLOG_LOG_FORMAT").is_ok_and(|v| v == "json");
    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_filter(filter)
            .boxed()
    };
    tracing_subscriber::registry().with(layer).init();
}

fn handle_error(term: &Term, err: UplogError) -> i32 {
    term.write_line(&style(format!("Error: {}", err)).red().to_string())
        .ok();
    match err {
        UplogError::Storage { .. } => 4,
        UplogError::Config(_) => 5,
        _ => 1,
    }
}
