//! Pinglog Binary Entry Point
//!
//! Without query flags this probes the configured host until interrupted,
//! persisting every reply and timeout. With `--date` and `--ping` it prints
//! aggregates over the recorded data instead.
//! Core functionality is provided by the `pinglog` library crate.

use std::process::ExitCode;

use clap::Parser;
use pinglog::{
    collector::ping::PingProber,
    collector::{SessionController, SessionOutcome},
    config::{AppConfig, DEFAULT_CONFIG_PATH, parse_duration},
    query::{DateSelector, QueryEngine},
    storage::{PartitionStore, StorageBuilder},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = r#"
    Available options:
    --date=DDMMYYYY|all    : Date of the recorded data to query (e.g., --date=30092024),
                             or 'all' to report every recorded day separately.
    --ping=[option]        : Value to compute for the selected date(s):
                            - max: Returns the highest ping value.
                            - min: Returns the lowest ping value.
                            - avg: Returns the average ping value.
                            - timeout: Returns the total count of timeouts.
                            - getAll: Returns all the ping records, including timeouts.
                            - all: Returns min, max, avg and timeout together.
    --json                 : Print query results as JSON.
    --usage                : Display this usage guide.

    Without --date/--ping the host is pinged until Ctrl+C, and every reply
    and timeout is stored in the table for its day.
"#;

/// Pinglog - Ping Latency Recorder
#[derive(Parser, Debug)]
#[command(name = "pinglog", version, about, long_about = None)]
struct Cli {
    /// Date to query, as DDMMYYYY, or "all"
    #[arg(long, requires = "ping", value_name = "DDMMYYYY|all")]
    date: Option<DateSelector>,

    /// Aggregation to compute: min, max, avg, timeout, getAll, all
    #[arg(long, requires = "date", value_name = "KIND")]
    ping: Option<String>,

    /// Print query results as JSON
    #[arg(long)]
    json: bool,

    /// Display the usage guide and exit
    #[arg(long)]
    usage: bool,

    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "PINGLOG_CONFIG")]
    config: String,

    /// Database file path (overrides config file)
    #[arg(long, env = "PINGLOG_DB_PATH")]
    db_path: Option<String>,

    /// Host to ping (overrides config file)
    #[arg(long, env = "PINGLOG_HOST")]
    host: Option<String>,

    /// Samples per batch write (overrides config file)
    #[arg(long, env = "PINGLOG_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Pause before retrying a failed batch write, e.g. "500ms" (overrides config file)
    #[arg(long, env = "PINGLOG_RETRY_BACKOFF", value_parser = parse_duration)]
    retry_backoff: Option<std::time::Duration>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let probing = !cli.usage && cli.date.is_none();

    // Initialize tracing; keep stdout for results
    let default_filter = if probing { "info,pinglog=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.usage {
        println!("{USAGE}");
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;

    match (cli.date, cli.ping.as_deref()) {
        (Some(selector), Some(kind)) => {
            run_query(&config, selector, kind, cli.json).await?;
            Ok(ExitCode::SUCCESS)
        }
        _ => run_session(&config).await,
    }
}

/// Load configuration and apply CLI/env overrides (CLI > ENV > config file).
fn load_config(cli: &Cli) -> Result<AppConfig, Box<dyn std::error::Error>> {
    tracing::debug!(path = %cli.config, "Loading configuration");
    let mut config = if cli.config == DEFAULT_CONFIG_PATH {
        AppConfig::load_or_default(&cli.config)?
    } else {
        AppConfig::load(&cli.config)?
    };

    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }
    if let Some(host) = &cli.host {
        config.probe.host = host.clone();
    }
    if let Some(size) = cli.batch_size {
        config.batch.capacity = size;
    }
    if let Some(backoff) = cli.retry_backoff {
        config.batch.retry_backoff = backoff;
    }
    config.validate()?;

    Ok(config)
}

async fn run_query(
    config: &AppConfig,
    selector: DateSelector,
    kind: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = StorageBuilder::new(&config.database.path)
        .with_create_if_missing(false)
        .build()
        .await?;
    let result = QueryEngine::new(&store).query(selector, kind).await;
    store.close().await;
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

async fn run_session(config: &AppConfig) -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing::info!(
        host = %config.probe.host,
        database = %config.database.path,
        batch = config.batch.capacity,
        "Pinglog - Ping Latency Recorder"
    );
    println!("Starting ping process...");

    let store = StorageBuilder::new(&config.database.path).build().await?;
    let prober = PingProber::new(config.probe.clone());
    let mut session = SessionController::new(prober, store)
        .with_batch(config.batch.to_buffer())
        .with_session_log(config.session_log.to_session_log())
        .with_echo(true);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let summary = session.run(cancel).await?;
    if let Some(path) = &summary.log_path {
        tracing::info!(path = %path.display(), "Session log written");
    }
    tracing::debug!(
        replies = summary.stats.replies,
        timeouts = summary.stats.timeouts,
        ignored = summary.stats.ignored,
        "Session stats"
    );

    match summary.outcome {
        SessionOutcome::Interrupted => {
            println!("\nScript terminated, data saved.");
            Ok(ExitCode::SUCCESS)
        }
        SessionOutcome::StreamEnded => Ok(ExitCode::SUCCESS),
        SessionOutcome::ProbeExited(reason) => {
            tracing::error!(reason = %reason, "Probe process exited");
            Ok(ExitCode::FAILURE)
        }
        SessionOutcome::FlushFailed(reason) => {
            tracing::error!(
                reason = %reason,
                unflushed = summary.unflushed,
                "Failed to persist samples"
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Cancel the session on Ctrl+C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    cancel.cancel();
}
