//! Vitals Keeper binary
//!
//! Samples host vitals into a time-series store and serves recent reads.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vitals_keeper::{
    start_web_server, Metric, MetricSample, Pipeline, PipelineConfig, QueryService,
    RetentionManager, RetentionPolicy, Sampler, SampleStore, SqliteStore, SysinfoSource,
    WebConfig, DEFAULT_INTERVAL_MS, DEFAULT_WEB_PORT,
};

#[derive(Parser)]
#[command(name = "vitals_keeper")]
#[command(about = "Host vitals sampler with time-series retention")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Samples CPU, memory, disk and temperature at a fixed cadence, \
keeps them as a bounded time series and serves latest/recent-window reads")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    database: Option<PathBuf>,

    /// Sampling interval in milliseconds
    #[arg(short, long)]
    interval: Option<u64>,

    /// Mount point whose usage is reported as disk usage
    #[arg(long)]
    mount_point: Option<PathBuf>,

    /// Keep samples in memory, capped at this many rows, instead of on disk
    #[arg(long)]
    memory_capacity: Option<usize>,

    /// Retention horizon in days for the durable store
    #[arg(long)]
    horizon_days: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample continuously and serve the read API (default)
    Run(RunArgs),

    /// Take a single sample and exit
    Sample(FormatArgs),

    /// Print the most recent stored sample
    Latest(FormatArgs),

    /// Print stored samples from a recent window
    Window(WindowArgs),

    /// Delete stored samples older than the horizon
    Prune,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Read API bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Read API port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Sample without serving the read API
    #[arg(long)]
    no_api: bool,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct FormatArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[derive(Args)]
struct WindowArgs {
    /// Window length in seconds
    #[arg(long)]
    secs: Option<u64>,

    /// Maximum number of rows
    #[arg(long)]
    limit: Option<usize>,

    #[command(flatten)]
    output: FormatArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    init_logging(&cli)?;

    // Structural problems are fatal before anything starts.
    let config = build_config(&cli)?;
    config.validate()?;

    match &cli.command {
        Some(Commands::Run(args)) => run_command(&config, args).await,
        Some(Commands::Sample(args)) => sample_command(&config, args).await,
        Some(Commands::Latest(args)) => latest_command(&config, args).await,
        Some(Commands::Window(args)) => window_command(&config, args).await,
        Some(Commands::Prune) => prune_command(&config).await,
        None => {
            let run_args = RunArgs {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_WEB_PORT,
                ..Default::default()
            };
            run_command(&config, &run_args).await
        }
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(path) = &cli.database {
        config = config.with_database_path(path);
    }
    if let Some(interval) = cli.interval {
        config = config.with_sample_interval_ms(interval);
    }
    if let Some(mount_point) = &cli.mount_point {
        config = config.with_disk_mount_point(mount_point);
    }
    if let Some(max_rows) = cli.memory_capacity {
        config = config.with_retention(RetentionPolicy::Capacity { max_rows });
    }
    if let Some(days) = cli.horizon_days {
        let prune_interval_secs = match config.retention {
            RetentionPolicy::Age {
                prune_interval_secs,
                ..
            } => prune_interval_secs,
            RetentionPolicy::Capacity { .. } => {
                bail!("--horizon-days cannot be combined with --memory-capacity")
            }
        };
        config.retention = RetentionPolicy::Age {
            horizon_secs: days.saturating_mul(24 * 3600),
            prune_interval_secs,
        };
    }

    Ok(config)
}

fn sysinfo_sampler(config: &PipelineConfig) -> Sampler<SysinfoSource> {
    Sampler::new(SysinfoSource::new(
        &config.disk_mount_point,
        config.sensor.clone(),
    ))
}

/// Open the durable store for one-shot commands that read what `run` wrote.
fn open_durable(config: &PipelineConfig) -> anyhow::Result<Arc<dyn SampleStore>> {
    if let RetentionPolicy::Capacity { .. } = config.retention {
        bail!("this command reads the durable store; the in-memory store only lives inside `run`");
    }
    let store = SqliteStore::open(&config.database_path, config.storage_timeout())
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    Ok(Arc::new(store))
}

async fn run_command(config: &PipelineConfig, args: &RunArgs) -> anyhow::Result<()> {
    info!("Starting vitals sampler...");
    info!("  - Interval: {}ms", config.sample_interval_ms);
    match config.retention {
        RetentionPolicy::Age { horizon_secs, .. } => info!(
            "  - Store: {} (horizon {} days)",
            config.database_path.display(),
            horizon_secs / (24 * 3600)
        ),
        RetentionPolicy::Capacity { max_rows } => {
            info!("  - Store: in memory, last {} rows", max_rows)
        }
    }

    let pipeline = Pipeline::start(config, sysinfo_sampler(config))?;

    let server = if args.no_api {
        None
    } else {
        let web_config = WebConfig::listen_on(&args.host, args.port)
            .with_cors(!args.no_cors)
            .with_window(config.window_secs, config.window_row_cap);
        let query = pipeline.query_service();
        let signal = pipeline.shutdown_signal();
        Some(tokio::spawn(start_web_server(web_config, query, signal)))
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutting down...");

    let report = pipeline.shutdown().await;
    if let Some(server) = server {
        server.await??;
    }

    info!(
        "Stored {} samples ({} insert failures, {} missed deadlines)",
        report.sampler.inserted, report.sampler.insert_failures, report.sampler.missed_deadlines
    );
    Ok(())
}

async fn sample_command(config: &PipelineConfig, args: &FormatArgs) -> anyhow::Result<()> {
    let mut sampler = sysinfo_sampler(config);
    // CPU usage needs two refreshes some time apart to be meaningful.
    tokio::time::sleep(Duration::from_millis(DEFAULT_INTERVAL_MS.min(500))).await;
    let sample = sampler.sample()?;
    if sample.temperature_celsius.is_none() {
        warn!(
            "No reading from sensor '{} {}'; visible sensors: {:?}",
            config.sensor.group,
            config.sensor.label,
            sampler.source().sensor_labels()
        );
    }
    print_samples(&[sample], &args.format)
}

async fn latest_command(config: &PipelineConfig, args: &FormatArgs) -> anyhow::Result<()> {
    let query = QueryService::new(open_durable(config)?);
    match query.latest_snapshot().await? {
        Some(sample) => print_samples(&[sample], &args.format),
        None => {
            println!("No samples stored yet");
            Ok(())
        }
    }
}

async fn window_command(config: &PipelineConfig, args: &WindowArgs) -> anyhow::Result<()> {
    let query = QueryService::new(open_durable(config)?);
    let window = Duration::from_secs(args.secs.unwrap_or(config.window_secs));
    let limit = args.limit.unwrap_or(config.window_row_cap);
    let samples = query.recent_window(window, limit).await?;
    print_samples(&samples, &args.output.format)
}

async fn prune_command(config: &PipelineConfig) -> anyhow::Result<()> {
    let RetentionPolicy::Age { horizon_secs, .. } = config.retention else {
        bail!("pruning applies to the durable store only");
    };
    let manager = RetentionManager::new(open_durable(config)?, Duration::from_secs(horizon_secs))?;
    let deleted = manager.prune_at(chrono::Utc::now()).await?;
    println!("Deleted {} samples", deleted);
    Ok(())
}

fn print_samples(samples: &[MetricSample], format: &str) -> anyhow::Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(samples)?;
            println!("{}", json);
        }
        "pretty" => {
            for sample in samples {
                print_pretty_sample(sample);
            }
        }
        other => bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }
    Ok(())
}

fn print_pretty_sample(sample: &MetricSample) {
    let readings: Vec<String> = Metric::ALL
        .into_iter()
        .map(|metric| match sample.get(metric) {
            Some(value) => format!("{}: {:.1}{}", metric, value, metric.unit()),
            None => format!("{}: n/a", metric),
        })
        .collect();
    println!(
        "{}  {}",
        sample.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        readings.join("  ")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["vitals_keeper", "--interval", "250", "run", "--port", "9090"])
            .unwrap();
        assert_eq!(cli.interval, Some(250));
        match cli.command {
            Some(Commands::Run(args)) => assert_eq!(args.port, 9090),
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_memory_capacity_selects_ring_policy() {
        let cli = Cli::try_parse_from(["vitals_keeper", "--memory-capacity", "100"]).unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.retention, RetentionPolicy::Capacity { max_rows: 100 });
    }

    #[test]
    fn test_horizon_conflicts_with_memory_capacity() {
        let cli = Cli::try_parse_from([
            "vitals_keeper",
            "--memory-capacity",
            "100",
            "--horizon-days",
            "7",
        ])
        .unwrap();
        assert!(build_config(&cli).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "vitals_keeper",
            "--database",
            "/tmp/other.db",
            "--mount-point",
            "/home",
            "--horizon-days",
            "7",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.disk_mount_point, PathBuf::from("/home"));
        assert_eq!(
            config.retention,
            RetentionPolicy::Age {
                horizon_secs: 7 * 24 * 3600,
                prune_interval_secs: 3600
            }
        );
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["vitals_keeper"]).unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.sample_interval_ms, DEFAULT_INTERVAL_MS);
        assert!(cli.command.is_none());
    }
}
