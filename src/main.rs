use anyhow::{Context, Result};
use backup_engine::config::{AppConfig, CliConfig, FileConfig};
use backup_engine::database::PgDumpDumper;
use backup_engine::destination::LocalDestination;
use backup_engine::webhooks::ReqwestWebhookClient;
use backup_engine::{metrics, EngineComponents, EngineRuntime, EngineSettings, SqliteStore};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Its values override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Default log level, overridden by the LOG_LEVEL environment variable.
    #[clap(long)]
    pub log_level: Option<String>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long)]
    pub metrics_port: Option<u16>,
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let default_level = match level {
        Some(level) => level
            .parse::<LevelFilter>()
            .with_context(|| format!("Invalid log level: {}", level))?,
        None => LevelFilter::INFO,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    let file_config = cli_args
        .config
        .as_deref()
        .map(FileConfig::load)
        .transpose()?;
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        log_level: cli_args.log_level.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    init_logging(config.log_level.as_deref())?;

    info!("Initializing metrics...");
    metrics::init_metrics();

    info!("Opening SQLite database at {:?}...", config.db_path);
    let store = Arc::new(SqliteStore::new(&config.db_path)?);

    info!(
        "{} databases and {} destinations configured",
        config.databases.len(),
        config.destinations.len()
    );
    let components = EngineComponents {
        store,
        dumper: Arc::new(PgDumpDumper::new(
            config.pg_dump_path.clone(),
            &config.databases,
        )),
        destination: Arc::new(LocalDestination::new(&config.destinations)),
        webhook_client: Arc::new(ReqwestWebhookClient::new(config.webhooks.request_timeout)?),
    };
    let runtime = EngineRuntime::start(components, EngineSettings::from(&config))?;

    let metrics_shutdown = CancellationToken::new();
    let metrics_task = cli_args.metrics_port.map(|port| {
        let token = metrics_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(port, token).await {
                error!("Metrics server failed: {}", e);
            }
        })
    });

    info!("Backup engine running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    runtime.shutdown().await;
    metrics_shutdown.cancel();
    if let Some(task) = metrics_task {
        let _ = task.await;
    }
    Ok(())
}
