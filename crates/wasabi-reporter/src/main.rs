use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use anyhow::Context;
use tracing::{error, info, warn};
use wasabi_core::config::LogFormat;
use wasabi_core::{ReporterError, WasabiConfig};
use wasabi_lease::{LeaderLease, RedisLeaseStore};
use wasabi_scheduler::{CronSchedule, SchedulerEngine};
use wasabi_workflow::azure::{AzureBlobStore, DefaultCredential, KeyVaultClient};
use wasabi_workflow::blob::{BlobStore, UnconfiguredBlobStore};
use wasabi_workflow::mailgun::MailgunNotifier;
use wasabi_workflow::{JobRunner, ReportSettings, ReportWorkflow, TickOutcome};

const DEFAULT_FILTER: &str = "wasabi_reporter=info,wasabi_workflow=info,wasabi_lease=info,\
                              wasabi_scheduler=info,reqwest=warn,hyper=warn";

/// Daily Wasabi catch-all file report.
#[derive(Parser, Debug)]
#[command(name = "wasabi-reporter", version)]
struct Cli {
    /// Run one report tick immediately instead of waiting for the schedule.
    #[arg(long)]
    now: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // load config: WASABI_CONFIG env > ~/.wasabi/wasabi.toml
    let config_path = std::env::var("WASABI_CONFIG").ok();
    let config = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            init_tracing(&LogFormat::default());
            error!(
                code = e.downcast_ref::<ReporterError>().map(ReporterError::code),
                error = %format!("{e:#}"),
                "refusing to start with an unusable config"
            );
            return Err(e);
        }
    };
    init_tracing(&config.logging.format);

    let runner = Arc::new(build_runner(&config)?);

    if cli.now {
        warn!("Running Wasabi Reporter now");
        return match runner.tick(chrono::Utc::now()).await {
            TickOutcome::Failed(e) => Err(e.into()),
            _ => Ok(()),
        };
    }

    warn!("Starting Wasabi Reporter...");
    let schedule = CronSchedule::parse(&config.schedule.cron)?;
    let engine = SchedulerEngine::new(schedule, runner);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine_task = tokio::spawn(engine.run(shutdown_rx));

    shutdown_signal().await;
    info!("shutdown signal received, stopping after the current tick");
    let _ = shutdown_tx.send(true);
    engine_task.await?;
    Ok(())
}

fn load_config(path: Option<&str>) -> anyhow::Result<WasabiConfig> {
    WasabiConfig::load(path).with_context(|| {
        format!("loading config from {}", path.unwrap_or("~/.wasabi/wasabi.toml"))
    })
}

fn init_tracing(format: &LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().with_current_span(true).init(),
        LogFormat::Pretty => builder.init(),
    }
}

/// Wire the lease, blob store, secret store and notifier from config.
fn build_runner(config: &WasabiConfig) -> anyhow::Result<JobRunner> {
    let holder = config.lease.resolve_holder()?;
    info!(holder = %holder, key = %config.lease.key, ttl_secs = config.lease.ttl_secs, "replica identity resolved");

    let store = Arc::new(RedisLeaseStore::open(&config.lease.redis_url)?);
    let lease = LeaderLease::new(
        store,
        &config.lease.key,
        holder,
        Duration::from_secs(config.lease.ttl_secs),
    );

    let blobs: Arc<dyn BlobStore> = match blob_store(config) {
        Ok(store) => Arc::new(store),
        Err(reason) => {
            error!(%reason, "blob storage is not configured, every report will fail");
            Arc::new(UnconfiguredBlobStore::new(reason))
        }
    };

    let credential = Arc::new(DefaultCredential::from_env(
        config.secrets.disable_env_credential,
    )?);
    let vault = Arc::new(KeyVaultClient::new(&config.secrets.vault_url, credential));
    let notifier = Arc::new(MailgunNotifier::new(vault, &config.secrets.mailgun_secret));

    let workflow = ReportWorkflow::new(blobs, notifier, ReportSettings::from_config(config));
    Ok(JobRunner::new(lease, workflow))
}

fn blob_store(config: &WasabiConfig) -> Result<AzureBlobStore, String> {
    let connection_string = config.blob_connection_string().map_err(|e| e.to_string())?;
    AzureBlobStore::from_connection_string(connection_string, &config.blob.container)
        .map_err(|e| e.to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
