use govalert::alert::AlertDispatcher;
use govalert::config::Config;
use govalert::http::{HttpTransport, ReqwestTransport};
use govalert::metrics::{server as metrics_server, ApiMetrics};
use govalert::reconciler::Reconciler;
use govalert::scheduler::{CycleScheduler, IntervalTicker, SystemClock};
use govalert::store::VoteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

const DEFAULT_CONFIG: &str = "govalert.toml";
const LEGACY_CONFIG: &str = "config.json";

/// `--config <path>` wins; otherwise `govalert.toml`, or the legacy
/// `config.json` when only that one exists.
fn config_path(args: &[String]) -> PathBuf {
    if let Some(pos) = args.iter().position(|a| a == "--config") {
        if let Some(path) = args.get(pos + 1) {
            return PathBuf::from(path);
        }
    }
    if !Path::new(DEFAULT_CONFIG).exists() && Path::new(LEGACY_CONFIG).exists() {
        return PathBuf::from(LEGACY_CONFIG);
    }
    PathBuf::from(DEFAULT_CONFIG)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let once = args.iter().any(|a| a == "--once");
    let path = config_path(&args);
    let config = Config::load(&path)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", path.display(), e))?;

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.app.log_level.to_lowercase()));

    if config.app.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!(
        config = %path.display(),
        chains = config.chains.len(),
        "govalert v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let metrics = ApiMetrics::new()?;
    if config.app.metrics_enabled {
        let metrics = metrics.clone();
        let bind = config.app.metrics_bind_addr.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_server::serve(metrics, &bind).await {
                error!(error = %e, "metrics server error");
            }
        });
    } else {
        info!("metrics endpoint disabled (set app.metrics_enabled=true in config)");
    }

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
    let dispatcher = AlertDispatcher::from_config(
        &config.alerts,
        transport.clone(),
        Duration::from_secs(config.app.alert_timeout_secs),
    );
    info!(sinks = ?dispatcher.sink_names(), "alert sinks configured");

    let store = VoteStore::new(&config.app.votes_file);
    let ticker = IntervalTicker::from_minutes(config.app.interval_minutes);
    let reconciler = Reconciler::new(
        config,
        store,
        transport,
        dispatcher,
        metrics,
        Arc::new(SystemClock),
    );
    let scheduler = CycleScheduler::new(reconciler, ticker);

    if once {
        scheduler.run_once().await?;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down after the current cycle...");
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await?;
    Ok(())
}
