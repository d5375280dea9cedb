use anyhow::Context;
use kick_daemon::{http, kick::KickClient, logs};
use kick_proto::config::Config;
use kick_proto::dashboard::Dashboard;
use kick_proto::fetcher::Fetcher;
use kick_proto::persist::JsonStore;
use kick_proto::roster::Roster;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Setup file logging + recent-warnings buffer
    let data_dir = config.paths.data_dir.clone();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("kickwatch.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    let recent_logs = logs::RecentLogs::new();

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(logs::RecentLogLayer::new(recent_logs.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,kick_daemon=debug,kick_proto=debug")
            }),
        )
        .init();

    eprintln!("kickwatch: logging to {}", log_path.display());
    info!("Log file: {:?}", log_path);
    info!("Config loaded from: {:?}", Config::config_path());

    let roster = Roster::load(&config.roster.roster_toml)
        .with_context(|| format!("reading roster {:?}", config.roster.roster_toml))?;
    info!(
        "Roster loaded from {:?}: {} channels",
        config.roster.roster_toml,
        roster.len()
    );
    if !config.interval_covers_cycle(roster.len()) {
        warn!(
            "Polling interval {:?} is shorter than a worst-case cycle ({:?}); overlapping ticks will be skipped",
            config.polling.interval(),
            config.worst_case_cycle(roster.len())
        );
    }

    let dashboard = Arc::new(Dashboard::open(
        JsonStore::new(&data_dir),
        roster,
        config.notifications.permission,
    ));
    match dashboard.record_seen_version(env!("CARGO_PKG_VERSION")).await {
        Ok(true) => info!("First run of version {}", env!("CARGO_PKG_VERSION")),
        Ok(false) => {}
        Err(e) => warn!("Could not record version: {}", e),
    }

    let cancel = CancellationToken::new();
    let source = Arc::new(KickClient::new(&config.api)?);
    let fetcher = Arc::new(
        Fetcher::new(
            dashboard.roster(),
            dashboard.snapshots(),
            source,
            dashboard.notifier(),
            cancel.clone(),
        )
        .with_request_delay(config.polling.request_delay()),
    );

    let poller = tokio::spawn(Arc::clone(&fetcher).run(config.polling.interval()));

    // Start HTTP API if enabled
    let http_handle = if config.http.enabled {
        Some(http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            http::HttpState {
                dashboard: Arc::clone(&dashboard),
                fetcher: Arc::clone(&fetcher),
                logs: recent_logs,
            },
        ))
    } else {
        None
    };

    info!("Daemon initialised, polling every {:?}", config.polling.interval());
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    cancel.cancel();
    if let Err(e) = poller.await {
        error!("Poller task failed: {}", e);
    }
    if let Some(handle) = http_handle {
        handle.abort();
    }

    Ok(())
}
