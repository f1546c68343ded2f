//! svcwatch - service portal access telemetry client.
//!
//! ## Subcommands
//!
//! **`watch`**: mounts the dashboard engine (status poller, page presence,
//! preference merge) and prints the reconciled catalog on each refresh until
//! interrupted.
//!
//! **`open <service-id>`**: runs one full access session: record the access,
//! open the service in the configured viewer, heartbeat while the window is
//! open, end the session when it closes.
//!
//! **`status`**: one-shot status fetch; unlike the telemetry paths, errors
//! here are surfaced.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use svcwatch::backend::PortalClient;
use svcwatch::config::{Intervals, PortalConfig};
use svcwatch::dashboard::Dashboard;
use svcwatch::protocol::{Availability, RunState};
use svcwatch::storage::{FileStore, SharedStore};
use svcwatch::window::{ProcessWindow, ServiceWindow};

/// svcwatch - service portal access telemetry client.
#[derive(Parser, Debug)]
#[command(name = "svcwatch", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the portal backend
    #[arg(long, env = "SVCWATCH_PORTAL")]
    portal: Option<String>,

    /// Bearer token for authenticated portals
    #[arg(long, env = "SVCWATCH_TOKEN")]
    token: Option<String>,

    /// Path to the config file (default: <config_dir>/svcwatch/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the client state file (default: <data_dir>/svcwatch/state.json)
    #[arg(long)]
    state: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dashboard loop until interrupted
    Watch {
        /// Use the slower user-monitoring cadence for status polls
        #[arg(long)]
        monitor: bool,
    },

    /// Open a service and run its access session to completion
    Open {
        /// Service id from the catalog
        service_id: String,

        /// Viewer command override (the service URL is appended)
        #[arg(long)]
        viewer: Option<String>,
    },

    /// Fetch and print the aggregate service status once
    Status,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "svcwatch=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(PortalConfig::default_path);
    let file_config = PortalConfig::load(&config_path)?;

    let base_url = cli
        .portal
        .clone()
        .or_else(|| file_config.as_ref().map(|c| c.base_url.clone()))
        .context("no portal URL; pass --portal or set base_url in the config file")?;
    let token = cli
        .token
        .clone()
        .or_else(|| file_config.as_ref().and_then(|c| c.token.clone()));
    let intervals = file_config
        .as_ref()
        .map(|c| c.intervals.clone())
        .unwrap_or_default();
    let viewer_cmd = file_config
        .as_ref()
        .map(|c| c.viewer.clone())
        .unwrap_or_else(|| "xdg-open".to_string());

    let client = PortalClient::with_timeout(&base_url, token, intervals.request_timeout());
    let state_path = cli.state.clone().unwrap_or_else(FileStore::default_path);
    let storage: SharedStore = Arc::new(
        FileStore::open(&state_path)
            .with_context(|| format!("opening state file {}", state_path.display()))?,
    );

    match cli.command {
        Commands::Watch { monitor } => run_watch(client, storage, &intervals, monitor).await,
        Commands::Open { service_id, viewer } => {
            let viewer = viewer.unwrap_or(viewer_cmd);
            run_open(client, storage, &intervals, &service_id, &viewer).await
        }
        Commands::Status => run_status(client).await,
    }
}

/// Mount the dashboard and reprint the catalog on every status update.
async fn run_watch(
    client: PortalClient,
    storage: SharedStore,
    intervals: &Intervals,
    monitor: bool,
) -> anyhow::Result<()> {
    let timers = if monitor {
        intervals.monitor_timers()
    } else {
        intervals.dashboard_timers()
    };
    let dashboard = Dashboard::mount(client, storage, timers);
    let mut status_rx = dashboard.subscribe_status();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                match dashboard.refresh().await {
                    Ok(entries) => print_entries(&entries),
                    Err(e) => tracing::warn!("catalog refresh failed: {e}"),
                }
            }
        }
    }

    dashboard.shutdown().await;
    Ok(())
}

fn print_entries(entries: &[svcwatch::dashboard::DashboardEntry]) {
    println!("{:<12} {:<24} {:<12} {:<8} {:<4} {}", "ID", "NAME", "ACCESS", "STATE", "FAV", "GROUP");
    for entry in entries {
        let (access, running) = match entry.status {
            Some(s) => (
                match s.access {
                    Availability::Available => "available",
                    Availability::Unavailable => "unavailable",
                },
                match s.running {
                    RunState::Online => "online",
                    RunState::Offline => "offline",
                },
            ),
            None => ("-", "-"),
        };
        println!(
            "{:<12} {:<24} {:<12} {:<8} {:<4} {}",
            entry.record.id,
            entry.record.name,
            access,
            running,
            if entry.record.is_favorite == Some(true) { "*" } else { "" },
            entry.record.group_id.as_deref().unwrap_or("-"),
        );
    }
}

/// One full access session against a spawned viewer window.
async fn run_open(
    client: PortalClient,
    storage: SharedStore,
    intervals: &Intervals,
    service_id: &str,
    viewer: &str,
) -> anyhow::Result<()> {
    let timers = intervals.dashboard_timers();
    let dashboard = Dashboard::mount(client.clone(), storage, timers);

    let entries = dashboard.refresh().await?;
    let url = entries
        .iter()
        .find(|e| e.record.id == service_id)
        .map(|e| e.record.url.clone())
        .with_context(|| format!("service {service_id} not found in catalog"))?;

    let viewer = viewer.to_string();
    let session = dashboard
        .open_service(service_id, move || {
            ProcessWindow::open(&viewer, &url).map(|w| Arc::new(w) as Arc<dyn ServiceWindow>)
        })
        .await?;
    tracing::info!(
        service_id,
        session_id = %session.token(),
        "service opened; monitoring until the window closes"
    );

    let mut state_rx = session.subscribe();
    while *state_rx.borrow_and_update() != svcwatch::session::SessionState::Ended {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; ending session");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    dashboard.shutdown().await;
    Ok(())
}

/// One-shot status fetch. Errors here are user-visible by design.
async fn run_status(client: PortalClient) -> anyhow::Result<()> {
    let snapshot = client
        .fetch_status()
        .await
        .context("fetching service status")?;
    let mut ids: Vec<_> = snapshot.keys().collect();
    ids.sort();
    for id in ids {
        let s = snapshot[id];
        println!(
            "{id}\taccess={}\trunning={}",
            match s.access {
                Availability::Available => "available",
                Availability::Unavailable => "unavailable",
            },
            match s.running {
                RunState::Online => "online",
                RunState::Offline => "offline",
            }
        );
    }
    Ok(())
}
