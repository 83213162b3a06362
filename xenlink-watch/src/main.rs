//! # xenlink-watch
//!
//! Event tail for XenAPI-style pools. Logs in, follows `event.from` for the
//! configured classes and logs every object change, keeping a local view of
//! live objects that survives event history overflows.
//!
//! ## Usage
//! ```bash
//! XENLINK_PASSWORD=secret xenlink-watch --url https://xen01 --classes VM,host
//! xenlink-watch --config /etc/xenlink/watch.yaml
//! xenlink-watch --dev
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use xenlink_client::{JsonRpcTransport, MockServer, Session, Transport, WireValue};

mod cli;
mod config;
mod watcher;

use cli::Args;
use config::{Config, DEFAULT_CONFIG_PATH};
use watcher::EventWatcher;

/// Interval between simulated changes in `--dev` mode.
const DEMO_INTERVAL: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging so its logging section applies
    let (config, source) = match &args.config {
        Some(config_path) => {
            let cfg = Config::load(config_path)
                .with_context(|| format!("Failed to load configuration from {}", config_path))?;
            (cfg.with_cli_overrides(&args), Some(config_path.clone()))
        }
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg.with_cli_overrides(&args), Some(DEFAULT_CONFIG_PATH.to_string())),
            Err(_) => (Config::default_with_cli(&args), None),
        },
    };

    xenlink_common::init_logging_with_format(&config.logging.level, config.logging.format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting xenlink event tail"
    );
    match &source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }

    let transport: Arc<dyn Transport> = if args.dev {
        info!("Development mode: using in-memory server");
        demo_server()?
    } else {
        Arc::new(JsonRpcTransport::new(&config.server.client_config())?)
    };

    let password = match (&config.server.password, args.dev) {
        (Some(password), _) => password.clone(),
        (None, true) => String::new(),
        (None, false) => {
            anyhow::bail!("No password configured (use --password or XENLINK_PASSWORD)")
        }
    };

    let session = Session::login_with_password(
        transport,
        &config.server.username,
        &password,
        &originator(),
    )
    .await
    .with_context(|| format!("Login to {} failed", config.server.url))?;

    info!(
        url = %config.server.url,
        classes = ?config.watch.classes,
        timeout_secs = config.watch.timeout_secs,
        "Event tail configured"
    );

    let mut watcher = EventWatcher::new(session.clone(), &config.watch);
    let result = watcher
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Err(e) = session.logout().await {
        warn!(error = %e, "Logout failed");
    }

    let stats = result.context("Event watch failed")?;
    info!(
        batches = stats.batches,
        changes = stats.changes,
        resyncs = stats.resyncs,
        "Event tail stopped"
    );
    Ok(())
}

/// Login originator, identifying this tool and host to the server.
fn originator() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    format!("xenlink-watch@{}", host)
}

/// In-memory server seeded with a host and a few VMs, plus a background
/// task that keeps changing them.
fn demo_server() -> Result<Arc<dyn Transport>> {
    let server = Arc::new(MockServer::new());

    let host = server.create_object(
        "host",
        [
            ("name_label", WireValue::from("demo-host")),
            ("enabled", WireValue::Bool(true)),
        ],
    )?;
    let mut vms = Vec::new();
    for name in ["web-01", "web-02", "db-01"] {
        vms.push(server.create_object(
            "VM",
            [
                ("name_label", WireValue::from(name)),
                ("power_state", WireValue::from("Halted")),
                ("resident_on", WireValue::from(xenlink_client::NULL_REF)),
            ],
        )?);
    }

    let background = server.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DEMO_INTERVAL);
        let mut round = 0usize;
        loop {
            ticker.tick().await;
            round += 1;
            let vm = &vms[round % vms.len()];
            let (state, resident_on) = if round % 2 == 0 {
                ("Halted", xenlink_client::NULL_REF)
            } else {
                ("Running", host.as_str())
            };
            let changed = background
                .set_field(vm, "power_state", WireValue::from(state))
                .and_then(|_| background.set_field(vm, "resident_on", WireValue::from(resident_on)));
            if let Err(e) = changed {
                warn!(error = %e, "Demo activity failed");
                return;
            }
        }
    });

    Ok(server)
}
