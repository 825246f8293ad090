//! `zwbridge` – device-network to pub/sub bridge.
//!
//! This binary:
//!
//! 1. Initialises tracing (`RUST_LOG`, `ZWBRIDGE_LOG_FORMAT`,
//!    `OTEL_EXPORTER_OTLP_ENDPOINT`).
//! 2. Loads `~/.zwbridge/config.toml`, writing a default file on first run
//!    and falling back to defaults when the file cannot be read.
//! 3. Boots the simulated network described by `[[sim_nodes]]` and mirrors
//!    it onto the in-process bus, logging every bus operation.
//! 4. Intercepts **Ctrl-C** to stop routing, drain in-flight work and withdraw
//!    every published path before exiting.

mod config;

use colored::Colorize;
use std::sync::Arc;
use tokio::sync::{Notify, broadcast};
use tracing::{info, warn};

use zwbridge_middleware::{BusOp, LocalBus};
use zwbridge_runtime::Bridge;
use zwbridge_types::NetworkState;

fn main() {
    let _telemetry = zwbridge_runtime::telemetry::init_tracing("zwbridge");

    print_banner();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(Notify::new());
    let shutdown_handle = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!(
            "{}",
            "⚠  Ctrl-C received – withdrawing published paths …"
                .yellow()
                .bold()
        );
        shutdown_handle.notify_one();
    }) {
        warn!(
            error = %e,
            "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available"
        );
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    info!(
        base_path = %cfg.base_path,
        sim_nodes = cfg.sim_nodes.len(),
        "configuration"
    );
    let reserved = cfg.reserved_overrides();
    if !reserved.is_empty() {
        warn!(
            settings = ?reserved,
            "controller and broker settings are reserved; the simulated network ignores them"
        );
    }

    // ── Engine ────────────────────────────────────────────────────────────
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cfg, shutdown));

    println!("{}", "  ✓ Exiting zwbridge.".green());
}

/// Mirror the simulated network onto the local bus until `shutdown` fires.
async fn run(cfg: config::Config, shutdown: Arc<Notify>) {
    let bus = LocalBus::default();
    let topology = cfg.sim_topology();

    let mut bridge = Bridge::new(
        &cfg.bridge_config(),
        Arc::new(bus.clone()),
        Arc::new(topology.clone()),
    );
    topology.attach(Arc::new(bridge.notification_sender()));
    let printer = tokio::spawn(log_bus_ops(bus.subscribe()));

    bridge.start().await;
    // The simulated controller finishes its start-up once the bridge is up.
    topology.set_state(NetworkState::Ready);
    println!(
        "  Mirroring {} node(s) under {}",
        cfg.sim_nodes.len(),
        cfg.base_path.bold()
    );

    bridge.run(async move { shutdown.notified().await }).await;
    bridge.shutdown().await;
    printer.abort();
}

/// Log every bus operation until the bus goes away.
async fn log_bus_ops(mut ops: broadcast::Receiver<BusOp>) {
    loop {
        match ops.recv().await {
            Ok(op) => info!(path = op.path(), ?op, "bus"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "bus log lagging; operations skipped")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "zwbridge".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Device network ⇄ pub/sub bridge");
    println!();
}
