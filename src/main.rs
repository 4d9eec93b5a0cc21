//! serialosc-gw
//!
//! Bridge between a host application and a monome grid or arc via serialosc.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use serialosc_gw::bridge::Bridge;
use serialosc_gw::cli::{self, ConsoleCommand};
use serialosc_gw::config::{AppConfig, SettingsStore, SettingsWatcher};
use serialosc_gw::connection::Effect;
use serialosc_gw::endpoints::EndpointRegistry;
use serialosc_gw::transport::UdpTransport;

/// Pause between tearing down a cycle and starting the next
const RESTART_DELAY: Duration = Duration::from_millis(250);

/// serialosc-gw - connect a monome grid or arc through serialosc
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "serialosc-gw.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Disable the interactive console
    #[arg(long)]
    no_console: bool,
}

/// How an init cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleExit {
    Restart,
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting serialosc-gw...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load_or_default(&args.config).await?;
    let store = SettingsStore::new(&config.device.settings_file);
    store.ensure_exists().await?;

    let (console_tx, mut console_rx) = mpsc::channel(16);
    if args.no_console {
        drop(console_tx);
    } else {
        cli::spawn_console(console_tx)?;
    }

    // Every endpoint is fixed for the lifetime of a cycle; a restart
    // discards all state and builds everything again
    let mut cycle: u64 = 0;
    loop {
        cycle += 1;
        match run_cycle(cycle, &config, &store, &mut console_rx).await? {
            CycleExit::Restart => {
                info!("🔄 Restarting to apply new device port");
                tokio::time::sleep(RESTART_DELAY).await;
            }
            CycleExit::Shutdown => break,
        }
    }

    info!("serialosc-gw shutdown complete");
    Ok(())
}

async fn run_cycle(
    cycle: u64,
    config: &AppConfig,
    store: &SettingsStore,
    console_rx: &mut mpsc::Receiver<ConsoleCommand>,
) -> Result<CycleExit> {
    info!("Init cycle {}", cycle);

    let persisted = match store.load_raw_port().await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("{:#}; starting unbound", e);
            String::new()
        }
    };

    let (event_tx, mut event_rx) = mpsc::channel(1000);
    let mut registry = EndpointRegistry::new(UdpTransport::new(event_tx));
    let mut bridge = Bridge::init(config, &persisted, &mut registry);
    execute_effects(store, bridge.take_startup_effects()).await;

    let mut watcher = match SettingsWatcher::new(store.clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Device settings edits will not be picked up: {:#}", e);
            None
        }
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Ready to process serialosc events!");

    let exit = loop {
        let effects = tokio::select! {
            Some(event) = event_rx.recv() => bridge.handle_event(event),

            Some(raw) = next_edit(&mut watcher) => {
                info!("📝 Device settings changed: '{}'", raw);
                bridge.apply_port_edit(&raw)
            }

            Some(command) = console_rx.recv() => match command {
                ConsoleCommand::Detect => {
                    bridge.detect();
                    Vec::new()
                }
                ConsoleCommand::Status => {
                    cli::print_status(&bridge.status());
                    Vec::new()
                }
                ConsoleCommand::Port(raw) => bridge.apply_port_edit(&raw),
                ConsoleCommand::Quit => break CycleExit::Shutdown,
            },

            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break CycleExit::Shutdown;
            }
        };

        if let Some(exit) = execute_effects(store, effects).await {
            break exit;
        }
    };

    // Release the listener port before the next cycle binds it
    drop(watcher);
    drop(bridge);
    registry.into_transport().close().await;

    Ok(exit)
}

/// Run effects in order; persisting always completes before a restart
async fn execute_effects(store: &SettingsStore, effects: Vec<Effect>) -> Option<CycleExit> {
    for effect in effects {
        match effect {
            Effect::PersistPort(port) => {
                if let Err(e) = store.save_port(port).await {
                    error!("Failed to persist device port {}: {:#}", port, e);
                }
            }
            Effect::Restart => return Some(CycleExit::Restart),
        }
    }
    None
}

async fn next_edit(watcher: &mut Option<SettingsWatcher>) -> Option<String> {
    match watcher {
        Some(watcher) => watcher.next_edit().await,
        None => std::future::pending().await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
