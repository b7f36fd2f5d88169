//! hwgauge Control Tool
//!
//! Reads metrics straight from the local sensor provider.

mod format;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hwgauge_core::{
    keys, DeviceClass, HardwareMonitor, MonitorOptions, NullStore, Preferences, SysfsProvider,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Time between priming the counters and the first read, so rates are real.
const SETTLE_TIME: Duration = Duration::from_millis(1000);

#[derive(Parser)]
#[command(name = "hwgaugectl")]
#[command(about = "Query hardware metrics from the command line")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Pin the network adapter instead of auto-selecting
    #[arg(long, global = true)]
    network: Option<String>,

    /// Pin the disk instead of auto-selecting
    #[arg(long, global = true)]
    disk: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one or more metrics
    Get {
        /// Metric keys (e.g., CPU.Load NET.Down)
        #[arg(required = true)]
        keys: Vec<String>,

        /// Print raw values as JSON
        #[arg(long)]
        json: bool,
    },
    /// List devices of a class
    Devices {
        /// Device class: network, disk
        class: String,
    },
    /// List known metric keys and whether a sensor backs them
    Keys,
    /// Print metrics repeatedly until interrupted
    Watch {
        /// Sample interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval: u64,

        /// Metric keys (default: all)
        keys: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let monitor = open_monitor(cli.network.as_deref(), cli.disk.as_deref());

    match cli.command {
        Commands::Get { keys, json } => handle_get(&monitor, &keys, json).await,
        Commands::Devices { class } => handle_devices(&monitor, &class),
        Commands::Keys => handle_keys(&monitor).await,
        Commands::Watch { interval, keys } => handle_watch(monitor, interval, keys).await,
    }
}

fn open_monitor(network: Option<&str>, disk: Option<&str>) -> HardwareMonitor {
    let mut preferences = Preferences::default();
    preferences.set_preferred(DeviceClass::Network, network);
    preferences.set_preferred(DeviceClass::Disk, disk);

    let monitor = HardwareMonitor::new(Arc::new(SysfsProvider::new()), MonitorOptions::default())
        .with_preferences(preferences, Box::new(NullStore));
    if !monitor.is_available() {
        eprintln!("Warning: no sensor provider available; readings will be empty");
    }
    monitor
}

/// Waits for rate counters to accumulate, then takes one pass.
async fn settle(monitor: &HardwareMonitor) {
    tokio::time::sleep(SETTLE_TIME).await;
    monitor.update_all();
}

fn read(monitor: &HardwareMonitor, requested: &[String]) -> Vec<(String, Option<f32>)> {
    requested
        .iter()
        .map(|key| (key.clone(), monitor.get(key)))
        .collect()
}

async fn handle_get(monitor: &HardwareMonitor, requested: &[String], json: bool) -> Result<()> {
    settle(monitor).await;
    let values = read(monitor, requested);

    if json {
        let values: BTreeMap<String, Option<f32>> = values.into_iter().collect();
        let text = serde_json::to_string_pretty(&values).context("Failed to encode values")?;
        println!("{}", text);
    } else {
        let width = requested.iter().map(|k| k.len()).max().unwrap_or(0);
        for (key, value) in &values {
            println!("{:<width$}  {}", key, format::format_value(key, *value));
        }
    }

    Ok(())
}

fn handle_devices(monitor: &HardwareMonitor, class: &str) -> Result<()> {
    let class: DeviceClass = class
        .parse()
        .with_context(|| format!("Invalid device class: {}. Use: network, disk", class))?;

    let devices = monitor.list_devices(class);
    if devices.is_empty() {
        println!("No {} devices found", class);
        return Ok(());
    }

    let pinned = monitor.preferences().preferred(class).map(str::to_string);
    println!("{} devices:", class);
    for name in devices {
        let marker = match &pinned {
            Some(p) if p.eq_ignore_ascii_case(&name) => " (pinned)",
            _ => "",
        };
        println!("  {}{}", name, marker);
    }

    Ok(())
}

async fn handle_keys(monitor: &HardwareMonitor) -> Result<()> {
    settle(monitor).await;
    let mapped = monitor.mapped_keys();
    debug!("{} keys backed by classified sensors", mapped.len());

    println!("Metric keys:");
    for key in keys::ALL {
        let status = match monitor.get(key) {
            Some(_) => "available",
            None => "unavailable",
        };
        println!("  {:<16} {}", key, status);
    }

    Ok(())
}

async fn handle_watch(monitor: HardwareMonitor, interval: u64, requested: Vec<String>) -> Result<()> {
    if interval < 250 {
        anyhow::bail!("Interval must be at least 250 milliseconds");
    }
    let requested: Vec<String> = if requested.is_empty() {
        keys::ALL.iter().map(|k| k.to_string()).collect()
    } else {
        requested
    };
    let width = requested.iter().map(|k| k.len()).max().unwrap_or(0);

    tokio::time::sleep(SETTLE_TIME).await;
    let mut ticker = tokio::time::interval(Duration::from_millis(interval));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                monitor.update_all();
                println!("---");
                for (key, value) in read(&monitor, &requested) {
                    println!("{:<width$}  {}", key, format::format_value(&key, value));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}
