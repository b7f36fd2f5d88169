//! hwgauge daemon
//!
//! Samples the hardware monitor on a fixed interval, persists preferences and
//! daily traffic in the state directory and optionally writes a JSON snapshot.

mod config;
mod snapshot;
mod state;
mod traffic;

use anyhow::{Context, Result};
use chrono::Local;
use hwgauge_core::keys::Channel;
use hwgauge_core::{DeviceClass, HardwareMonitor, SysfsProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use snapshot::Snapshot;
use state::StateStore;
use traffic::TrafficLog;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = if std::path::Path::new(&config_path).exists() {
        let config = Config::load(&config_path).context("Failed to load configuration")?;
        info!("Loaded configuration from: {}", config_path);
        config
    } else {
        let config = Config::default();
        match config.save(&config_path) {
            Ok(()) => info!("Wrote default configuration to: {}", config_path),
            Err(e) => warn!("Using default configuration: {:#}", e),
        }
        config
    };

    // Restore persisted state; configured overrides win
    let state_dir = PathBuf::from(&config.state_dir);
    let store = StateStore::new(&state_dir);
    let mut preferences = store.load();
    for (class, name) in [
        (DeviceClass::Network, &config.devices.network),
        (DeviceClass::Disk, &config.devices.disk),
    ] {
        if !name.trim().is_empty() {
            preferences.set_preferred(class, Some(name.as_str()));
        }
    }

    let traffic = Arc::new(TrafficLog::load(&state_dir));
    let monitor = Arc::new(
        HardwareMonitor::new(Arc::new(SysfsProvider::new()), config.monitor_options())
            .with_preferences(preferences, Box::new(store))
            .with_traffic(traffic.clone()),
    );
    for class in [DeviceClass::Network, DeviceClass::Disk] {
        info!("{} devices: {:?}", class, monitor.list_devices(class));
    }

    // Start sample loop
    let sample_monitor = monitor.clone();
    let sample_traffic = traffic.clone();
    let sample_config = config.clone();
    let sampler = tokio::spawn(async move {
        sample_loop(sample_monitor, sample_traffic, sample_config).await;
    });

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    sampler.abort();
    if let Err(e) = traffic.flush() {
        warn!("Failed to save traffic totals: {:#}", e);
    }
    if let Err(e) = monitor.save_preferences() {
        warn!("Failed to save preferences: {}", e);
    }

    Ok(())
}

async fn sample_loop(monitor: Arc<HardwareMonitor>, traffic: Arc<TrafficLog>, config: Config) {
    let mut interval = tokio::time::interval(Duration::from_millis(config.poll.max(100)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let flush_interval = Duration::from_secs(config.traffic.flush_secs);
    let snapshot_path = config.output.snapshot.clone().map(PathBuf::from);
    let metric_keys = Arc::new(config.output.keys.clone());

    let mut last_flush = Instant::now();
    let mut consecutive_errors: u32 = 0;
    let mut last_error_log = Instant::now();

    loop {
        interval.tick().await;

        let result = sample_once(&monitor, &traffic, &metric_keys, snapshot_path.as_ref()).await;
        if let Err(e) = result {
            consecutive_errors += 1;
            // Only log errors once per minute or on first error
            let elapsed = last_error_log.elapsed();
            if consecutive_errors == 1 || elapsed >= Duration::from_secs(60) {
                if consecutive_errors > 1 {
                    warn!(
                        "Sample error (repeated {} times in {:?}): {:#}",
                        consecutive_errors, elapsed, e
                    );
                } else {
                    warn!("Sample error: {:#}", e);
                }
                last_error_log = Instant::now();
                consecutive_errors = 0;
            }
        } else {
            consecutive_errors = 0;
        }

        if last_flush.elapsed() >= flush_interval {
            if let Err(e) = traffic.flush() {
                warn!("Failed to save traffic totals: {:#}", e);
            }
            last_flush = Instant::now();
        }
    }
}

/// Runs one refresh-and-read pass off the async runtime.
async fn sample_once(
    monitor: &Arc<HardwareMonitor>,
    traffic: &Arc<TrafficLog>,
    metric_keys: &Arc<Vec<String>>,
    snapshot_path: Option<&PathBuf>,
) -> Result<()> {
    let monitor = monitor.clone();
    let traffic = traffic.clone();
    let metric_keys = metric_keys.clone();
    let snapshot_path = snapshot_path.cloned();

    tokio::task::spawn_blocking(move || {
        let snapshot = Snapshot::sample(&monitor, &metric_keys);
        traffic.record(
            monitor.live_rate(DeviceClass::Network, Channel::Up),
            monitor.live_rate(DeviceClass::Network, Channel::Down),
            Instant::now(),
            Local::now().date_naive(),
        );
        match snapshot_path {
            Some(path) => snapshot.write(&path),
            None => Ok(()),
        }
    })
    .await
    .context("Sampler task failed")?
}
