//! proctord - proctoring monitor daemon
//!
//! This daemon:
//! 1. Loads configuration (file from --config / PROCTOR_CONFIG, then env overrides)
//! 2. Registers the detector backends
//! 3. Serves the MJPEG stream and the JSON API until Ctrl-C

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use proctor_monitor::{ApiServer, DetectorRegistry, Monitor, MonitorConfig, MouthCounting};

#[derive(Parser, Debug)]
#[command(
    name = "proctord",
    version,
    about = "Proctoring monitor: detector pipeline, MJPEG stream and session API"
)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "PROCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address; overrides api.addr.
    #[arg(long)]
    addr: Option<String>,

    /// Seed for the synthetic detector backends.
    #[arg(long, default_value_t = 0)]
    detector_seed: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let mut config = MonitorConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.api.addr = addr;
    }

    if config.session.rules.mouth_counting == MouthCounting::LegacyDouble {
        log::warn!(
            "mouth counting mode is legacy_double: frames with an open mouth above {:.2} confidence count twice",
            config.session.rules.mouth_confidence_threshold
        );
    }

    let registry = DetectorRegistry::synthetic(args.detector_seed);
    registry.warm_up()?;
    for (capability, name) in registry.list() {
        log::info!("detector {}: {}", capability, name);
    }
    for capability in registry.missing() {
        log::warn!("no {} detector registered; its results stay absent", capability);
    }

    log::info!(
        "camera {} ({}x{} @ {} fps), history window {} of {}",
        config.camera.device,
        config.camera.width,
        config.camera.height,
        config.camera.target_fps,
        config.session.history_window,
        config.session.history_capacity
    );

    let api_config = config.api.clone();
    let monitor = Arc::new(Monitor::new(config, registry));
    let api_handle = ApiServer::new(api_config, monitor.clone()).spawn()?;
    log::info!("proctord running on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    let _ = rx.recv();
    log::info!("shutdown signal received, stopping streams and API server...");
    monitor.shutdown();
    api_handle.stop()?;

    Ok(())
}
