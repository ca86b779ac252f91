//! proctor_replay - offline run of the detector pipeline
//!
//! Opens the configured camera (a `stub://` device by default), streams N frames
//! through the detectors and the session without any HTTP, then prints the
//! detection counts and the end-of-session report as JSON.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use proctor_monitor::{DetectorRegistry, Monitor, MonitorConfig};

#[derive(Parser, Debug)]
#[command(
    name = "proctor_replay",
    version,
    about = "Run camera frames through the detector pipeline and print the session report"
)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "PROCTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Number of frames to process.
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Seed for the synthetic detector backends.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Also print the counts snapshot (with the recent event window).
    #[arg(long)]
    counts: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config = MonitorConfig::load_from(args.config.as_deref())?;
    let monitor = Monitor::new(config, DetectorRegistry::synthetic(args.seed));

    let mut driver = monitor.open_stream()?;
    let mut streamed = 0u64;
    while streamed < args.frames {
        match driver.next() {
            Some(chunk) if !chunk.is_empty() => streamed += 1,
            _ => break,
        }
    }
    if let Some(end) = driver.ended() {
        return Err(anyhow!("stream ended after {} frames: {:?}", streamed, end));
    }
    drop(driver);

    if args.counts {
        let counts = monitor.detection_counts()?;
        println!("{}", serde_json::to_string_pretty(&counts)?);
    }
    let report = monitor.end_session()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
