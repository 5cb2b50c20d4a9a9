use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "spindle", about = "Local music player", version)]
pub struct Args {
    /// Directory to scan for audio files (prompted for when omitted)
    pub root: Option<PathBuf>,

    /// Output device name (substring match, case-insensitive)
    #[arg(short, long)]
    pub device: Option<String>,

    /// List available output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Seconds of audio buffered per block
    #[arg(long, default_value_t = 0.5)]
    pub fill_window_seconds: f32,

    /// Fill thread poll interval in milliseconds
    #[arg(long, default_value_t = 25)]
    pub fill_poll_ms: u64,

    /// Watchdog interval in milliseconds
    #[arg(long, default_value_t = 500)]
    pub watchdog_ms: u64,
}

impl Args {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            fill_window_seconds: self.fill_window_seconds,
            fill_poll: Duration::from_millis(self.fill_poll_ms),
            watchdog_interval: Duration::from_millis(self.watchdog_ms),
            ..EngineConfig::default()
        }
    }
}
