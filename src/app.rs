use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;

use crate::core::{
    alerts::notifier::{build_notifier, NotifierKind},
    config::ConfigManager,
    coordinator::Coordinator,
    log_io::FrameReader,
    replay_engine::{ReplayController, ReplayMode},
};

/// Replay a recorded perception log through the alert engine.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON-lines file with one frame record per line
    #[arg(long, value_name = "FILE")]
    pub frames: PathBuf,

    /// Directory holding settings.json
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub config_dir: PathBuf,

    /// Notification backend (overrides settings.json)
    #[arg(long, value_enum)]
    pub notifier: Option<NotifierKind>,

    /// Playback speed relative to the recorded timestamps; omit to run frames back to back
    #[arg(long, value_name = "FACTOR")]
    pub speed: Option<f64>,

    /// Write the effective settings back to settings.json
    #[arg(long)]
    pub save_config: bool,
}

pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config_manager = ConfigManager::new(args.config_dir.clone());
    let mut settings = config_manager.load();
    if let Some(kind) = args.notifier {
        settings.notifier = kind;
    }
    if args.save_config {
        config_manager
            .save(&settings)
            .with_context(|| format!("saving {:?}", config_manager.path()))?;
    }

    let mode = ReplayMode::from_speed(args.speed)
        .ok_or_else(|| anyhow!("--speed must be a positive number"))?;

    let notifier = build_notifier(settings.notifier)?;
    log::info!("Using {} notifier", notifier.name());
    let coordinator = Coordinator::from_settings(&settings, Arc::from(notifier));

    let reader = FrameReader::open(&args.frames).with_context(|| format!("opening {:?}", args.frames))?;
    let mut controller = ReplayController::new(reader, mode);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let summary = runtime.block_on(controller.run(&coordinator, |output| {
        for alert in &output.alerts {
            match serde_json::to_string(alert) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("Could not serialize alert: {}", e),
            }
        }
    }))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
