//! Sambox CLI application
//!
//! Starts the audio engine, loads the configured pad samples, and maps a
//! small stdin command set onto pad triggers and effect toggles. The
//! settings file is watched for edits and re-applied to the running engine.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use sambox_core::domain::config::{ConfigManager, SamboxConfig, SettingsWatcher};
use sambox_core::domain::pads::PAD_COUNT;
use sambox_infra::audio::{AudioEngine, EngineCommand};
use sambox_infra::sample::load_sample;

#[derive(Parser)]
#[command(name = "sambox")]
#[command(about = "A six-pad sampler and effects box", long_about = None)]
struct Cli {
    /// Configuration directory (defaults to the platform config dir)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!("Sambox starting...");

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => ConfigManager::default_config_dir().context("resolving config directory")?,
    };
    let manager = ConfigManager::new(config_dir.clone());
    let config = manager.load().await.clamped();

    // The stream handle stays on this task; control flows through commands
    let (engine, _scope) = AudioEngine::start(&config)?;
    load_pads(&engine, &config).await;

    let watcher = SettingsWatcher::new(config_dir).await?;
    let mut reload_rx = watcher.subscribe();

    println!("pads: 1-6 trigger, r <n> release, e/s on|off toggle effect/send, q quits");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = reload_rx.recv() => {
                if let Ok(path) = changed {
                    if path == manager.config_path() {
                        let reloaded = manager.load().await.clamped();
                        match engine.apply_settings(&reloaded) {
                            Ok(()) => info!("Settings reloaded"),
                            Err(e) => error!(error = %e, "Failed to apply reloaded settings"),
                        }
                    }
                }
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if handle_line(&engine, &config, line.trim()) {
                            break;
                        }
                    }
                    _ => break,
                }
            }
        }
    }

    info!("Sambox shutting down");
    Ok(())
}

/// Decode every configured pad sample and publish it to the engine.
async fn load_pads(engine: &AudioEngine, config: &SamboxConfig) {
    for (pad, settings) in config.pads.iter().enumerate().take(PAD_COUNT) {
        let path = settings.path.clone();
        let channels = engine.channels();
        let rate = engine.sample_rate();

        let decoded = tokio::task::spawn_blocking(move || load_sample(&path, channels, rate)).await;
        match decoded {
            Ok(Ok(sample)) => match engine.command(EngineCommand::LoadPad { pad, sample }) {
                Ok(()) => info!(pad, path = %settings.path.display(), "Pad loaded"),
                Err(e) => error!(pad, error = %e, "Failed to publish pad sample"),
            },
            Ok(Err(e)) => warn!(pad, path = %settings.path.display(), error = %e, "Failed to load pad sample"),
            Err(e) => error!(pad, error = %e, "Loader task failed"),
        }
    }
}

/// Handle one stdin command; returns true when the user quits.
fn handle_line(engine: &AudioEngine, config: &SamboxConfig, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let command = match parts.next() {
        Some(command) => command,
        None => return false,
    };

    let result = match command {
        "q" | "quit" => return true,
        "1" | "2" | "3" | "4" | "5" | "6" => {
            let pad = command.parse::<usize>().unwrap_or(1) - 1;
            let gain = config.pads.get(pad).map(|p| p.gain).unwrap_or(1.0);
            engine.command(EngineCommand::TriggerPad { pad, gain })
        }
        "r" => match parts.next().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if (1..=PAD_COUNT).contains(&n) => {
                engine.command(EngineCommand::ReleasePad { pad: n - 1 })
            }
            _ => {
                println!("usage: r <1-6>");
                return false;
            }
        },
        "e" => match parts.next() {
            Some("on") => engine.command(EngineCommand::SetEffectActive(true)),
            Some("off") => engine.command(EngineCommand::SetEffectActive(false)),
            _ => {
                println!("usage: e on|off");
                return false;
            }
        },
        "s" => match parts.next() {
            Some("on") => engine.command(EngineCommand::SetSendActive(true)),
            Some("off") => engine.command(EngineCommand::SetSendActive(false)),
            _ => {
                println!("usage: s on|off");
                return false;
            }
        },
        "stop" => engine.command(EngineCommand::StopAll),
        _ => {
            println!("unknown command: {line}");
            return false;
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
    }
    false
}
