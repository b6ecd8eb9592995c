//! Persisted settings for the sampler
//!
//! This module provides:
//! - Configuration structs for the stream, mixer, delay, filter, compressor,
//!   scope display, and pad assignments
//! - TOML serialization with clamping on apply
//! - `ConfigManager` with factory-default fallback and corrupt-file backup
//! - Hot-reload support via a file system watcher

use crate::domain::dsp::{params, CompressorParams};
use crate::domain::mixer::{DRY_LEVEL_DEFAULT, WET_LEVEL_DEFAULT};
use crate::domain::pads::PAD_COUNT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Stream-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Audio buffer size in frames
    pub buffer_size: u32,

    /// Requested sample rate (the device may override it)
    pub sample_rate: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            buffer_size: 512,
            sample_rate: 44_100,
        }
    }
}

/// Dry/wet mix settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixSettings {
    pub dry_level: f32,
    pub wet_level: f32,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            dry_level: DRY_LEVEL_DEFAULT,
            wet_level: WET_LEVEL_DEFAULT,
        }
    }
}

/// Delay effect settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelaySettings {
    pub time_ms: f32,
    pub depth: f32,
    pub feedback: f32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            time_ms: params::DELAY_TIME_DEFAULT_MS,
            depth: params::DELAY_DEPTH_DEFAULT,
            feedback: params::DELAY_FEEDBACK_DEFAULT,
        }
    }
}

/// Low-pass filter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub enabled: bool,
    pub cutoff_hz: f32,
    pub q: f32,
    pub slew_hz_per_sec: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cutoff_hz: params::CUTOFF_DEFAULT_HZ,
            q: params::Q_DEFAULT,
            slew_hz_per_sec: params::SLEW_DEFAULT_HZ_PER_SEC,
        }
    }
}

/// Master compressor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorSettings {
    pub enabled: bool,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub hold_ms: f32,
    pub threshold_percent: f32,
    pub ratio: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        let defaults = CompressorParams::default();
        Self {
            enabled: defaults.enabled,
            attack_ms: defaults.attack_ms,
            release_ms: defaults.release_ms,
            hold_ms: defaults.hold_ms,
            threshold_percent: defaults.threshold_percent,
            ratio: defaults.ratio,
        }
    }
}

impl CompressorSettings {
    /// Convert to runtime parameters, clamped to their supported ranges.
    pub fn to_params(&self) -> CompressorParams {
        CompressorParams {
            attack_ms: self.attack_ms,
            release_ms: self.release_ms,
            hold_ms: self.hold_ms,
            threshold_percent: self.threshold_percent,
            ratio: self.ratio,
            enabled: self.enabled,
        }
        .clamped()
    }
}

/// Oscilloscope display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeSettings {
    pub horizontal_zoom: f32,
    pub vertical_scale: f32,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            horizontal_zoom: 8.0,
            vertical_scale: 2.0,
        }
    }
}

/// A pad slot assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PadSettings {
    pub path: PathBuf,
    #[serde(default = "default_pad_gain")]
    pub gain: f32,
}

fn default_pad_gain() -> f32 {
    1.0
}

/// Complete sampler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamboxConfig {
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub mix: MixSettings,
    #[serde(default)]
    pub delay: DelaySettings,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub compressor: CompressorSettings,
    #[serde(default)]
    pub scope: ScopeSettings,
    /// Pad assignments, at most [`PAD_COUNT`] entries are used
    #[serde(default)]
    pub pads: Vec<PadSettings>,
}

impl SamboxConfig {
    /// Copy with every tunable clamped to its supported range. Applied
    /// before any value reaches the audio path, so the mixer never sees an
    /// out-of-range parameter.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.mix.dry_level = self.mix.dry_level.clamp(0.0, 1.0);
        self.mix.wet_level = self.mix.wet_level.clamp(0.0, 1.0);
        self.delay.time_ms = self
            .delay
            .time_ms
            .clamp(params::DELAY_TIME_MIN_MS, params::DELAY_TIME_MAX_MS);
        self.delay.depth = self
            .delay
            .depth
            .clamp(params::DELAY_DEPTH_MIN, params::DELAY_DEPTH_MAX);
        self.delay.feedback = self
            .delay
            .feedback
            .clamp(params::DELAY_FEEDBACK_MIN, params::DELAY_FEEDBACK_MAX);
        self.filter.cutoff_hz = self
            .filter
            .cutoff_hz
            .clamp(params::CUTOFF_MIN_HZ, params::CUTOFF_MAX_HZ);
        self.filter.q = self.filter.q.clamp(params::Q_MIN, params::Q_MAX);
        self.filter.slew_hz_per_sec = self
            .filter
            .slew_hz_per_sec
            .clamp(params::SLEW_MIN_HZ_PER_SEC, params::SLEW_MAX_HZ_PER_SEC);

        let comp = self.compressor.to_params();
        self.compressor = CompressorSettings {
            enabled: comp.enabled,
            attack_ms: comp.attack_ms,
            release_ms: comp.release_ms,
            hold_ms: comp.hold_ms,
            threshold_percent: comp.threshold_percent,
            ratio: comp.ratio,
        };

        for pad in &mut self.pads {
            if !pad.gain.is_finite() {
                pad.gain = 1.0;
            }
            pad.gain = pad.gain.clamp(0.0, 1.0);
        }
        self.pads.truncate(PAD_COUNT);
        self
    }

    /// Load configuration from a TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to a TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Factory default configuration with no pads assigned
    pub fn factory_default() -> Self {
        Self::default()
    }
}

/// Manager for the main configuration file
///
/// Handles `~/.config/sambox/config.toml` with a factory-default fallback.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Platform configuration directory, e.g. `~/.config/sambox`.
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("sambox"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration.
    ///
    /// A missing file creates and returns the factory default; a corrupt
    /// file is backed up and replaced by the factory default so playback
    /// can always start.
    #[instrument(skip(self))]
    pub async fn load(&self) -> SamboxConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = SamboxConfig::factory_default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match SamboxConfig::load_from_file(&self.config_path).await {
            Ok(config) => {
                info!(
                    path = %self.config_path.display(),
                    "Configuration loaded successfully"
                );
                config
            }
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                SamboxConfig::factory_default()
            }
        }
    }

    /// Save the configuration
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &SamboxConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}

/// File system watcher for settings hot-reload
pub struct SettingsWatcher {
    _watcher: notify::RecommendedWatcher,
    reload_tx: broadcast::Sender<PathBuf>,
}

impl SettingsWatcher {
    /// Watch `config_dir` for TOML changes and broadcast the changed paths.
    pub async fn new(config_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (reload_tx, _reload_rx) = broadcast::channel(32);

        fs::create_dir_all(&config_dir).await?;

        let tx_clone = reload_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                            if let Err(e) = tx_clone.send(path) {
                                error!("Failed to send settings change event: {}", e);
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&config_dir, notify::RecursiveMode::NonRecursive)?;

        info!(path = %config_dir.display(), "Settings watcher started");

        Ok(Self {
            _watcher: watcher,
            reload_tx,
        })
    }

    /// Subscribe to settings change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.reload_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_toml_round_trip() {
        let mut config = SamboxConfig::factory_default();
        config.delay.time_ms = 333.0;
        config.pads.push(PadSettings {
            path: PathBuf::from("samples/kick.wav"),
            gain: 0.8,
        });

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: SamboxConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.delay.time_ms, 333.0);
        assert_eq!(parsed.stream.buffer_size, config.stream.buffer_size);
        assert_eq!(parsed.pads.len(), 1);
        assert_eq!(parsed.pads[0].gain, 0.8);
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let parsed: SamboxConfig = toml::from_str("[delay]\ntime_ms = 100.0\n").unwrap();
        assert_eq!(parsed.delay.time_ms, 100.0);
        assert_eq!(parsed.mix.dry_level, DRY_LEVEL_DEFAULT);
        assert_eq!(parsed.filter.cutoff_hz, params::CUTOFF_DEFAULT_HZ);
        assert!(parsed.pads.is_empty());
    }

    #[test]
    fn test_clamping() {
        let mut config = SamboxConfig::factory_default();
        config.mix.wet_level = 3.0;
        config.delay.feedback = 1.5;
        config.filter.cutoff_hz = 10.0;
        config.compressor.ratio = 0.0;
        for i in 0..10 {
            config.pads.push(PadSettings {
                path: PathBuf::from(format!("{i}.wav")),
                gain: 2.0,
            });
        }

        let clamped = config.clamped();
        assert_eq!(clamped.mix.wet_level, 1.0);
        assert_eq!(clamped.delay.feedback, params::DELAY_FEEDBACK_MAX);
        assert_eq!(clamped.filter.cutoff_hz, params::CUTOFF_MIN_HZ);
        assert_eq!(clamped.compressor.ratio, params::COMP_RATIO_MIN);
        assert_eq!(clamped.pads.len(), PAD_COUNT);
        assert!(clamped.pads.iter().all(|p| p.gain == 1.0));
    }

    #[test]
    fn test_compressor_settings_to_params() {
        let settings = CompressorSettings {
            enabled: false,
            attack_ms: 12.0,
            release_ms: 70.0,
            hold_ms: 12.0,
            threshold_percent: 18.0,
            ratio: 0.75,
        };
        let params = settings.to_params();
        assert!(!params.enabled);
        assert_eq!(params.attack_ms, 12.0);
        assert_eq!(params.ratio, 0.75);
    }

    #[tokio::test]
    async fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut config = SamboxConfig::factory_default();
        config.filter.cutoff_hz = 1_234.0;
        config.save_to_file(&config_path).await.unwrap();

        assert!(config_path.exists());

        let loaded = SamboxConfig::load_from_file(&config_path).await.unwrap();
        assert_eq!(loaded.filter.cutoff_hz, 1_234.0);
    }

    #[tokio::test]
    async fn test_manager_creates_factory_default() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());

        assert!(!manager.exists());
        let config = manager.load().await;
        assert_eq!(config.stream.sample_rate, 44_100);
        assert!(manager.exists());
    }

    #[tokio::test]
    async fn test_manager_backs_up_corrupt_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp_dir.path().to_path_buf());

        fs::create_dir_all(temp_dir.path()).await.unwrap();
        fs::write(manager.config_path(), "not = [valid").await.unwrap();

        let config = manager.load().await;
        assert_eq!(config.stream.buffer_size, 512);
        assert!(temp_dir.path().join("config.toml.corrupt").exists());
    }

    #[tokio::test]
    async fn test_settings_watcher_subscribes() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = SettingsWatcher::new(temp_dir.path().to_path_buf())
            .await
            .unwrap();
        let mut rx = watcher.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
