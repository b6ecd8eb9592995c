//! CPAL-based output device enumeration
//!
//! Lets the app list playback devices and their supported layouts before
//! the engine opens a stream.

use cpal::traits::{DeviceTrait, HostTrait};
use tracing::{debug, info, warn};

use sambox_core::domain::audio::{AudioError, OutputDeviceInfo, OutputEnumerator, Result};

fn device_info(device: &cpal::Device) -> Result<OutputDeviceInfo> {
    #[allow(deprecated)]
    let name = device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string());

    let mut sample_rates = Vec::new();
    let mut channel_counts = Vec::new();

    let configs = device
        .supported_output_configs()
        .map_err(|e| AudioError::UnsupportedConfiguration(e.to_string()))?;
    for config in configs {
        sample_rates.push(config.min_sample_rate());
        sample_rates.push(config.max_sample_rate());
        channel_counts.push(config.channels());
    }

    sample_rates.sort_unstable();
    sample_rates.dedup();
    channel_counts.sort_unstable();
    channel_counts.dedup();

    let default_sample_rate = device
        .default_output_config()
        .ok()
        .map(|config| config.sample_rate());

    debug!("Found output device: {}", name);

    Ok(OutputDeviceInfo {
        name,
        sample_rates,
        channel_counts,
        default_sample_rate,
    })
}

/// CPAL-based output enumerator
pub struct CpalEnumerator {
    host: cpal::Host,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        info!("Initializing CPAL enumerator");
        Self::new()
    }
}

impl CpalEnumerator {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }
}

impl OutputEnumerator for CpalEnumerator {
    fn output_devices(&self) -> Result<Vec<OutputDeviceInfo>> {
        let mut devices = Vec::new();

        let cpal_devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        for device in cpal_devices {
            match device_info(&device) {
                Ok(info) => devices.push(info),
                Err(e) => {
                    warn!("Skipping device due to error: {}", e);
                }
            }
        }

        info!("Found {} output devices", devices.len());
        Ok(devices)
    }

    fn default_output_device(&self) -> Result<OutputDeviceInfo> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))?;
        device_info(&device)
    }

    fn device_by_name(&self, name: &str) -> Result<OutputDeviceInfo> {
        let devices = self.output_devices()?;
        devices
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
    }
}
