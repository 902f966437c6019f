use crate::force_feedback::RelayMode;
use crate::session::SessionConfig;
use crate::virtual_controller::DEFAULT_DEVICE_NAME;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILENAME: &str = "psxpad_config.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Advertise rumble on the virtual pad and relay it to the controller
    pub enable_force_feedback: bool,
    pub relay_mode: RelayMode,
    /// Wait for one input report before checking again
    pub poll_timeout_ms: u64,
    /// Upper bound on how long the relay takes to notice a stop request
    pub relay_wakeup_ms: u64,
    /// Name of the virtual gamepad
    pub device_name: String,
    /// Player LEDs lit on a PS3 pad while it rumbles
    pub ps3_led_mask: u8,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            enable_force_feedback: true,
            relay_mode: RelayMode::Effects,
            poll_timeout_ms: 5000,
            relay_wakeup_ms: 100,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            ps3_led_mask: 0x02,
        }
    }
}

impl DriverConfig {
    pub fn load() -> Option<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {:?}", path);
                        return Some(config);
                    }
                    Err(e) => {
                        log::error!("Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    log::error!("Failed to read config file: {}", e);
                }
            }
        }
        None
    }

    pub fn config_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILENAME)
    }

    pub fn session_config(&self) -> SessionConfig {
        let name = if self.device_name.trim().is_empty() {
            log::warn!("Empty device name in config, using {:?}", DEFAULT_DEVICE_NAME);
            DEFAULT_DEVICE_NAME.to_string()
        } else {
            self.device_name.clone()
        };

        SessionConfig {
            enable_force_feedback: self.enable_force_feedback,
            relay_mode: self.relay_mode,
            // Zero would make libusb wait forever
            poll_timeout: Duration::from_millis(self.poll_timeout_ms.max(1)),
            relay_wakeup: Duration::from_millis(self.relay_wakeup_ms.max(1)),
            device_name: name,
            ps3_led_mask: self.ps3_led_mask,
        }
    }
}
