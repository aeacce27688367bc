//! Configuration file support for toolgraph.
//!
//! This module handles loading and validating user settings from the configuration file
//! located at `~/.config/toolgraph/config.toml`. Settings include valuator thresholds,
//! the kill zone, the binding file and the physical devices to register.
//!
//! If no config file exists, sensible defaults are used automatically.

pub mod types;

pub use types::{BindingsConfig, DeviceConfig, InputConfig, KillZoneConfig};

use crate::device::{DeviceSpec, Transform};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure containing all user settings.
///
/// All fields have sensible defaults and will use those if not specified in the config file.
///
/// # Example TOML
/// ```toml
/// [input]
/// valuator_press_threshold = 0.25
/// valuator_release_threshold = 0.1
///
/// [kill_zone]
/// enabled = true
/// center = [0.0, 0.0, -2.0]
/// size = [0.5, 0.5, 0.5]
///
/// [bindings]
/// file = "/home/user/.local/share/toolgraph/bindings.toml"
///
/// [[devices]]
/// name = "wand"
/// buttons = 3
/// valuators = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// Valuator thresholds
    #[serde(default)]
    pub input: InputConfig,

    /// Tool destruction gesture volume
    #[serde(default)]
    pub kill_zone: KillZoneConfig,

    /// Input graph persistence
    #[serde(default)]
    pub bindings: BindingsConfig,

    /// Physical devices registered at startup
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Validates and clamps all configuration values to acceptable ranges.
    ///
    /// Validated ranges:
    /// - `valuator_press_threshold`: 0.05 - 1.0
    /// - `valuator_release_threshold`: 0.0 - press threshold
    /// - `kill_zone.size`: each component >= 0.0
    ///
    /// Devices without a name, or repeating an earlier name, are dropped.
    fn validate_and_clamp(&mut self) {
        // Press threshold: 0.05 - 1.0
        if !(0.05..=1.0).contains(&self.input.valuator_press_threshold) {
            warn!(
                "Invalid valuator_press_threshold {:.3}, clamping to 0.05-1.0 range",
                self.input.valuator_press_threshold
            );
            self.input.valuator_press_threshold =
                self.input.valuator_press_threshold.clamp(0.05, 1.0);
        }

        // Release threshold must sit below the press threshold
        let press = self.input.valuator_press_threshold;
        if !(0.0..=press).contains(&self.input.valuator_release_threshold) {
            warn!(
                "Invalid valuator_release_threshold {:.3}, clamping to 0.0-{:.3} range",
                self.input.valuator_release_threshold, press
            );
            self.input.valuator_release_threshold =
                self.input.valuator_release_threshold.clamp(0.0, press);
        }

        for i in 0..3 {
            if self.kill_zone.size[i] < 0.0 || self.kill_zone.size[i].is_nan() {
                warn!(
                    "Invalid kill_zone.size[{}] = {:.3}, clamping to 0.0",
                    i, self.kill_zone.size[i]
                );
                self.kill_zone.size[i] = 0.0;
            }
        }

        let mut seen = std::collections::HashSet::new();
        self.devices.retain(|device| {
            if device.name.trim().is_empty() {
                warn!("Ignoring device entry without a name");
                return false;
            }
            if !seen.insert(device.name.clone()) {
                warn!("Ignoring duplicate device entry '{}'", device.name);
                return false;
            }
            true
        });
    }

    /// Returns the path to the configuration file.
    ///
    /// The config file is located at `~/.config/toolgraph/config.toml`.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined (e.g., HOME not set).
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("toolgraph");

        Ok(config_dir.join("config.toml"))
    }

    /// Loads configuration from the default location, or returns defaults if not found.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Loads configuration from `config_path`, or returns defaults if the file is missing.
    ///
    /// All loaded values are validated and clamped to acceptable ranges.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file exists but cannot be read
    /// - The file exists but contains invalid TOML syntax
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found, using defaults");
            debug!("Expected config at: {}", config_path.display());
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

        config.validate_and_clamp();

        info!("Loaded config from {}", config_path.display());
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Saves the current configuration to `config_path`.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let config_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, config_str)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        info!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Creates a default configuration file with documentation comments.
    ///
    /// Writes the example config from `config.example.toml` to `config_path`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A config file already exists at the target path
    /// - The config directory cannot be created
    /// - The file cannot be written
    pub fn create_default_file(config_path: &Path) -> Result<()> {
        if config_path.exists() {
            return Err(anyhow::anyhow!(
                "Config file already exists at {}",
                config_path.display()
            ));
        }

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(config_path, EXAMPLE_CONFIG)?;

        info!("Created default config at {}", config_path.display());
        Ok(())
    }

    /// JSON schema of the configuration file.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Config)
    }
}

const EXAMPLE_CONFIG: &str = include_str!("../../config.example.toml");

impl DeviceConfig {
    /// Registration parameters for this device.
    pub fn to_spec(&self) -> DeviceSpec {
        DeviceSpec::new(self.name.clone(), self.buttons, self.valuators)
            .with_button_names(self.button_names.iter().cloned())
            .with_valuator_names(self.valuator_names.iter().cloned())
            .with_transform(Transform::from_translation(self.position))
    }
}
