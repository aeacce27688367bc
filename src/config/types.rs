//! Configuration type definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Valuator handling.
///
/// Valuators bound into tool slots behave as emulated buttons. The two
/// thresholds form a hysteresis band so a trigger resting near the press
/// point does not chatter.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InputConfig {
    /// Absolute value at which a valuator reports an emulated press
    /// (valid range: 0.05 - 1.0)
    #[serde(default = "default_press_threshold")]
    pub valuator_press_threshold: f64,

    /// Absolute value below which a pressed valuator reports an emulated
    /// release (valid range: 0.0 - press threshold)
    #[serde(default = "default_release_threshold")]
    pub valuator_release_threshold: f64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            valuator_press_threshold: default_press_threshold(),
            valuator_release_threshold: default_release_threshold(),
        }
    }
}

/// Axis-aligned box in which pressing a bound feature destroys its tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KillZoneConfig {
    /// Disable to never destroy tools by gesture
    #[serde(default = "default_kill_zone_enabled")]
    pub enabled: bool,

    /// Box center in physical coordinates `[x, y, z]`
    #[serde(default = "default_kill_zone_center")]
    pub center: [f64; 3],

    /// Box edge lengths `[x, y, z]` (each component must be non-negative)
    #[serde(default = "default_kill_zone_size")]
    pub size: [f64; 3],
}

impl Default for KillZoneConfig {
    fn default() -> Self {
        Self {
            enabled: default_kill_zone_enabled(),
            center: default_kill_zone_center(),
            size: default_kill_zone_size(),
        }
    }
}

/// Where the input graph is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BindingsConfig {
    /// Binding file loaded at startup, if any
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Write the graph back to `file` when the session ends
    #[serde(default)]
    pub save_on_exit: bool,
}

/// A physical device to register at startup.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceConfig {
    /// Stable device name, referenced by saved bindings
    pub name: String,

    #[serde(default)]
    pub buttons: usize,

    #[serde(default)]
    pub valuators: usize,

    /// Custom button names; missing entries fall back to `ButtonN`
    #[serde(default)]
    pub button_names: Vec<String>,

    /// Custom valuator names; missing entries fall back to `ValuatorN`
    #[serde(default)]
    pub valuator_names: Vec<String>,

    /// Initial device position `[x, y, z]`
    #[serde(default)]
    pub position: [f64; 3],
}

fn default_press_threshold() -> f64 {
    0.25
}

fn default_release_threshold() -> f64 {
    0.1
}

fn default_kill_zone_enabled() -> bool {
    true
}

fn default_kill_zone_center() -> [f64; 3] {
    [0.0, 0.0, -2.0]
}

fn default_kill_zone_size() -> [f64; 3] {
    [0.5, 0.5, 0.5]
}
