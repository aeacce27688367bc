//! Device and feature identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a registered input device.
///
/// Identifiers are never reused within one [`DeviceRegistry`](super::DeviceRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub(crate) u32);

impl DeviceId {
    /// Returns the raw numeric value of this identifier.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Kind of a device feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Two-state control.
    Button,
    /// Continuous control in `[-1, 1]`.
    Valuator,
}

impl FeatureKind {
    /// Default name prefix used for unnamed features of this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            FeatureKind::Button => "Button",
            FeatureKind::Valuator => "Valuator",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One addressable button or valuator on a device.
///
/// A feature is a pure value reference; it owns nothing and stays valid to
/// compare even after its device was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Feature {
    pub device: DeviceId,
    pub kind: FeatureKind,
    /// Index within the features of the same kind on `device`.
    pub index: usize,
}

impl Feature {
    pub fn button(device: DeviceId, index: usize) -> Self {
        Self {
            device,
            kind: FeatureKind::Button,
            index,
        }
    }

    pub fn valuator(device: DeviceId, index: usize) -> Self {
        Self {
            device,
            kind: FeatureKind::Valuator,
            index,
        }
    }

    pub fn is_button(&self) -> bool {
        self.kind == FeatureKind::Button
    }

    pub fn is_valuator(&self) -> bool {
        self.kind == FeatureKind::Valuator
    }

    /// Flat index of this feature on its device, buttons first.
    pub fn slot_index(&self, num_buttons: usize) -> usize {
        match self.kind {
            FeatureKind::Button => self.index,
            FeatureKind::Valuator => num_buttons + self.index,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.device, self.kind, self.index)
    }
}

/// Value carried by a feature event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Button(bool),
    Valuator(f64),
}

/// A state change of one feature, queued for dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureEvent {
    pub feature: Feature,
    pub value: FeatureValue,
}

/// Position and orientation of a device in physical space.
///
/// Rotation is a unit quaternion stored as `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f64; 4],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        translation: [0.0; 3],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    pub fn from_translation(translation: [f64; 3]) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn identity_rotation() -> [f64; 4] {
    Transform::IDENTITY.rotation
}
