//! Kill zone: a spatial region where pressing a bound feature inspects its
//! tool stack and releasing it destroys the terminal tool.

use crate::config::KillZoneConfig;
use crate::device::InputDevice;
use std::fmt;

/// Geometric oracle deciding whether a device is inside the kill zone.
pub trait KillZone: fmt::Debug {
    fn is_device_in(&self, device: &InputDevice) -> bool;
}

/// Kill zone that contains nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKillZone;

impl KillZone for NoKillZone {
    fn is_device_in(&self, _device: &InputDevice) -> bool {
        false
    }
}

/// Axis-aligned box around `center`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxKillZone {
    pub center: [f64; 3],
    pub size: [f64; 3],
}

impl BoxKillZone {
    pub fn new(center: [f64; 3], size: [f64; 3]) -> Self {
        Self { center, size }
    }

    pub fn contains_point(&self, point: [f64; 3]) -> bool {
        (0..3).all(|axis| (point[axis] - self.center[axis]).abs() <= self.size[axis] * 0.5)
    }
}

impl KillZone for BoxKillZone {
    fn is_device_in(&self, device: &InputDevice) -> bool {
        self.contains_point(device.transform.translation)
    }
}

/// Builds the kill zone described by the configuration.
pub fn from_config(config: &KillZoneConfig) -> Box<dyn KillZone> {
    if config.enabled {
        Box::new(BoxKillZone::new(config.center, config.size))
    } else {
        Box::new(NoKillZone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_contains_points_within_half_extent() {
        let zone = BoxKillZone::new([0.0, 1.0, 0.0], [2.0, 2.0, 2.0]);
        assert!(zone.contains_point([0.5, 1.5, -1.0]));
        assert!(!zone.contains_point([1.5, 1.0, 0.0]));
    }

    #[test]
    fn disabled_config_builds_empty_zone() {
        let config = KillZoneConfig {
            enabled: false,
            ..KillZoneConfig::default()
        };
        let zone = from_config(&config);
        assert!(format!("{zone:?}").contains("NoKillZone"));
    }
}
