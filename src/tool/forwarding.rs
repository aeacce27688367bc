//! Device forwarding capability.

use super::ToolId;
use crate::device::{DeviceId, Feature};
use std::collections::HashMap;

/// Capability of a tool that re-exposes its bound features on further devices.
///
/// All methods are pure queries against the tool's current state.
pub trait DeviceForwarder {
    /// Devices this tool forwards features onto.
    fn forwarded_devices(&self) -> Vec<DeviceId>;

    /// Features that `source` (one of the tool's bound features) is forwarded to.
    fn forwarded_features(&self, source: Feature) -> Vec<Feature>;

    /// Bound features feeding the forwarded feature `forwarded`.
    fn source_features(&self, forwarded: Feature) -> Vec<Feature>;

    /// The device `forwarded` was derived from, if this tool forwards onto it.
    fn source_device(&self, forwarded: DeviceId) -> Option<DeviceId>;
}

/// Table-driven [`DeviceForwarder`] for tools with a static forwarding topology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardingMap {
    links: Vec<(Feature, Feature)>,
    devices: Vec<(DeviceId, DeviceId)>,
}

impl ForwardingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `forwarded` is a device derived from `source`.
    pub fn add_device(&mut self, forwarded: DeviceId, source: DeviceId) {
        if !self.devices.iter().any(|(f, _)| *f == forwarded) {
            self.devices.push((forwarded, source));
        }
    }

    /// Declares that `source` is forwarded to `forwarded`.
    pub fn link(&mut self, source: Feature, forwarded: Feature) {
        if !self.links.contains(&(source, forwarded)) {
            self.links.push((source, forwarded));
        }
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.devices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl DeviceForwarder for ForwardingMap {
    fn forwarded_devices(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|(forwarded, _)| *forwarded).collect()
    }

    fn forwarded_features(&self, source: Feature) -> Vec<Feature> {
        self.links
            .iter()
            .filter(|(s, _)| *s == source)
            .map(|(_, f)| *f)
            .collect()
    }

    fn source_features(&self, forwarded: Feature) -> Vec<Feature> {
        self.links
            .iter()
            .filter(|(_, f)| *f == forwarded)
            .map(|(s, _)| *s)
            .collect()
    }

    fn source_device(&self, forwarded: DeviceId) -> Option<DeviceId> {
        self.devices
            .iter()
            .find(|(f, _)| *f == forwarded)
            .map(|(_, source)| *source)
    }
}

/// Resolves the forwarding capability of tools by id.
pub trait ForwarderLookup {
    fn forwarder(&self, tool: ToolId) -> Option<&dyn DeviceForwarder>;
}

/// Lookup for graphs without any forwarding tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoForwarders;

impl ForwarderLookup for NoForwarders {
    fn forwarder(&self, _tool: ToolId) -> Option<&dyn DeviceForwarder> {
        None
    }
}

impl<F: DeviceForwarder> ForwarderLookup for HashMap<ToolId, F> {
    fn forwarder(&self, tool: ToolId) -> Option<&dyn DeviceForwarder> {
        self.get(&tool).map(|f| f as &dyn DeviceForwarder)
    }
}
