//! Layered device/tool dependency graph.
//!
//! Devices and tools are arranged in levels so that everything a tool depends
//! on is processed before the tool itself:
//!
//! - an ungrabbed device (or one grabbed by the framework) sits on level 0,
//! - a device grabbed by a tool sits one level above that tool,
//! - a tool sits on the highest level of any device it is bound to.
//!
//! Every structural edit re-runs [`InputGraphManager::maintain_levels`],
//! which moves devices and tools between levels until those rules hold.

mod forwarding;
mod levels;

pub use forwarding::ToolStackEntry;

use crate::device::{DeviceId, Feature, FeatureKind};
use crate::tool::{ToolId, ToolInputAssignment};
use levels::LevelLists;
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors from structural graph edits and feature validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("unknown input device {0}")]
    UnknownDevice(DeviceId),

    #[error("unknown tool {0}")]
    UnknownTool(ToolId),

    #[error("feature {0} does not exist")]
    InvalidFeature(Feature),

    #[error("feature {0} is already assigned to another tool")]
    SlotAlreadyAssigned(Feature),

    #[error("feature {0} appears twice in one assignment")]
    DuplicateFeature(Feature),

    #[error("tool {0} is already part of the input graph")]
    DuplicateTool(ToolId),
}

/// Who holds a grab on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grabber {
    /// The framework itself; the device stays on level 0.
    Framework,
    Tool(ToolId),
}

/// Binding record and transient interaction flags of one device feature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolSlot {
    pub(crate) bound_tool: Option<ToolId>,
    pub(crate) preempted: bool,
    pub(crate) in_kill_zone: bool,
    /// Emulated button state of a valuator slot.
    pub(crate) emulated_pressed: bool,
}

impl ToolSlot {
    pub fn bound_tool(&self) -> Option<ToolId> {
        self.bound_tool
    }

    pub fn is_preempted(&self) -> bool {
        self.preempted
    }

    pub fn in_kill_zone(&self) -> bool {
        self.in_kill_zone
    }
}

#[derive(Debug, Clone)]
struct GraphDevice {
    slots: Vec<ToolSlot>,
    num_buttons: usize,
    grabber: Option<Grabber>,
    navigational: bool,
}

impl GraphDevice {
    fn slot_index(&self, feature: Feature) -> Option<usize> {
        let limit = match feature.kind {
            FeatureKind::Button => self.num_buttons,
            FeatureKind::Valuator => self.slots.len() - self.num_buttons,
        };
        (feature.index < limit).then(|| feature.slot_index(self.num_buttons))
    }
}

#[derive(Debug, Clone)]
struct GraphTool {
    assignment: ToolInputAssignment,
}

/// The layered bipartite graph of input devices and tools.
#[derive(Debug, Clone, Default)]
pub struct InputGraphManager {
    devices: HashMap<DeviceId, GraphDevice>,
    tools: HashMap<ToolId, GraphTool>,
    device_levels: LevelLists<DeviceId>,
    tool_levels: LevelLists<ToolId>,
}

impl InputGraphManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device on level 0 with one empty slot per feature.
    ///
    /// Returns `false` if the device is already part of the graph.
    pub fn add_device(&mut self, id: DeviceId, num_buttons: usize, num_valuators: usize) -> bool {
        if self.devices.contains_key(&id) {
            return false;
        }
        self.devices.insert(
            id,
            GraphDevice {
                slots: vec![ToolSlot::default(); num_buttons + num_valuators],
                num_buttons,
                grabber: None,
                navigational: false,
            },
        );
        self.device_levels.push(0, id);
        true
    }

    /// Removes a device together with every tool bound to one of its features.
    ///
    /// Removed tools release all of their other bindings. Returns the removed
    /// tools, or `None` if the device is unknown.
    pub fn remove_device(&mut self, id: DeviceId) -> Option<Vec<ToolId>> {
        if !self.devices.contains_key(&id) {
            return None;
        }

        let cascaded = self.tools_on_device(id);
        for tool in &cascaded {
            debug!("Removing {} along with {}", tool, id);
            self.detach_tool(*tool);
        }

        self.devices.remove(&id);
        self.device_levels.unlink(id);
        self.maintain_levels();
        Some(cascaded)
    }

    /// Distinct tools bound to any feature of `device`, in slot order.
    pub fn tools_on_device(&self, device: DeviceId) -> Vec<ToolId> {
        let mut tools = Vec::new();
        if let Some(graph_device) = self.devices.get(&device) {
            for slot in &graph_device.slots {
                if let Some(tool) = slot.bound_tool {
                    if !tools.contains(&tool) {
                        tools.push(tool);
                    }
                }
            }
        }
        tools
    }

    /// Checks that `assignment` could be added without changing anything.
    pub fn validate_assignment(&self, assignment: &ToolInputAssignment) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for feature in assignment.features() {
            let slot = self.slot(feature)?;
            if !seen.insert(feature) {
                return Err(GraphError::DuplicateFeature(feature));
            }
            if slot.bound_tool.is_some() {
                return Err(GraphError::SlotAlreadyAssigned(feature));
            }
        }
        Ok(())
    }

    /// Inserts a tool and binds every feature of its assignment to it.
    ///
    /// Fails without any change if a feature is unknown or already bound.
    /// Returns the level the tool was placed on.
    pub fn add_tool(
        &mut self,
        id: ToolId,
        assignment: ToolInputAssignment,
    ) -> Result<usize, GraphError> {
        if self.tools.contains_key(&id) {
            return Err(GraphError::DuplicateTool(id));
        }
        self.validate_assignment(&assignment)?;

        let level = self.required_tool_level(&assignment);
        for feature in assignment.features() {
            if let Some(slot) = self.slot_entry(feature) {
                slot.bound_tool = Some(id);
            }
        }
        self.tools.insert(id, GraphTool { assignment });
        self.tool_levels.push(level, id);
        self.maintain_levels();
        Ok(self.tool_level(id).unwrap_or(level))
    }

    /// Unbinds and removes a tool; devices it grabbed are released.
    pub fn remove_tool(&mut self, id: ToolId) -> Option<ToolInputAssignment> {
        let assignment = self.detach_tool(id)?;
        self.maintain_levels();
        Some(assignment)
    }

    fn detach_tool(&mut self, id: ToolId) -> Option<ToolInputAssignment> {
        let tool = self.tools.remove(&id)?;
        for feature in tool.assignment.features() {
            if let Some(slot) = self.slot_entry(feature) {
                slot.bound_tool = None;
            }
        }
        self.tool_levels.unlink(id);

        for (device_id, device) in self.devices.iter_mut() {
            if device.grabber == Some(Grabber::Tool(id)) {
                warn!("{} was still grabbed by removed {}; releasing", device_id, id);
                device.grabber = None;
            }
        }
        Some(tool.assignment)
    }

    /// Grabs `device` on behalf of `grabber`.
    ///
    /// Returns `false` without changes if the device is unknown, already
    /// grabbed, or if the grabbing tool itself depends on the device.
    pub fn grab(&mut self, device: DeviceId, grabber: Grabber) -> bool {
        let Some(graph_device) = self.devices.get(&device) else {
            return false;
        };
        if graph_device.grabber.is_some() {
            return false;
        }
        if let Grabber::Tool(tool) = grabber {
            if !self.tools.contains_key(&tool) {
                return false;
            }
            if self.tool_depends_on(tool, device) {
                warn!("Refusing grab of {} by {}: dependency cycle", device, tool);
                return false;
            }
        }

        if let Some(graph_device) = self.devices.get_mut(&device) {
            graph_device.grabber = Some(grabber);
        }
        self.maintain_levels();
        true
    }

    /// Releases a grab held by `grabber`; a no-op for any other grabber.
    pub fn release(&mut self, device: DeviceId, grabber: Grabber) -> bool {
        match self.devices.get_mut(&device) {
            Some(graph_device) if graph_device.grabber == Some(grabber) => {
                graph_device.grabber = None;
            }
            _ => return false,
        }
        self.maintain_levels();
        true
    }

    /// Whether `tool` is bound, directly or through grabbed devices, to `device`.
    fn tool_depends_on(&self, tool: ToolId, device: DeviceId) -> bool {
        let mut visited_tools = HashSet::new();
        let mut stack = vec![tool];
        while let Some(current) = stack.pop() {
            if !visited_tools.insert(current) {
                continue;
            }
            let Some(graph_tool) = self.tools.get(&current) else {
                continue;
            };
            for feature in graph_tool.assignment.features() {
                if feature.device == device {
                    return true;
                }
                if let Some(Grabber::Tool(owner)) = self.grabber(feature.device) {
                    stack.push(owner);
                }
            }
        }
        false
    }

    /// Restores the level invariants after a structural edit.
    ///
    /// Sweeps all levels bottom-up, relinking any device or tool whose level
    /// is wrong, and repeats until a sweep moves nothing. Returns the number
    /// of moves performed; calling it again right away returns 0.
    pub fn maintain_levels(&mut self) -> usize {
        let max_sweeps = self.devices.len() + self.tools.len() + 1;
        let mut total = 0;
        for _ in 0..max_sweeps {
            let moves = self.sweep_levels();
            total += moves;
            if moves == 0 {
                break;
            }
        }
        self.device_levels.shrink();
        self.tool_levels.shrink();

        assert!(
            self.levels_consistent(),
            "level maintenance left the input graph inconsistent"
        );
        total
    }

    fn sweep_levels(&mut self) -> usize {
        let mut moves = 0;
        let mut level = 0;
        while level < self.num_levels() {
            for device in self.device_levels.keys_at(level) {
                let correct = self.required_device_level(device);
                if correct != level {
                    self.device_levels.relink(device, correct);
                    moves += 1;
                }
            }
            for tool in self.tool_levels.keys_at(level) {
                let correct = self
                    .tools
                    .get(&tool)
                    .map_or(0, |graph_tool| self.required_tool_level(&graph_tool.assignment));
                if correct != level {
                    self.tool_levels.relink(tool, correct);
                    moves += 1;
                }
            }
            level += 1;
        }
        moves
    }

    fn required_device_level(&self, device: DeviceId) -> usize {
        match self.grabber(device) {
            Some(Grabber::Tool(tool)) => self.tool_level(tool).map_or(0, |level| level + 1),
            Some(Grabber::Framework) | None => 0,
        }
    }

    fn required_tool_level(&self, assignment: &ToolInputAssignment) -> usize {
        assignment
            .features()
            .filter_map(|feature| self.device_level(feature.device))
            .max()
            .unwrap_or(0)
    }

    /// Checks every level rule against the current graph.
    pub fn levels_consistent(&self) -> bool {
        let devices_ok = self.devices.keys().all(|device| {
            self.device_level(*device) == Some(self.required_device_level(*device))
        });
        let tools_ok = self.tools.iter().all(|(id, tool)| {
            self.tool_level(*id) == Some(self.required_tool_level(&tool.assignment))
        });
        devices_ok && tools_ok
    }

    /// Number of levels in use.
    pub fn num_levels(&self) -> usize {
        self.device_levels
            .num_levels()
            .max(self.tool_levels.num_levels())
    }

    pub fn devices_at(&self, level: usize) -> Vec<DeviceId> {
        self.device_levels.keys_at(level)
    }

    pub fn tools_at(&self, level: usize) -> Vec<ToolId> {
        self.tool_levels.keys_at(level)
    }

    /// All tools, lowest level first.
    pub fn tools_by_level(&self) -> Vec<ToolId> {
        (0..self.num_levels())
            .flat_map(|level| self.tool_levels.keys_at(level))
            .collect()
    }

    pub fn device_level(&self, device: DeviceId) -> Option<usize> {
        self.device_levels.level_of(device)
    }

    pub fn tool_level(&self, tool: ToolId) -> Option<usize> {
        self.tool_levels.level_of(tool)
    }

    pub fn contains_device(&self, device: DeviceId) -> bool {
        self.devices.contains_key(&device)
    }

    pub fn contains_tool(&self, tool: ToolId) -> bool {
        self.tools.contains_key(&tool)
    }

    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    pub fn num_tools(&self) -> usize {
        self.tools.len()
    }

    pub fn grabber(&self, device: DeviceId) -> Option<Grabber> {
        self.devices.get(&device).and_then(|d| d.grabber)
    }

    pub fn is_grabbed(&self, device: DeviceId) -> bool {
        self.grabber(device).is_some()
    }

    pub fn set_navigational(&mut self, device: DeviceId, navigational: bool) -> bool {
        match self.devices.get_mut(&device) {
            Some(graph_device) => {
                graph_device.navigational = navigational;
                true
            }
            None => false,
        }
    }

    pub fn is_navigational(&self, device: DeviceId) -> bool {
        self.devices.get(&device).is_some_and(|d| d.navigational)
    }

    pub fn assignment(&self, tool: ToolId) -> Option<&ToolInputAssignment> {
        self.tools.get(&tool).map(|graph_tool| &graph_tool.assignment)
    }

    pub fn bound_tool(&self, feature: Feature) -> Option<ToolId> {
        self.slot(feature).ok().and_then(|slot| slot.bound_tool)
    }

    /// The slot record for `feature`.
    pub fn slot(&self, feature: Feature) -> Result<&ToolSlot, GraphError> {
        let device = self
            .devices
            .get(&feature.device)
            .ok_or(GraphError::UnknownDevice(feature.device))?;
        device
            .slot_index(feature)
            .and_then(|index| device.slots.get(index))
            .ok_or(GraphError::InvalidFeature(feature))
    }

    pub(crate) fn slot_entry(&mut self, feature: Feature) -> Option<&mut ToolSlot> {
        let device = self.devices.get_mut(&feature.device)?;
        let index = device.slot_index(feature)?;
        device.slots.get_mut(index)
    }
}

#[cfg(test)]
mod tests;
