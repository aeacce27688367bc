//! Handles given to tools while they run.

use super::queue::ToolManagementQueueItem;
use crate::device::{DeviceId, DeviceOrigin, DeviceRegistry, DeviceSpec, Feature};
use crate::graph::{GraphError, Grabber, InputGraphManager};
use crate::tool::ToolId;
use std::collections::VecDeque;

/// Structural access granted to a tool during `initialize`/`deinitialize`.
///
/// Device removal is deferred until the hook returns, so the manager can
/// cascade it through every tool bound to the removed device.
pub struct ToolContext<'a> {
    tool: ToolId,
    devices: &'a mut DeviceRegistry,
    graph: &'a mut InputGraphManager,
    removals: &'a mut Vec<DeviceId>,
}

impl<'a> ToolContext<'a> {
    pub(crate) fn new(
        tool: ToolId,
        devices: &'a mut DeviceRegistry,
        graph: &'a mut InputGraphManager,
        removals: &'a mut Vec<DeviceId>,
    ) -> Self {
        Self {
            tool,
            devices,
            graph,
            removals,
        }
    }

    pub fn tool_id(&self) -> ToolId {
        self.tool
    }

    pub fn devices(&self) -> &DeviceRegistry {
        self.devices
    }

    pub fn graph(&self) -> &InputGraphManager {
        self.graph
    }

    /// Registers a virtual device owned by the calling tool.
    pub fn create_forwarded_device(&mut self, spec: DeviceSpec) -> DeviceId {
        let (buttons, valuators) = (spec.num_buttons, spec.num_valuators);
        let id = self.devices.add(spec, DeviceOrigin::Forwarded(self.tool));
        self.graph.add_device(id, buttons, valuators);
        id
    }

    /// Grabs `device` for the calling tool.
    pub fn grab(&mut self, device: DeviceId) -> bool {
        self.graph.grab(device, Grabber::Tool(self.tool))
    }

    pub fn release(&mut self, device: DeviceId) -> bool {
        self.graph.release(device, Grabber::Tool(self.tool))
    }

    pub fn set_navigational(&mut self, device: DeviceId, navigational: bool) -> bool {
        self.graph.set_navigational(device, navigational)
    }

    /// Schedules `device` for removal once the current hook returns.
    pub fn remove_device(&mut self, device: DeviceId) {
        if !self.removals.contains(&device) {
            self.removals.push(device);
        }
    }
}

/// Access granted to a tool from inside a feature callback.
///
/// Feature updates are queued behind the event being dispatched and tool
/// destruction is deferred to the next update, so nothing here can change
/// the slots currently being iterated.
pub struct EventContext<'a> {
    tool: ToolId,
    devices: &'a mut DeviceRegistry,
    queue: &'a mut VecDeque<ToolManagementQueueItem>,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(
        tool: ToolId,
        devices: &'a mut DeviceRegistry,
        queue: &'a mut VecDeque<ToolManagementQueueItem>,
    ) -> Self {
        Self {
            tool,
            devices,
            queue,
        }
    }

    pub fn tool_id(&self) -> ToolId {
        self.tool
    }

    pub fn devices(&self) -> &DeviceRegistry {
        self.devices
    }

    pub fn set_button(&mut self, feature: Feature, pressed: bool) -> Result<(), GraphError> {
        self.devices.set_button(feature, pressed)
    }

    pub fn set_valuator(&mut self, feature: Feature, value: f64) -> Result<(), GraphError> {
        self.devices.set_valuator(feature, value)
    }

    /// Asks the manager to destroy the calling tool on its next update.
    pub fn request_destroy(&mut self) {
        let item = ToolManagementQueueItem::Destroy(self.tool);
        if !self.queue.contains(&item) {
            self.queue.push_back(item);
        }
    }
}
