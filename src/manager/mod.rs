//! Tool manager: owns devices, tools and the input graph, routes feature
//! events through slot interception, and drives interactive tool creation.
//!
//! Structural edits requested from inside feature callbacks (tool creation
//! and destruction) are queued and applied by [`ToolManager::update`], so a
//! callback never changes the slots that are being dispatched.

mod context;
mod creation;
mod queue;
mod slots;

pub use context::{EventContext, ToolContext};
pub use creation::{CreationPhase, CreationProgress, CreationStep, ToolCreationState};
pub use queue::{ConstructionStage, ToolManagementQueueItem};
pub use slots::ToolStack;

use crate::config::InputConfig;
use crate::device::{DeviceId, DeviceOrigin, DeviceRegistry, DeviceSpec, Transform};
use crate::graph::{Grabber, InputGraphManager};
use crate::killzone::{KillZone, NoKillZone};
use crate::tool::{
    DeviceForwarder, ForwarderLookup, Tool, ToolError, ToolId, ToolRegistry,
};
use log::{debug, info};
use std::collections::{HashMap, VecDeque};

/// Observer of tool lifecycle and creation progress.
pub trait ToolListener {
    /// Called during construction; an error aborts and unwinds the creation.
    fn tool_created(&mut self, _tool: ToolId, _class: &str) -> Result<(), ToolError> {
        Ok(())
    }

    fn tool_destroyed(&mut self, _tool: ToolId, _class: &str) {}

    fn creation_progress(&mut self, _progress: &CreationProgress) {}
}

/// Thresholds used to emulate buttons from valuators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManagerSettings {
    pub valuator_press_threshold: f64,
    pub valuator_release_threshold: f64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            valuator_press_threshold: 0.25,
            valuator_release_threshold: 0.1,
        }
    }
}

impl From<&InputConfig> for ManagerSettings {
    fn from(config: &InputConfig) -> Self {
        Self {
            valuator_press_threshold: config.valuator_press_threshold,
            valuator_release_threshold: config.valuator_release_threshold,
        }
    }
}

/// Live tool instances in creation order.
#[derive(Debug, Default)]
pub struct ToolSet {
    tools: HashMap<ToolId, Box<dyn Tool>>,
    order: Vec<ToolId>,
}

impl ToolSet {
    pub fn get(&self, id: ToolId) -> Option<&dyn Tool> {
        self.tools.get(&id).map(|tool| tool.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ToolId) -> Option<&mut Box<dyn Tool>> {
        self.tools.get_mut(&id)
    }

    pub fn contains(&self, id: ToolId) -> bool {
        self.tools.contains_key(&id)
    }

    /// Tool ids in the order the tools were created.
    pub fn ids(&self) -> &[ToolId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn insert(&mut self, id: ToolId, tool: Box<dyn Tool>) {
        if self.tools.insert(id, tool).is_none() {
            self.order.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: ToolId) -> Option<Box<dyn Tool>> {
        let tool = self.tools.remove(&id)?;
        self.order.retain(|other| *other != id);
        Some(tool)
    }
}

impl ForwarderLookup for ToolSet {
    fn forwarder(&self, tool: ToolId) -> Option<&dyn DeviceForwarder> {
        self.tools.get(&tool)?.as_forwarder()
    }
}

/// Central owner of the device/tool binding graph.
#[derive(Debug)]
pub struct ToolManager {
    settings: ManagerSettings,
    devices: DeviceRegistry,
    graph: InputGraphManager,
    registry: ToolRegistry,
    tools: ToolSet,
    next_tool_id: u32,
    creation: Option<ToolCreationState>,
    queue: VecDeque<ToolManagementQueueItem>,
    kill_zone: Box<dyn KillZone>,
    listeners: Vec<Box<dyn ToolListener>>,
    tool_stack: Option<ToolStack>,
}

impl std::fmt::Debug for dyn ToolListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ToolListener")
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new(ToolRegistry::with_builtin())
    }
}

impl ToolManager {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            settings: ManagerSettings::default(),
            devices: DeviceRegistry::new(),
            graph: InputGraphManager::new(),
            registry,
            tools: ToolSet::default(),
            next_tool_id: 1,
            creation: None,
            queue: VecDeque::new(),
            kill_zone: Box::new(NoKillZone),
            listeners: Vec::new(),
            tool_stack: None,
        }
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_kill_zone(mut self, kill_zone: Box<dyn KillZone>) -> Self {
        self.kill_zone = kill_zone;
        self
    }

    pub fn settings(&self) -> ManagerSettings {
        self.settings
    }

    pub fn set_kill_zone(&mut self, kill_zone: Box<dyn KillZone>) {
        self.kill_zone = kill_zone;
    }

    pub fn add_listener(&mut self, listener: Box<dyn ToolListener>) {
        self.listeners.push(listener);
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn graph(&self) -> &InputGraphManager {
        &self.graph
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn tool(&self, id: ToolId) -> Option<&dyn Tool> {
        self.tools.get(id)
    }

    /// Operations waiting for the next [`update`](Self::update).
    pub fn pending_operations(&self) -> impl Iterator<Item = &ToolManagementQueueItem> + '_ {
        self.queue.iter()
    }

    /// Registers a physical device.
    pub fn add_device(&mut self, spec: DeviceSpec) -> DeviceId {
        self.register_device(spec, DeviceOrigin::Real)
    }

    /// Registers a virtual device owned by the framework.
    ///
    /// The framework grabs it immediately, so it stays on level 0 and no tool
    /// can claim it.
    pub fn add_virtual_device(&mut self, spec: DeviceSpec) -> DeviceId {
        let id = self.register_device(spec, DeviceOrigin::Virtual);
        self.graph.grab(id, Grabber::Framework);
        id
    }

    fn register_device(&mut self, spec: DeviceSpec, origin: DeviceOrigin) -> DeviceId {
        let (buttons, valuators) = (spec.num_buttons, spec.num_valuators);
        let id = self.devices.add(spec, origin);
        self.graph.add_device(id, buttons, valuators);
        info!("Added input device {} ({:?})", id, origin);
        id
    }

    /// Removes a device, destroying every tool bound to it first.
    ///
    /// Also cancels a tool creation that involves the device and drops queued
    /// creations referencing it. Returns `false` if the device is unknown.
    pub fn remove_device(&mut self, id: DeviceId) -> bool {
        if !self.devices.contains(id) {
            return false;
        }

        if self
            .creation
            .as_ref()
            .is_some_and(|creation| creation.references_device(id))
        {
            info!("Cancelling tool creation: {} was removed", id);
            self.cancel_tool_creation();
        }
        self.queue.retain(|item| !item.references_device(id));

        for tool in self.graph.tools_on_device(id) {
            if self.tools.contains(tool) {
                self.destroy_tool_now(tool);
            }
        }

        if self
            .tool_stack
            .as_ref()
            .is_some_and(|stack| stack.base.device == id)
        {
            self.tool_stack = None;
        }
        self.graph.remove_device(id);
        self.devices.remove(id);
        info!("Removed input device {}", id);
        true
    }

    pub fn set_device_transform(&mut self, id: DeviceId, transform: Transform) -> bool {
        match self.devices.get_mut(id) {
            Some(device) => {
                device.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn set_navigational(&mut self, id: DeviceId, navigational: bool) -> bool {
        self.graph.set_navigational(id, navigational)
    }

    /// Devices the given tool forwards features onto.
    pub fn forwarded_devices(&self, tool: ToolId) -> Vec<DeviceId> {
        self.tools
            .forwarder(tool)
            .map(|forwarder| forwarder.forwarded_devices())
            .unwrap_or_default()
    }

    /// Whether `device` is currently inside the kill zone.
    pub fn device_in_kill_zone(&self, device: DeviceId) -> bool {
        self.devices
            .get(device)
            .is_some_and(|device| self.kill_zone.is_device_in(device))
    }

    /// Destroys every tool and framework virtual device, leaving real devices.
    pub fn clear(&mut self) {
        self.cancel_tool_creation();
        self.queue.clear();
        self.tool_stack = None;

        for tool in self.graph.tools_by_level().into_iter().rev() {
            if self.tools.contains(tool) {
                self.destroy_tool_now(tool);
            }
        }
        let virtual_devices: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|device| device.origin() != DeviceOrigin::Real)
            .map(|device| device.id())
            .collect();
        for device in virtual_devices {
            self.remove_device(device);
        }
        debug!("Cleared input graph");
    }

    fn allocate_tool_id(&mut self) -> ToolId {
        let id = ToolId(self.next_tool_id);
        self.next_tool_id += 1;
        id
    }

    fn apply_device_removals(&mut self, removals: Vec<DeviceId>) {
        for device in removals {
            self.remove_device(device);
        }
    }

    /// Removes devices still owned by a tool that has gone away.
    fn remove_forwarded_devices(&mut self, tool: ToolId) {
        let leftovers: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|device| device.origin() == DeviceOrigin::Forwarded(tool))
            .map(|device| device.id())
            .collect();
        for device in leftovers {
            debug!("Removing {} left behind by {}", device, tool);
            self.remove_device(device);
        }
    }
}
