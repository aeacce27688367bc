//! Deferred tool management and staged tool construction/teardown.

use super::{ToolContext, ToolManager};
use crate::device::DeviceId;
use crate::tool::{Tool, ToolError, ToolId, ToolInputAssignment};
use log::{debug, error, info, warn};
use std::fmt;

/// A structural edit waiting for the next [`ToolManager::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolManagementQueueItem {
    Create {
        class: String,
        assignment: ToolInputAssignment,
    },
    Destroy(ToolId),
}

impl ToolManagementQueueItem {
    pub(crate) fn references_device(&self, device: DeviceId) -> bool {
        match self {
            Self::Create { assignment, .. } => {
                assignment.features().any(|feature| feature.device == device)
            }
            Self::Destroy(_) => false,
        }
    }
}

/// Construction steps, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConstructionStage {
    Configured = 1,
    Linked,
    Listed,
    Announced,
    Initialized,
}

impl fmt::Display for ConstructionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configure",
            Self::Linked => "graph insertion",
            Self::Listed => "tool list insertion",
            Self::Announced => "creation callbacks",
            Self::Initialized => "initialize",
        };
        f.write_str(name)
    }
}

/// Bookkeeping for one tool under construction.
struct ToolBuild {
    id: ToolId,
    class: String,
    /// Held here until the tool is moved into the tool list.
    tool: Option<Box<dyn Tool>>,
    completed: Option<ConstructionStage>,
}

impl ToolBuild {
    fn reached(&self, stage: ConstructionStage) -> bool {
        self.completed.is_some_and(|completed| completed >= stage)
    }
}

impl ToolManager {
    /// Applies every queued operation in FIFO order.
    ///
    /// Pending feature events are dispatched first. Returns the number of
    /// queue items processed.
    pub fn update(&mut self) -> usize {
        self.dispatch_events();

        let mut processed = 0;
        while let Some(item) = self.queue.pop_front() {
            processed += 1;
            match item {
                ToolManagementQueueItem::Create { class, assignment } => {
                    if let Err(err) = self.create_tool(&class, assignment, None) {
                        error!("Failed to create {} tool: {}", class, err);
                    }
                }
                ToolManagementQueueItem::Destroy(id) => {
                    if self.tools.contains(id) {
                        self.destroy_tool_now(id);
                    } else {
                        debug!("Skipping destruction of {}: already gone", id);
                    }
                }
            }
        }
        processed
    }

    /// Destroys a tool, either right away or on the next update.
    pub fn destroy_tool(&mut self, id: ToolId, immediate: bool) -> Result<(), ToolError> {
        if !self.tools.contains(id) {
            return Err(ToolError::UnknownTool(id));
        }
        if immediate {
            self.destroy_tool_now(id);
        } else {
            let item = ToolManagementQueueItem::Destroy(id);
            if !self.queue.contains(&item) {
                self.queue.push_back(item);
            }
        }
        Ok(())
    }

    /// Builds a tool of `class` bound to `assignment`.
    ///
    /// The assignment is validated before anything changes. Construction then
    /// runs the stages of [`ConstructionStage`] in order; if one fails, every
    /// completed stage is undone in reverse and the original error returned.
    pub fn create_tool(
        &mut self,
        class: &str,
        assignment: ToolInputAssignment,
        state: Option<&toml::Table>,
    ) -> Result<ToolId, ToolError> {
        let layout = self.registry.lookup(class)?.layout();
        if assignment.layout() != layout {
            return Err(ToolError::Failed(format!(
                "assignment layout does not match tool class '{class}'"
            )));
        }
        assignment.ensure_complete(class)?;
        self.graph.validate_assignment(&assignment)?;

        let id = self.allocate_tool_id();
        let tool = self.registry.lookup(class)?.create(id, &assignment)?;
        let mut build = ToolBuild {
            id,
            class: class.to_string(),
            tool: Some(tool),
            completed: None,
        };

        match self.run_construction(&mut build, assignment, state) {
            Ok(()) => {
                info!("Created {} tool {}", class, id);
                Ok(id)
            }
            Err(err) => {
                let failed = build.completed.map_or(
                    "configure".to_string(),
                    |stage| format!("after {stage}"),
                );
                warn!("Construction of {} tool {} failed ({}): {}", class, id, failed, err);
                self.unwind_construction(build);
                Err(err)
            }
        }
    }

    fn run_construction(
        &mut self,
        build: &mut ToolBuild,
        assignment: ToolInputAssignment,
        state: Option<&toml::Table>,
    ) -> Result<(), ToolError> {
        let id = build.id;

        if let Some(tool) = build.tool.as_mut() {
            tool.configure(state)?;
        }
        build.completed = Some(ConstructionStage::Configured);

        let level = self.graph.add_tool(id, assignment)?;
        debug!("{} placed on level {}", id, level);
        build.completed = Some(ConstructionStage::Linked);

        if let Some(tool) = build.tool.take() {
            self.tools.insert(id, tool);
        }
        build.completed = Some(ConstructionStage::Listed);

        self.announce_created(id, &build.class)?;
        build.completed = Some(ConstructionStage::Announced);

        self.initialize_tool(id)?;
        build.completed = Some(ConstructionStage::Initialized);
        Ok(())
    }

    fn unwind_construction(&mut self, mut build: ToolBuild) {
        let id = build.id;
        if build.reached(ConstructionStage::Announced) {
            self.announce_destroyed(id, &build.class);
        }
        if build.reached(ConstructionStage::Listed) {
            build.tool = self.tools.remove(id);
        }
        if build.reached(ConstructionStage::Linked) {
            self.graph.remove_tool(id);
        }
        // initialize may have registered devices before failing
        self.remove_forwarded_devices(id);

        if let Some(tool) = build.tool {
            self.release_tool_object(&build.class, tool);
        }
    }

    /// Tears a tool down in the reverse order of construction.
    pub(crate) fn destroy_tool_now(&mut self, id: ToolId) {
        let Some(class) = self.tools.get(id).map(|tool| tool.class_name().to_string()) else {
            return;
        };

        let mut removals = Vec::new();
        if let Some(tool) = self.tools.get_mut(id) {
            let mut ctx = ToolContext::new(id, &mut self.devices, &mut self.graph, &mut removals);
            tool.deinitialize(&mut ctx);
        }

        self.announce_destroyed(id, &class);
        let tool = self.tools.remove(id);
        self.graph.remove_tool(id);

        if self
            .tool_stack
            .as_ref()
            .is_some_and(|stack| stack.contains_tool(id))
        {
            self.tool_stack = None;
        }
        self.apply_device_removals(removals);
        self.remove_forwarded_devices(id);

        if let Some(tool) = tool {
            self.release_tool_object(&class, tool);
        }
        info!("Destroyed {} tool {}", class, id);
    }

    fn initialize_tool(&mut self, id: ToolId) -> Result<(), ToolError> {
        let mut removals = Vec::new();
        let result = match self.tools.get_mut(id) {
            Some(tool) => {
                let mut ctx =
                    ToolContext::new(id, &mut self.devices, &mut self.graph, &mut removals);
                tool.initialize(&mut ctx)
            }
            None => Err(ToolError::UnknownTool(id)),
        };
        self.apply_device_removals(removals);
        result
    }

    /// Fires `tool_created` on every listener; a refusal withdraws the
    /// notification from the listeners that already accepted it.
    fn announce_created(&mut self, id: ToolId, class: &str) -> Result<(), ToolError> {
        for index in 0..self.listeners.len() {
            if let Err(err) = self.listeners[index].tool_created(id, class) {
                for listener in self.listeners[..index].iter_mut().rev() {
                    listener.tool_destroyed(id, class);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn announce_destroyed(&mut self, id: ToolId, class: &str) {
        for listener in self.listeners.iter_mut().rev() {
            listener.tool_destroyed(id, class);
        }
    }

    fn release_tool_object(&self, class: &str, tool: Box<dyn Tool>) {
        match self.registry.get(class) {
            Some(factory) => factory.destroy(tool),
            None => drop(tool),
        }
    }
}
