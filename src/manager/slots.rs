//! Feature event dispatch and per-slot interception.
//!
//! Every feature event passes through the slot of its feature first. A
//! press may be claimed by the manager (tool creation, kill zone); a claimed
//! press marks the slot preempted and the matching release is claimed too,
//! so the bound tool never sees half of an interaction.

use super::{EventContext, ToolManager};
use crate::device::{Feature, FeatureValue};
use crate::graph::{GraphError, ToolSlot, ToolStackEntry};
use crate::tool::ToolId;
use log::{debug, info, warn};

/// Logical view of the tools reachable from a feature, shown while the
/// feature is held inside the kill zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolStack {
    pub base: Feature,
    pub entries: Vec<ToolStackEntry>,
    /// Class of each entry's tool, parallel to `entries`.
    pub classes: Vec<Option<String>>,
}

impl ToolStack {
    pub fn contains_tool(&self, tool: ToolId) -> bool {
        self.entries.iter().any(|entry| entry.tool == Some(tool))
    }

    /// One indented line per entry.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .zip(&self.classes)
            .map(|(entry, class)| {
                let indent = "  ".repeat(entry.depth);
                match (entry.tool, class) {
                    (Some(tool), Some(class)) => {
                        format!("{indent}{}: {} ({})", entry.feature, class, tool)
                    }
                    _ => format!("{indent}{}: unbound", entry.feature),
                }
            })
            .collect()
    }
}

impl ToolManager {
    /// Updates a button and queues its event if the state changed.
    pub fn set_button(&mut self, feature: Feature, pressed: bool) -> Result<(), GraphError> {
        self.devices.set_button(feature, pressed)
    }

    /// Updates a valuator and queues its event if the value changed.
    pub fn set_valuator(&mut self, feature: Feature, value: f64) -> Result<(), GraphError> {
        self.devices.set_valuator(feature, value)
    }

    pub fn disable_callbacks(&mut self) {
        self.devices.disable_callbacks();
    }

    pub fn enable_callbacks(&mut self) {
        self.devices.enable_callbacks();
    }

    /// Routes queued feature events in FIFO order. Returns how many were handled.
    ///
    /// Events a tool raises on virtual devices while handling an event are
    /// appended to the queue and routed in the same call.
    pub fn dispatch_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.devices.next_event() {
            handled += 1;
            match event.value {
                FeatureValue::Button(pressed) => self.route_button(event.feature, pressed),
                FeatureValue::Valuator(value) => self.route_valuator(event.feature, value),
            }
        }
        handled
    }

    /// The tool stack currently on display, if any.
    pub fn tool_stack(&self) -> Option<&ToolStack> {
        self.tool_stack.as_ref()
    }

    /// Builds the tool stack rooted at `base`.
    pub fn build_tool_stack(&self, base: Feature) -> ToolStack {
        let entries = self.graph.tool_stack(base, &self.tools);
        let classes = entries
            .iter()
            .map(|entry| {
                entry
                    .tool
                    .and_then(|tool| self.tools.get(tool))
                    .map(|tool| tool.class_name().to_string())
            })
            .collect();
        ToolStack {
            base,
            entries,
            classes,
        }
    }

    fn route_button(&mut self, feature: Feature, pressed: bool) {
        let Ok(slot) = self.graph.slot(feature) else {
            debug!("Dropping event for vanished feature {}", feature);
            return;
        };
        let preempted = slot.preempted;

        if pressed {
            if self.intercept_press(feature) {
                return;
            }
        } else if preempted {
            self.intercept_release(feature);
            return;
        }
        self.deliver(feature, FeatureValue::Button(pressed));
    }

    /// Turns a valuator into an emulated button with hysteresis: it presses
    /// at the press threshold and releases below the release threshold.
    fn route_valuator(&mut self, feature: Feature, value: f64) {
        let settings = self.settings;
        let Some(slot) = self.graph.slot_entry(feature) else {
            debug!("Dropping event for vanished feature {}", feature);
            return;
        };
        let was_pressed = slot.emulated_pressed;
        let threshold = if was_pressed {
            settings.valuator_release_threshold
        } else {
            settings.valuator_press_threshold
        };
        let pressed = value.abs() >= threshold;
        slot.emulated_pressed = pressed;
        let preempted = slot.preempted;

        match (was_pressed, pressed) {
            (false, true) => {
                if self.intercept_press(feature) {
                    return;
                }
            }
            (true, false) if preempted => {
                self.intercept_release(feature);
                return;
            }
            _ if preempted => return,
            _ => {}
        }
        self.deliver(feature, FeatureValue::Valuator(value));
    }

    /// Decides whether the manager claims a press. Returns `true` if claimed.
    fn intercept_press(&mut self, feature: Feature) -> bool {
        let bound = self.graph.bound_tool(feature);

        if self.creation.is_some()
            && self
                .graph
                .find_first_unassigned_feature(feature, &self.tools)
                .is_some()
        {
            self.prepare_feature_assignment(feature);
            self.update_slot(feature, |slot| slot.preempted = true);
            return true;
        }

        if self.device_in_kill_zone(feature.device) {
            self.update_slot(feature, |slot| {
                slot.in_kill_zone = true;
                slot.preempted = true;
            });
            if bound.is_some() {
                let stack = self.build_tool_stack(feature);
                for line in stack.lines() {
                    debug!("tool stack: {}", line);
                }
                self.tool_stack = Some(stack);
            }
            return true;
        }

        if bound.is_none() {
            self.start_tool_creation(feature);
            self.update_slot(feature, |slot| slot.preempted = true);
            return true;
        }
        false
    }

    fn intercept_release(&mut self, feature: Feature) {
        let in_kill_zone = self
            .graph
            .slot(feature)
            .is_ok_and(|slot| slot.in_kill_zone);

        if in_kill_zone {
            if self
                .tool_stack
                .as_ref()
                .is_some_and(|stack| stack.base == feature)
            {
                self.tool_stack = None;
            }
            if self.graph.bound_tool(feature).is_some() && self.device_in_kill_zone(feature.device)
            {
                if let Some(terminal) = self.graph.terminal_tool(feature, &self.tools) {
                    info!("Kill zone release on {}: destroying {}", feature, terminal);
                    if let Err(err) = self.destroy_tool(terminal, false) {
                        warn!("Could not destroy {}: {}", terminal, err);
                    }
                }
            }
        } else if self.creation.is_some() {
            self.assign_feature(feature);
        }

        self.update_slot(feature, |slot| {
            slot.preempted = false;
            slot.in_kill_zone = false;
        });
    }

    fn deliver(&mut self, feature: Feature, value: FeatureValue) {
        let Some(tool_id) = self.graph.bound_tool(feature) else {
            return;
        };
        let Some(slot) = self
            .graph
            .assignment(tool_id)
            .and_then(|assignment| assignment.slot_of(feature))
        else {
            return;
        };
        let Some(tool) = self.tools.get_mut(tool_id) else {
            return;
        };
        let mut ctx = EventContext::new(tool_id, &mut self.devices, &mut self.queue);
        match value {
            FeatureValue::Button(pressed) => tool.button_changed(slot.index(), pressed, &mut ctx),
            FeatureValue::Valuator(value) => tool.valuator_changed(slot.index(), value, &mut ctx),
        }
    }

    fn update_slot(&mut self, feature: Feature, update: impl FnOnce(&mut ToolSlot)) {
        if let Some(slot) = self.graph.slot_entry(feature) {
            update(slot);
        }
    }
}
