//! Interactive tool creation.
//!
//! Pressing an unbound feature starts creation; that feature becomes the
//! confirm/cancel gesture and is not bound itself. After a class is chosen,
//! every further press/release assigns one feature to the next free slot.
//! Creation finishes automatically once the required slots are filled and
//! the class takes no optional slots; otherwise pressing the first feature
//! again confirms (when complete) or cancels.

use super::{ToolManagementQueueItem, ToolManager};
use crate::device::{DeviceId, Feature, FeatureKind};
use crate::tool::{SlotRef, ToolError, ToolInputAssignment, ToolLayout};
use log::{debug, info, warn};

/// Where an in-flight creation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationPhase {
    SelectingClass,
    CollectingRequired,
    CollectingOptional,
}

/// Result of feeding one released feature into the creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationStep {
    /// The release did not change anything.
    Ignored,
    Assigned(SlotRef),
    /// A `Create` item was queued and creation ended.
    Completed,
    Cancelled,
}

/// State of the single in-flight tool creation.
#[derive(Debug, Clone)]
pub struct ToolCreationState {
    first_feature: Feature,
    selection_device: DeviceId,
    class: Option<String>,
    assignment: Option<ToolInputAssignment>,
    prepared_feature: Option<Feature>,
}

impl ToolCreationState {
    fn new(first_feature: Feature, selection_device: DeviceId) -> Self {
        Self {
            first_feature,
            selection_device,
            class: None,
            assignment: None,
            prepared_feature: None,
        }
    }

    pub fn phase(&self) -> CreationPhase {
        match &self.assignment {
            None => CreationPhase::SelectingClass,
            Some(assignment) if assignment.is_complete() => CreationPhase::CollectingOptional,
            Some(_) => CreationPhase::CollectingRequired,
        }
    }

    pub fn first_feature(&self) -> Feature {
        self.first_feature
    }

    /// Root device the class selection menu is attached to.
    pub fn selection_device(&self) -> DeviceId {
        self.selection_device
    }

    pub fn chosen_class(&self) -> Option<&str> {
        self.class.as_deref()
    }

    pub fn assignment(&self) -> Option<&ToolInputAssignment> {
        self.assignment.as_ref()
    }

    pub fn next_button_slot(&self) -> usize {
        self.assignment
            .as_ref()
            .map_or(0, |assignment| assignment.num_slots(FeatureKind::Button))
    }

    pub fn next_valuator_slot(&self) -> usize {
        self.assignment
            .as_ref()
            .map_or(0, |assignment| assignment.num_slots(FeatureKind::Valuator))
    }

    pub fn prepared_feature(&self) -> Option<Feature> {
        self.prepared_feature
    }

    pub(crate) fn references_device(&self, device: DeviceId) -> bool {
        self.first_feature.device == device
            || self.selection_device == device
            || self
                .assignment
                .as_ref()
                .is_some_and(|assignment| assignment.features().any(|f| f.device == device))
    }

    fn progress(&self) -> CreationProgress {
        let layout = self
            .assignment
            .as_ref()
            .map(ToolInputAssignment::layout)
            .unwrap_or(ToolLayout::new(0, 0));
        CreationProgress {
            phase: self.phase(),
            class: self.class.clone(),
            assigned_buttons: self.next_button_slot(),
            required_buttons: layout.num_buttons,
            assigned_valuators: self.next_valuator_slot(),
            required_valuators: layout.num_valuators,
        }
    }
}

/// Snapshot handed to listeners after every creation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationProgress {
    pub phase: CreationPhase,
    pub class: Option<String>,
    pub assigned_buttons: usize,
    pub required_buttons: usize,
    pub assigned_valuators: usize,
    pub required_valuators: usize,
}

impl ToolManager {
    pub fn creation_state(&self) -> Option<&ToolCreationState> {
        self.creation.as_ref()
    }

    pub fn is_creating_tool(&self) -> bool {
        self.creation.is_some()
    }

    /// Enters creation mode with `first_feature` as the confirm/cancel gesture.
    ///
    /// Returns `false` if a creation is already in progress.
    pub fn start_tool_creation(&mut self, first_feature: Feature) -> bool {
        if self.creation.is_some() {
            return false;
        }
        let root = self.graph.root_device(first_feature.device, &self.tools);
        info!(
            "Starting tool creation from {} (class menu on {})",
            first_feature, root
        );
        self.creation = Some(ToolCreationState::new(first_feature, root));
        self.report_progress();
        true
    }

    /// Picks the class of the tool being created.
    ///
    /// A class that cannot use the kind of the first feature is rejected and
    /// the selection stays open. A class without any slots to fill completes
    /// the creation right away.
    pub fn select_tool_class(&mut self, class: &str) -> Result<CreationStep, ToolError> {
        let layout = self.registry.lookup(class)?.layout();
        let Some(creation) = self.creation.as_mut() else {
            return Err(ToolError::NoCreationInProgress);
        };
        if creation.class.is_some() {
            return Err(ToolError::Failed(format!(
                "tool class already chosen: {}",
                creation.class.as_deref().unwrap_or_default()
            )));
        }

        let kind = creation.first_feature.kind;
        if !layout.uses(kind) {
            warn!("Tool class '{}' cannot be bound to a {}", class, kind);
            return Err(ToolError::IncompatibleClass {
                class: class.to_string(),
                kind,
            });
        }

        debug!("Selected tool class '{}'", class);
        creation.class = Some(class.to_string());
        creation.assignment = Some(ToolInputAssignment::new(layout));
        self.report_progress();
        Ok(self.complete_if_satisfied().unwrap_or(CreationStep::Ignored))
    }

    /// Records `feature` as the one feature in flight between press and release.
    ///
    /// Ignored while another feature is still prepared.
    pub fn prepare_feature_assignment(&mut self, feature: Feature) -> bool {
        let Some(creation) = self.creation.as_mut() else {
            return false;
        };
        if let Some(prepared) = creation.prepared_feature {
            debug!("Ignoring press on {} while {} is pending", feature, prepared);
            return false;
        }
        creation.prepared_feature = Some(feature);
        true
    }

    /// Completes the press/release of a prepared feature.
    pub fn assign_feature(&mut self, feature: Feature) -> CreationStep {
        let Some(creation) = self.creation.as_mut() else {
            return CreationStep::Ignored;
        };
        if creation.prepared_feature != Some(feature) {
            return CreationStep::Ignored;
        }
        creation.prepared_feature = None;

        if feature == creation.first_feature {
            let complete = creation
                .assignment
                .as_ref()
                .is_some_and(ToolInputAssignment::is_complete);
            return if complete {
                self.finish_tool_creation()
            } else {
                info!("Tool creation cancelled");
                self.cancel_tool_creation();
                CreationStep::Cancelled
            };
        }

        let target = self.graph.find_first_unassigned_feature(feature, &self.tools);
        let Some(creation) = self.creation.as_mut() else {
            return CreationStep::Ignored;
        };
        let Some(assignment) = creation.assignment.as_mut() else {
            debug!("Ignoring {}: no tool class chosen yet", feature);
            return CreationStep::Ignored;
        };
        let Some(target) = target else {
            debug!("Ignoring {}: no unassigned feature reachable", feature);
            return CreationStep::Ignored;
        };

        let slot = match assignment.push(target) {
            Ok(slot) => slot,
            Err(err) => {
                debug!("Ignoring {}: {}", target, err);
                return CreationStep::Ignored;
            }
        };
        debug!("Assigned {} to {:?}", target, slot);
        self.report_progress();
        self.complete_if_satisfied()
            .unwrap_or(CreationStep::Assigned(slot))
    }

    /// Abandons the creation in progress, if any.
    pub fn cancel_tool_creation(&mut self) -> bool {
        if self.creation.take().is_some() {
            debug!("Tool creation state discarded");
            true
        } else {
            false
        }
    }

    /// Confirms the creation if every required slot is filled.
    pub fn finish_tool_creation(&mut self) -> CreationStep {
        let Some(creation) = self.creation.take() else {
            return CreationStep::Ignored;
        };
        match (creation.class, creation.assignment) {
            (Some(class), Some(assignment)) if assignment.is_complete() => {
                info!("Queued creation of {} tool", class);
                self.queue
                    .push_back(ToolManagementQueueItem::Create { class, assignment });
                CreationStep::Completed
            }
            _ => {
                info!("Tool creation cancelled before requirements were met");
                CreationStep::Cancelled
            }
        }
    }

    fn complete_if_satisfied(&mut self) -> Option<CreationStep> {
        let assignment = self.creation.as_ref()?.assignment.as_ref()?;
        if assignment.is_complete() && !assignment.layout().has_optional_slots() {
            Some(self.finish_tool_creation())
        } else {
            None
        }
    }

    fn report_progress(&mut self) {
        let Some(progress) = self.creation.as_ref().map(ToolCreationState::progress) else {
            return;
        };
        for listener in &mut self.listeners {
            listener.creation_progress(&progress);
        }
    }
}
