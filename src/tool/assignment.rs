//! Mapping of a tool's input slots onto concrete device features.

use super::{ToolError, ToolLayout};
use crate::device::{Feature, FeatureKind};

/// Which slot of a tool a feature occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotRef {
    Button(usize),
    Valuator(usize),
}

impl SlotRef {
    pub fn index(self) -> usize {
        match self {
            SlotRef::Button(index) | SlotRef::Valuator(index) => index,
        }
    }

    pub fn kind(self) -> FeatureKind {
        match self {
            SlotRef::Button(_) => FeatureKind::Button,
            SlotRef::Valuator(_) => FeatureKind::Valuator,
        }
    }
}

/// Ordered button and valuator slots of one tool instance.
///
/// The first `layout.num_buttons` button slots (and `layout.num_valuators`
/// valuator slots) are required; anything beyond is optional and only
/// accepted when the layout allows it. A feature never appears twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInputAssignment {
    layout: ToolLayout,
    buttons: Vec<Feature>,
    valuators: Vec<Feature>,
}

impl ToolInputAssignment {
    /// Creates an empty assignment for `layout`.
    pub fn new(layout: ToolLayout) -> Self {
        Self {
            layout,
            buttons: Vec::new(),
            valuators: Vec::new(),
        }
    }

    /// Builds a complete assignment in one step, validating it against `layout`.
    pub fn from_features(
        class: &str,
        layout: ToolLayout,
        features: impl IntoIterator<Item = Feature>,
    ) -> Result<Self, ToolError> {
        let mut assignment = Self::new(layout);
        for feature in features {
            assignment.push(feature).map_err(|err| match err {
                ToolError::NoFreeSlot(kind) => ToolError::TooManyBindings {
                    class: class.to_string(),
                    kind,
                    allowed: layout.required(kind),
                },
                other => other,
            })?;
        }
        assignment.ensure_complete(class)?;
        Ok(assignment)
    }

    pub fn layout(&self) -> ToolLayout {
        self.layout
    }

    /// Appends `feature` to the next free slot of its kind.
    pub fn push(&mut self, feature: Feature) -> Result<SlotRef, ToolError> {
        if self.contains(feature) {
            return Err(ToolError::DuplicateFeature(feature));
        }
        if !self.accepts(feature.kind) {
            return Err(ToolError::NoFreeSlot(feature.kind));
        }
        Ok(match feature.kind {
            FeatureKind::Button => {
                self.buttons.push(feature);
                SlotRef::Button(self.buttons.len() - 1)
            }
            FeatureKind::Valuator => {
                self.valuators.push(feature);
                SlotRef::Valuator(self.valuators.len() - 1)
            }
        })
    }

    /// Whether another feature of `kind` fits, as a required or optional slot.
    pub fn accepts(&self, kind: FeatureKind) -> bool {
        self.num_slots(kind) < self.layout.required(kind) || self.layout.accepts_optional(kind)
    }

    pub fn num_slots(&self, kind: FeatureKind) -> usize {
        match kind {
            FeatureKind::Button => self.buttons.len(),
            FeatureKind::Valuator => self.valuators.len(),
        }
    }

    /// Whether every required slot is filled.
    pub fn is_complete(&self) -> bool {
        self.buttons.len() >= self.layout.num_buttons
            && self.valuators.len() >= self.layout.num_valuators
    }

    pub fn ensure_complete(&self, class: &str) -> Result<(), ToolError> {
        for kind in [FeatureKind::Button, FeatureKind::Valuator] {
            let required = self.layout.required(kind);
            let provided = self.num_slots(kind);
            if provided < required {
                return Err(ToolError::InsufficientBindings {
                    class: class.to_string(),
                    kind,
                    required,
                    provided,
                });
            }
        }
        Ok(())
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.buttons.contains(&feature) || self.valuators.contains(&feature)
    }

    pub fn buttons(&self) -> &[Feature] {
        &self.buttons
    }

    pub fn valuators(&self) -> &[Feature] {
        &self.valuators
    }

    pub fn button_slot(&self, index: usize) -> Option<Feature> {
        self.buttons.get(index).copied()
    }

    pub fn valuator_slot(&self, index: usize) -> Option<Feature> {
        self.valuators.get(index).copied()
    }

    /// Slot occupied by `feature`, if any.
    pub fn slot_of(&self, feature: Feature) -> Option<SlotRef> {
        match feature.kind {
            FeatureKind::Button => self
                .buttons
                .iter()
                .position(|f| *f == feature)
                .map(SlotRef::Button),
            FeatureKind::Valuator => self
                .valuators
                .iter()
                .position(|f| *f == feature)
                .map(SlotRef::Valuator),
        }
    }

    /// All features, buttons first, each in slot order.
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.buttons.iter().chain(self.valuators.iter()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty() && self.valuators.is_empty()
    }
}
