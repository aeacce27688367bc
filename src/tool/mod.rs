//! Tools: behavioural units bound to device features.
//!
//! A tool class is described by a [`ToolFactory`] that advertises a
//! [`ToolLayout`] (how many buttons and valuators it needs) and builds tool
//! instances from a validated [`ToolInputAssignment`]. Tools that re-expose
//! their inputs on further devices implement [`DeviceForwarder`].

mod assignment;
pub mod builtin;
mod factory;
mod forwarding;

pub use assignment::{SlotRef, ToolInputAssignment};
pub use factory::{ToolFactory, ToolRegistry};
pub use forwarding::{DeviceForwarder, ForwarderLookup, ForwardingMap, NoForwarders};

use crate::device::{Feature, FeatureKind};
use crate::graph::GraphError;
use crate::manager::{EventContext, ToolContext};
use std::fmt;
use thiserror::Error;

/// Stable identifier of a tool instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToolId(pub(crate) u32);

impl ToolId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tool#{}", self.0)
    }
}

/// Input requirements of a tool class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToolLayout {
    pub num_buttons: usize,
    pub has_optional_buttons: bool,
    pub num_valuators: usize,
    pub has_optional_valuators: bool,
}

impl ToolLayout {
    pub const fn new(num_buttons: usize, num_valuators: usize) -> Self {
        Self {
            num_buttons,
            has_optional_buttons: false,
            num_valuators,
            has_optional_valuators: false,
        }
    }

    pub const fn with_optional_buttons(mut self) -> Self {
        self.has_optional_buttons = true;
        self
    }

    pub const fn with_optional_valuators(mut self) -> Self {
        self.has_optional_valuators = true;
        self
    }

    pub fn required(&self, kind: FeatureKind) -> usize {
        match kind {
            FeatureKind::Button => self.num_buttons,
            FeatureKind::Valuator => self.num_valuators,
        }
    }

    pub fn accepts_optional(&self, kind: FeatureKind) -> bool {
        match kind {
            FeatureKind::Button => self.has_optional_buttons,
            FeatureKind::Valuator => self.has_optional_valuators,
        }
    }

    /// Whether this layout can use a feature of `kind` at all.
    pub fn uses(&self, kind: FeatureKind) -> bool {
        self.required(kind) > 0 || self.accepts_optional(kind)
    }

    pub fn has_optional_slots(&self) -> bool {
        self.has_optional_buttons || self.has_optional_valuators
    }
}

/// Errors raised while validating, creating, or destroying tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool class '{0}'")]
    UnknownClass(String),

    #[error("unknown tool {0}")]
    UnknownTool(ToolId),

    #[error("tool class '{class}' cannot be bound to a {kind}")]
    IncompatibleClass { class: String, kind: FeatureKind },

    #[error("tool class '{class}' needs {required} {kind} binding(s), got {provided}")]
    InsufficientBindings {
        class: String,
        kind: FeatureKind,
        required: usize,
        provided: usize,
    },

    #[error("tool class '{class}' accepts only {allowed} {kind} binding(s)")]
    TooManyBindings {
        class: String,
        kind: FeatureKind,
        allowed: usize,
    },

    #[error("no free {0} slot left in assignment")]
    NoFreeSlot(FeatureKind),

    #[error("feature {0} appears twice in one assignment")]
    DuplicateFeature(Feature),

    #[error("no tool creation in progress")]
    NoCreationInProgress,

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{0}")]
    Failed(String),
}

/// A behavioural unit bound to device features.
///
/// Every hook has a no-op default so simple tools only implement what they
/// need. Structural edits (creating devices, grabbing) are only possible from
/// [`initialize`](Tool::initialize) and [`deinitialize`](Tool::deinitialize);
/// feature callbacks get an [`EventContext`] that can only queue work.
pub trait Tool: fmt::Debug {
    /// Name of the class this tool was created from.
    fn class_name(&self) -> &str;

    /// Applies externally stored state before the tool is wired into the graph.
    fn configure(&mut self, _state: Option<&toml::Table>) -> Result<(), ToolError> {
        Ok(())
    }

    /// Tool-private state to persist alongside its bindings.
    fn store_state(&self) -> Option<toml::Table> {
        None
    }

    fn initialize(&mut self, _ctx: &mut ToolContext<'_>) -> Result<(), ToolError> {
        Ok(())
    }

    fn deinitialize(&mut self, _ctx: &mut ToolContext<'_>) {}

    fn button_changed(&mut self, _slot: usize, _pressed: bool, _ctx: &mut EventContext<'_>) {}

    fn valuator_changed(&mut self, _slot: usize, _value: f64, _ctx: &mut EventContext<'_>) {}

    fn as_forwarder(&self) -> Option<&dyn DeviceForwarder> {
        None
    }
}
