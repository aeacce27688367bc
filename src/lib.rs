//! Input device and tool binding graph for interactive VR frameworks.
//!
//! Physical and virtual input devices expose buttons and valuators
//! ("features"). Tools bind to features, and forwarding tools create virtual
//! devices of their own that further tools can bind to. The [`ToolManager`]
//! owns the layered graph of devices and tools, routes feature events to the
//! bound tools, runs interactive tool creation from unbound presses and
//! destroys tools through the kill zone gesture.
//!
//! The graph can be saved to and restored from TOML files ([`persist`]) and
//! replicated across the nodes of a cluster ([`cluster`]).

pub mod cluster;
pub mod config;
pub mod device;
pub mod graph;
pub mod killzone;
pub mod manager;
pub mod persist;
pub mod tool;

pub use config::Config;
pub use device::{DeviceId, DeviceSpec, Feature, FeatureKind};
pub use graph::{GraphError, InputGraphManager};
pub use manager::{ManagerSettings, ToolListener, ToolManager};
pub use persist::GraphConfiguration;
pub use tool::{ToolError, ToolId, ToolInputAssignment, ToolLayout};
