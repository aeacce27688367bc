//! Built-in tool classes.

use super::{
    DeviceForwarder, ForwardingMap, Tool, ToolError, ToolFactory, ToolId, ToolInputAssignment,
    ToolLayout, ToolRegistry,
};
use crate::device::{DeviceId, DeviceSpec, Feature};
use crate::manager::{EventContext, ToolContext};
use log::{debug, info, warn};

pub const NAVIGATION: &str = "Navigation";
pub const MENU: &str = "Menu";
pub const DRAGGING: &str = "Dragging";
pub const VALUATOR_SCALE: &str = "ValuatorScale";
pub const FORWARDER: &str = "Forwarder";

type BuildFn = fn(ToolId, &ToolInputAssignment) -> Box<dyn Tool>;

/// Factory for a built-in class: a fixed layout plus a constructor function.
struct BuiltinFactory {
    class: &'static str,
    display: &'static str,
    layout: ToolLayout,
    build: BuildFn,
}

impl ToolFactory for BuiltinFactory {
    fn class_name(&self) -> &str {
        self.class
    }

    fn display_name(&self) -> &str {
        self.display
    }

    fn layout(&self) -> ToolLayout {
        self.layout
    }

    fn create(
        &self,
        id: ToolId,
        assignment: &ToolInputAssignment,
    ) -> Result<Box<dyn Tool>, ToolError> {
        assignment.ensure_complete(self.class)?;
        Ok((self.build)(id, assignment))
    }
}

/// Registers every built-in class with `registry`.
pub fn register_all(registry: &mut ToolRegistry) {
    let classes = [
        BuiltinFactory {
            class: NAVIGATION,
            display: "Navigation",
            layout: ToolLayout::new(1, 0),
            build: |id, _| Box::new(NavigationTool::new(id)),
        },
        BuiltinFactory {
            class: MENU,
            display: "Main Menu",
            layout: ToolLayout::new(1, 0),
            build: |_, _| Box::new(MenuTool::default()),
        },
        BuiltinFactory {
            class: DRAGGING,
            display: "Dragger",
            layout: ToolLayout::new(1, 0).with_optional_buttons(),
            build: |_, assignment| Box::new(DraggingTool::new(assignment.buttons().len())),
        },
        BuiltinFactory {
            class: VALUATOR_SCALE,
            display: "Valuator Scaler",
            layout: ToolLayout::new(0, 1),
            build: |_, _| Box::new(ValuatorScaleTool::default()),
        },
        BuiltinFactory {
            class: FORWARDER,
            display: "Feature Forwarder",
            layout: ToolLayout::new(1, 0)
                .with_optional_buttons()
                .with_optional_valuators(),
            build: |id, assignment| Box::new(ForwarderTool::new(id, assignment)),
        },
    ];
    for factory in classes {
        registry.register(Box::new(factory));
    }
}

/// Tracks whether navigation is active while its button is held.
#[derive(Debug)]
pub struct NavigationTool {
    id: ToolId,
    active: bool,
}

impl NavigationTool {
    fn new(id: ToolId) -> Self {
        Self { id, active: false }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Tool for NavigationTool {
    fn class_name(&self) -> &str {
        NAVIGATION
    }

    fn button_changed(&mut self, _slot: usize, pressed: bool, _ctx: &mut EventContext<'_>) {
        self.active = pressed;
        debug!(
            "{} navigation {}",
            self.id,
            if pressed { "started" } else { "stopped" }
        );
    }
}

/// Opens a named menu while its button is held.
#[derive(Debug)]
pub struct MenuTool {
    menu: String,
    open: bool,
}

impl Default for MenuTool {
    fn default() -> Self {
        Self {
            menu: "Main".to_string(),
            open: false,
        }
    }
}

impl Tool for MenuTool {
    fn class_name(&self) -> &str {
        MENU
    }

    fn configure(&mut self, state: Option<&toml::Table>) -> Result<(), ToolError> {
        if let Some(value) = state.and_then(|table| table.get("menu")) {
            let Some(menu) = value.as_str() else {
                return Err(ToolError::Failed(format!(
                    "menu name must be a string, got {value}"
                )));
            };
            self.menu = menu.to_string();
        }
        Ok(())
    }

    fn store_state(&self) -> Option<toml::Table> {
        let mut table = toml::Table::new();
        table.insert("menu".into(), toml::Value::String(self.menu.clone()));
        Some(table)
    }

    fn button_changed(&mut self, _slot: usize, pressed: bool, _ctx: &mut EventContext<'_>) {
        if pressed && !self.open {
            info!("Opening menu '{}'", self.menu);
        }
        self.open = pressed;
    }
}

/// Drags with the first button; extra buttons act as modifiers.
#[derive(Debug)]
pub struct DraggingTool {
    held: Vec<bool>,
}

impl DraggingTool {
    fn new(num_buttons: usize) -> Self {
        Self {
            held: vec![false; num_buttons],
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.held.first().copied().unwrap_or(false)
    }
}

impl Tool for DraggingTool {
    fn class_name(&self) -> &str {
        DRAGGING
    }

    fn button_changed(&mut self, slot: usize, pressed: bool, _ctx: &mut EventContext<'_>) {
        if let Some(state) = self.held.get_mut(slot) {
            *state = pressed;
        }
    }
}

/// Scales a valuator by a configurable factor.
#[derive(Debug)]
pub struct ValuatorScaleTool {
    scale: f64,
    value: f64,
}

impl Default for ValuatorScaleTool {
    fn default() -> Self {
        Self {
            scale: 1.0,
            value: 0.0,
        }
    }
}

impl ValuatorScaleTool {
    pub fn scaled_value(&self) -> f64 {
        self.value * self.scale
    }
}

impl Tool for ValuatorScaleTool {
    fn class_name(&self) -> &str {
        VALUATOR_SCALE
    }

    fn configure(&mut self, state: Option<&toml::Table>) -> Result<(), ToolError> {
        if let Some(value) = state.and_then(|table| table.get("scale")) {
            self.scale = value
                .as_float()
                .or_else(|| value.as_integer().map(|v| v as f64))
                .ok_or_else(|| ToolError::Failed(format!("scale must be a number, got {value}")))?;
        }
        Ok(())
    }

    fn store_state(&self) -> Option<toml::Table> {
        let mut table = toml::Table::new();
        table.insert("scale".into(), toml::Value::Float(self.scale));
        Some(table)
    }

    fn valuator_changed(&mut self, _slot: usize, value: f64, _ctx: &mut EventContext<'_>) {
        self.value = value;
    }
}

/// Re-exposes its bound features one-to-one on a virtual device it owns.
///
/// The virtual device is grabbed by the tool, so tools bound to it sit one
/// level above the forwarder.
#[derive(Debug)]
pub struct ForwarderTool {
    id: ToolId,
    buttons: Vec<Feature>,
    valuators: Vec<Feature>,
    device: Option<DeviceId>,
    map: ForwardingMap,
}

impl ForwarderTool {
    fn new(id: ToolId, assignment: &ToolInputAssignment) -> Self {
        Self {
            id,
            buttons: assignment.buttons().to_vec(),
            valuators: assignment.valuators().to_vec(),
            device: None,
            map: ForwardingMap::new(),
        }
    }

    pub fn forwarded_device(&self) -> Option<DeviceId> {
        self.device
    }
}

impl Tool for ForwarderTool {
    fn class_name(&self) -> &str {
        FORWARDER
    }

    fn initialize(&mut self, ctx: &mut ToolContext<'_>) -> Result<(), ToolError> {
        let spec = DeviceSpec::new(
            format!("Forwarded{}", self.id.raw()),
            self.buttons.len(),
            self.valuators.len(),
        );
        let device = ctx.create_forwarded_device(spec);
        if !ctx.grab(device) {
            return Err(ToolError::Failed(format!(
                "{} could not grab its forwarded device {}",
                self.id, device
            )));
        }

        if let Some(source) = self.buttons.first().or(self.valuators.first()) {
            self.map.add_device(device, source.device);
        }
        for (index, feature) in self.buttons.iter().enumerate() {
            self.map.link(*feature, Feature::button(device, index));
        }
        for (index, feature) in self.valuators.iter().enumerate() {
            self.map.link(*feature, Feature::valuator(device, index));
        }
        self.device = Some(device);
        Ok(())
    }

    fn deinitialize(&mut self, ctx: &mut ToolContext<'_>) {
        if let Some(device) = self.device.take() {
            ctx.release(device);
            ctx.remove_device(device);
        }
        self.map.clear();
    }

    fn button_changed(&mut self, slot: usize, pressed: bool, ctx: &mut EventContext<'_>) {
        let Some(device) = self.device else { return };
        if let Err(err) = ctx.set_button(Feature::button(device, slot), pressed) {
            warn!("{} failed to forward button {}: {}", self.id, slot, err);
        }
    }

    fn valuator_changed(&mut self, slot: usize, value: f64, ctx: &mut EventContext<'_>) {
        let Some(device) = self.device else { return };
        if let Err(err) = ctx.set_valuator(Feature::valuator(device, slot), value) {
            warn!("{} failed to forward valuator {}: {}", self.id, slot, err);
        }
    }

    fn as_forwarder(&self) -> Option<&dyn DeviceForwarder> {
        Some(&self.map)
    }
}
