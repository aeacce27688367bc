use super::*;
use crate::manager::ToolContext;
use crate::tool::builtin::{FORWARDER, MENU, NAVIGATION, VALUATOR_SCALE};
use crate::tool::{DeviceForwarder, ForwardingMap, Tool, ToolFactory, ToolLayout, ToolRegistry};
use tempfile::TempDir;

/// Forwards button 0 and button 1 onto two separate one-button devices.
#[derive(Debug)]
struct TwinForwarder {
    map: ForwardingMap,
    sources: Vec<Feature>,
}

impl Tool for TwinForwarder {
    fn class_name(&self) -> &str {
        "Twin"
    }

    fn initialize(&mut self, ctx: &mut ToolContext<'_>) -> Result<(), ToolError> {
        for (index, source) in self.sources.iter().enumerate() {
            let spec = DeviceSpec::new(format!("Twin{index}"), 1, 0);
            let device = ctx.create_forwarded_device(spec);
            ctx.grab(device);
            self.map.add_device(device, source.device);
            self.map.link(*source, Feature::button(device, 0));
        }
        Ok(())
    }

    fn deinitialize(&mut self, ctx: &mut ToolContext<'_>) {
        for device in self.map.forwarded_devices() {
            ctx.remove_device(device);
        }
    }

    fn as_forwarder(&self) -> Option<&dyn DeviceForwarder> {
        Some(&self.map)
    }
}

struct TwinFactory;

impl ToolFactory for TwinFactory {
    fn class_name(&self) -> &str {
        "Twin"
    }

    fn layout(&self) -> ToolLayout {
        ToolLayout::new(2, 0)
    }

    fn create(
        &self,
        _id: ToolId,
        assignment: &ToolInputAssignment,
    ) -> Result<Box<dyn Tool>, ToolError> {
        Ok(Box::new(TwinForwarder {
            map: ForwardingMap::new(),
            sources: assignment.buttons().to_vec(),
        }))
    }
}

fn manager() -> ToolManager {
    let mut registry = ToolRegistry::with_builtin();
    registry.register(Box::new(TwinFactory));
    ToolManager::new(registry)
}

fn with_real_devices(manager: &mut ToolManager) -> DeviceId {
    manager.add_device(DeviceSpec::new("head", 0, 0));
    manager.add_device(DeviceSpec::new("wand", 3, 1))
}

fn create(manager: &mut ToolManager, class: &str, features: &[Feature]) -> ToolId {
    create_with_state(manager, class, features, None)
}

fn create_with_state(
    manager: &mut ToolManager,
    class: &str,
    features: &[Feature],
    state: Option<&str>,
) -> ToolId {
    let layout = manager.registry().lookup(class).unwrap().layout();
    let assignment =
        ToolInputAssignment::from_features(class, layout, features.iter().copied()).unwrap();
    let state: Option<toml::Table> = state.map(|text| toml::from_str(text).unwrap());
    manager.create_tool(class, assignment, state.as_ref()).unwrap()
}

/// A wand with a forwarder, a navigation tool on the forwarded device, a
/// scaler on the valuator, and a menu tool on a framework device.
fn populated() -> ToolManager {
    let mut manager = manager();
    let wand = with_real_devices(&mut manager);
    let menu = manager.add_virtual_device(
        DeviceSpec::new("menu", 1, 0).with_button_names(["Select"]),
    );

    let forwarder = create(&mut manager, FORWARDER, &[Feature::button(wand, 0)]);
    let forwarded = manager.forwarded_devices(forwarder)[0];
    create(&mut manager, NAVIGATION, &[Feature::button(forwarded, 0)]);
    create_with_state(
        &mut manager,
        MENU,
        &[Feature::button(menu, 0)],
        Some("menu = \"Tools\""),
    );
    create_with_state(
        &mut manager,
        VALUATOR_SCALE,
        &[Feature::valuator(wand, 0)],
        Some("scale = 2.0"),
    );
    manager
}

fn tool(config: &GraphConfiguration, class: &str) -> ToolSection {
    config
        .tool_sections()
        .find(|section| section.tool_class == class)
        .cloned()
        .unwrap()
}

#[test]
fn saved_configuration_describes_virtual_devices_and_tools() {
    let config = configuration_from_manager(&populated());

    let devices: Vec<_> = config.device_sections().collect();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "menu");
    assert_eq!(devices[0].button_names, vec!["Select"]);

    let forwarder = tool(&config, FORWARDER);
    assert_eq!(forwarder.bindings, vec![vec!["wand", "Button0"]]);
    let navigation = tool(&config, NAVIGATION);
    assert_eq!(navigation.bindings, vec![vec![forwarder.name.as_str(), "Button0"]]);
    assert_eq!(tool(&config, MENU).bindings, vec![vec!["menu", "Select"]]);
    assert_eq!(
        tool(&config, VALUATOR_SCALE).bindings,
        vec![vec!["wand", "Valuator0"]]
    );
    assert!(config.last_modified.is_some());
}

#[test]
fn forwarding_tools_precede_their_dependents() {
    let config = configuration_from_manager(&populated());
    let names: Vec<&str> = config
        .tool_sections()
        .map(|section| section.tool_class.as_str())
        .collect();

    let forwarder = names.iter().position(|class| *class == FORWARDER).unwrap();
    let navigation = names.iter().position(|class| *class == NAVIGATION).unwrap();
    assert!(forwarder < navigation);
}

#[test]
fn round_trip_reproduces_the_graph() {
    let original = configuration_from_manager(&populated());
    let text = original.to_toml().unwrap();
    let parsed = GraphConfiguration::from_toml(&text).unwrap();
    assert_eq!(parsed, original);

    let mut restored = manager();
    with_real_devices(&mut restored);
    let report = apply_configuration(&mut restored, &parsed).unwrap();

    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(report.devices.len(), 1);
    assert_eq!(report.tools.len(), 4);
    let again = configuration_from_manager(&restored);
    assert_eq!(again.sections, original.sections);
    assert!(restored.graph().levels_consistent());

    let menu = restored.devices().find_by_name("menu").unwrap();
    assert_eq!(
        restored.graph().grabber(menu),
        Some(crate::graph::Grabber::Framework)
    );
}

#[test]
fn generated_names_avoid_real_device_names() {
    let mut manager = manager();
    let wand = with_real_devices(&mut manager);
    manager.add_device(DeviceSpec::new("Tool0", 1, 0));
    let forwarder = create(&mut manager, FORWARDER, &[Feature::button(wand, 0)]);
    let forwarded = manager.forwarded_devices(forwarder)[0];
    create(&mut manager, NAVIGATION, &[Feature::button(forwarded, 0)]);

    let config = configuration_from_manager(&manager);
    let forwarder_section = tool(&config, FORWARDER);
    assert_eq!(forwarder_section.name, "Tool0_1");
    assert_eq!(
        tool(&config, NAVIGATION).bindings,
        vec![vec!["Tool0_1", "Button0"]]
    );

    let mut restored = self::manager();
    let wand = with_real_devices(&mut restored);
    let decoy = restored.add_device(DeviceSpec::new("Tool0", 1, 0));
    let report = apply_configuration(&mut restored, &config).unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(restored.graph().bound_tool(Feature::button(decoy, 0)), None);
    assert!(restored.graph().bound_tool(Feature::button(wand, 0)).is_some());
}

#[test]
fn second_forwarded_device_gets_an_indexed_reference() {
    let mut manager = manager();
    let wand = with_real_devices(&mut manager);
    let twin = create(
        &mut manager,
        "Twin",
        &[Feature::button(wand, 0), Feature::button(wand, 1)],
    );
    let second = manager.forwarded_devices(twin)[1];
    create(&mut manager, NAVIGATION, &[Feature::button(second, 0)]);

    let config = configuration_from_manager(&manager);
    let twin_section = tool(&config, "Twin");
    assert_eq!(
        tool(&config, NAVIGATION).bindings,
        vec![vec![format!("{}:1", twin_section.name), "Button0".to_string()]]
    );

    let mut restored = self::manager();
    with_real_devices(&mut restored);
    let report = apply_configuration(&mut restored, &config).unwrap();
    assert!(report.skipped.is_empty());
    let twin = report.tools[0];
    let second = restored.forwarded_devices(twin)[1];
    assert_eq!(
        restored.graph().bound_tool(Feature::button(second, 0)),
        Some(report.tools[1])
    );
}

#[test]
fn indexed_references_avoid_real_device_names() {
    let mut manager = manager();
    let wand = with_real_devices(&mut manager);
    let lookalike = manager.add_device(DeviceSpec::new("Tool0:1", 1, 0));
    create(
        &mut manager,
        "Twin",
        &[Feature::button(wand, 0), Feature::button(wand, 1)],
    );
    create(&mut manager, NAVIGATION, &[Feature::button(lookalike, 0)]);

    let config = configuration_from_manager(&manager);
    assert_eq!(tool(&config, "Twin").name, "Tool0_1");
    assert_eq!(
        tool(&config, NAVIGATION).bindings,
        vec![vec!["Tool0:1", "Button0"]]
    );

    let mut restored = self::manager();
    with_real_devices(&mut restored);
    let lookalike = restored.add_device(DeviceSpec::new("Tool0:1", 1, 0));
    let report = apply_configuration(&mut restored, &config).unwrap();
    assert!(report.skipped.is_empty(), "{:?}", report.skipped);
    assert_eq!(
        restored.graph().bound_tool(Feature::button(lookalike, 0)),
        Some(report.tools[1])
    );
    let twin = report.tools[0];
    for forwarded in restored.forwarded_devices(twin) {
        assert_eq!(restored.graph().bound_tool(Feature::button(forwarded, 0)), None);
    }
}

#[test]
fn broken_sections_are_skipped() {
    let text = r#"
version = 1

[[section]]
kind = "tool"
name = "Tool0"
tool_class = "Teleport"
bindings = [["wand", "Button0"]]

[[section]]
kind = "tool"
name = "Tool1"
tool_class = "Navigation"
bindings = [["glove", "Button0"]]

[[section]]
kind = "tool"
name = "Tool2"
tool_class = "Navigation"
bindings = [["wand", "Trigger"]]

[[section]]
kind = "tool"
name = "Tool3"
tool_class = "Navigation"
bindings = [["wand", "Button2"]]
"#;
    let config = GraphConfiguration::from_toml(text).unwrap();
    let mut manager = manager();
    let wand = with_real_devices(&mut manager);

    let report = apply_configuration(&mut manager, &config).unwrap();

    assert_eq!(report.tools.len(), 1);
    assert_eq!(report.skipped.len(), 3);
    assert!(matches!(
        &report.skipped[0],
        LoadError::Tool {
            source: ToolError::UnknownClass(_),
            ..
        }
    ));
    assert!(matches!(&report.skipped[1], LoadError::UnknownDevice { device, .. } if device == "glove"));
    assert!(matches!(&report.skipped[2], LoadError::UnknownFeature { feature, .. } if feature == "Trigger"));
    assert_eq!(
        manager.graph().bound_tool(Feature::button(wand, 2)),
        Some(report.tools[0])
    );
}

#[test]
fn bound_feature_resolves_through_forwarding_on_load() {
    let text = r#"
version = 1

[[section]]
kind = "tool"
name = "Tool0"
tool_class = "Forwarder"
bindings = [["wand", "Button0"]]

[[section]]
kind = "tool"
name = "Tool1"
tool_class = "Navigation"
bindings = [["wand", "Button0"]]

[[section]]
kind = "tool"
name = "Tool2"
tool_class = "Navigation"
bindings = [["wand", "Button0"]]
"#;
    let config = GraphConfiguration::from_toml(text).unwrap();
    let mut manager = manager();
    with_real_devices(&mut manager);

    let report = apply_configuration(&mut manager, &config).unwrap();

    assert_eq!(report.tools.len(), 2);
    let forwarded = manager.forwarded_devices(report.tools[0])[0];
    assert_eq!(
        manager.graph().bound_tool(Feature::button(forwarded, 0)),
        Some(report.tools[1])
    );
    assert!(matches!(
        &report.skipped[..],
        [LoadError::FeatureUnavailable { .. }]
    ));
}

#[test]
fn newer_versions_are_refused() {
    let config = GraphConfiguration {
        version: CURRENT_VERSION + 1,
        ..GraphConfiguration::default()
    };
    let mut manager = manager();
    assert!(matches!(
        apply_configuration(&mut manager, &config),
        Err(LoadError::UnsupportedVersion(_))
    ));
}

#[test]
fn save_and_load_through_the_file_system() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("graphs").join("bindings.toml");
    let manager = populated();

    save_manager(&manager, &path).unwrap();
    assert!(path.exists());
    assert!(temp.path().join("graphs").join("bindings.toml.lock").exists());
    assert!(!path.with_extension("toml.tmp").exists());

    let loaded = load_configuration(&path).unwrap();
    assert_eq!(
        loaded.sections,
        configuration_from_manager(&manager).sections
    );

    let mut restored = self::manager();
    with_real_devices(&mut restored);
    let report = load_into_manager(&mut restored, &path).unwrap();
    assert_eq!(report.tools.len(), 4);
}

#[test]
fn loading_a_missing_file_fails() {
    let temp = TempDir::new().unwrap();
    let err = load_configuration(&temp.path().join("missing.toml")).unwrap_err();
    assert!(err.to_string().contains("failed to read input graph file"));
}
