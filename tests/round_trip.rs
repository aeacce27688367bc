use std::cell::RefCell;
use std::rc::Rc;
use tempfile::TempDir;
use toolgraph::persist::{configuration_from_manager, load_into_manager, save_manager};
use toolgraph::tool::builtin::{FORWARDER, NAVIGATION};
use toolgraph::{DeviceSpec, Feature, ToolError, ToolId, ToolListener, ToolManager};

#[derive(Clone, Default)]
struct Created(Rc<RefCell<Vec<String>>>);

impl ToolListener for Created {
    fn tool_created(&mut self, _tool: ToolId, class: &str) -> Result<(), ToolError> {
        self.0.borrow_mut().push(class.to_string());
        Ok(())
    }
}

fn click(manager: &mut ToolManager, feature: Feature) {
    manager.set_button(feature, true).unwrap();
    manager.dispatch_events();
    manager.set_button(feature, false).unwrap();
    manager.dispatch_events();
}

fn add_wand(manager: &mut ToolManager) -> toolgraph::DeviceId {
    manager.add_device(DeviceSpec::new("head", 0, 0));
    manager.add_device(DeviceSpec::new("wand", 3, 0).with_button_names(["Trigger", "Grip", "Menu"]))
}

#[test]
fn interactively_built_graph_survives_a_file_round_trip() {
    let created = Created::default();
    let mut manager = ToolManager::default();
    manager.add_listener(Box::new(created.clone()));
    let wand = add_wand(&mut manager);
    let (trigger, grip, menu) = (
        Feature::button(wand, 0),
        Feature::button(wand, 1),
        Feature::button(wand, 2),
    );

    // Forwarder on the trigger, confirmed with the menu button.
    click(&mut manager, menu);
    manager.select_tool_class(FORWARDER).unwrap();
    click(&mut manager, trigger);
    click(&mut manager, menu);
    assert_eq!(manager.update(), 1);

    // Navigation started from the grip; pressing the trigger binds the
    // forwarded button behind it.
    click(&mut manager, grip);
    manager.select_tool_class(NAVIGATION).unwrap();
    click(&mut manager, trigger);
    assert_eq!(manager.update(), 1);
    assert_eq!(*created.0.borrow(), vec![FORWARDER, NAVIGATION]);

    let forwarder = manager.graph().bound_tool(trigger).unwrap();
    let forwarded = manager.forwarded_devices(forwarder)[0];
    let navigation = manager.graph().bound_tool(Feature::button(forwarded, 0)).unwrap();
    assert_eq!(manager.graph().tool_level(navigation), Some(1));

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph").join("bindings.toml");
    save_manager(&manager, &path).unwrap();

    let mut restored = ToolManager::default();
    add_wand(&mut restored);
    let report = load_into_manager(&mut restored, &path).unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.tools.len(), 2);
    assert_eq!(
        configuration_from_manager(&restored).sections,
        configuration_from_manager(&manager).sections
    );
    assert!(restored.graph().levels_consistent());
}

#[test]
fn clearing_leaves_only_real_devices() {
    let mut manager = ToolManager::default();
    let wand = add_wand(&mut manager);

    click(&mut manager, Feature::button(wand, 2));
    manager.select_tool_class(FORWARDER).unwrap();
    click(&mut manager, Feature::button(wand, 0));
    click(&mut manager, Feature::button(wand, 2));
    manager.update();
    assert_eq!(manager.devices().len(), 3);

    manager.clear();
    assert_eq!(manager.devices().len(), 2);
    assert_eq!(manager.graph().num_tools(), 0);
    assert!(manager.tools().is_empty());
}
