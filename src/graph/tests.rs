use super::*;
use crate::tool::{ForwardingMap, NoForwarders, ToolLayout};

fn dev(n: u32) -> DeviceId {
    DeviceId(n)
}

fn tool(n: u32) -> ToolId {
    ToolId(n)
}

fn buttons(features: &[Feature]) -> ToolInputAssignment {
    let mut assignment = ToolInputAssignment::new(ToolLayout::new(0, 0).with_optional_buttons());
    for feature in features {
        assignment.push(*feature).unwrap();
    }
    assignment
}

/// Device 1 (real), tool 1 on it grabbing device 2, tool 2 on device 2.
fn chain() -> InputGraphManager {
    let mut graph = InputGraphManager::new();
    graph.add_device(dev(1), 2, 0);
    graph.add_device(dev(2), 2, 0);
    graph
        .add_tool(tool(1), buttons(&[Feature::button(dev(1), 0)]))
        .unwrap();
    assert!(graph.grab(dev(2), Grabber::Tool(tool(1))));
    graph
        .add_tool(tool(2), buttons(&[Feature::button(dev(2), 0)]))
        .unwrap();
    graph
}

#[test]
fn new_devices_start_on_level_zero() {
    let mut graph = InputGraphManager::new();
    assert!(graph.add_device(dev(1), 3, 1));
    assert!(!graph.add_device(dev(1), 3, 1));

    assert_eq!(graph.device_level(dev(1)), Some(0));
    assert_eq!(graph.num_levels(), 1);
    assert!(graph.levels_consistent());
}

#[test]
fn grabbed_device_sits_above_its_grabber() {
    let graph = chain();

    assert_eq!(graph.device_level(dev(1)), Some(0));
    assert_eq!(graph.tool_level(tool(1)), Some(0));
    assert_eq!(graph.device_level(dev(2)), Some(1));
    assert_eq!(graph.tool_level(tool(2)), Some(1));
    assert_eq!(graph.num_levels(), 2);
    assert!(graph.levels_consistent());
}

#[test]
fn tool_level_is_max_of_its_devices() {
    let mut graph = chain();
    graph.add_device(dev(3), 1, 0);
    graph
        .add_tool(
            tool(3),
            buttons(&[Feature::button(dev(3), 0), Feature::button(dev(2), 1)]),
        )
        .unwrap();

    assert_eq!(graph.tool_level(tool(3)), Some(1));
    assert_eq!(graph.tools_at(1), vec![tool(2), tool(3)]);
}

#[test]
fn release_drops_device_back_to_level_zero() {
    let mut graph = chain();

    assert!(!graph.release(dev(2), Grabber::Tool(tool(2))));
    assert_eq!(graph.device_level(dev(2)), Some(1));

    assert!(graph.release(dev(2), Grabber::Tool(tool(1))));
    assert_eq!(graph.device_level(dev(2)), Some(0));
    assert_eq!(graph.tool_level(tool(2)), Some(0));
    assert_eq!(graph.num_levels(), 1);
}

#[test]
fn grab_fails_when_already_grabbed() {
    let mut graph = chain();
    graph.add_tool(tool(3), buttons(&[Feature::button(dev(1), 1)])).unwrap();

    assert!(!graph.grab(dev(2), Grabber::Tool(tool(3))));
    assert_eq!(graph.grabber(dev(2)), Some(Grabber::Tool(tool(1))));
}

#[test]
fn grab_refuses_dependency_cycles() {
    let mut graph = chain();
    // tool 2 sits on device 2, which tool 1 grabbed; tool 2 may not grab device 1.
    assert!(!graph.grab(dev(1), Grabber::Tool(tool(2))));
    assert!(!graph.grab(dev(1), Grabber::Tool(tool(1))));
    assert!(!graph.is_grabbed(dev(1)));
}

#[test]
fn framework_grab_keeps_level_zero() {
    let mut graph = InputGraphManager::new();
    graph.add_device(dev(1), 1, 0);

    assert!(graph.grab(dev(1), Grabber::Framework));
    assert_eq!(graph.device_level(dev(1)), Some(0));
    assert!(!graph.release(dev(1), Grabber::Tool(tool(1))));
    assert!(graph.release(dev(1), Grabber::Framework));
}

#[test]
fn add_tool_rejects_bound_slot_without_changes() {
    let mut graph = chain();
    let before = graph.clone();

    let err = graph
        .add_tool(
            tool(9),
            buttons(&[Feature::button(dev(1), 1), Feature::button(dev(1), 0)]),
        )
        .unwrap_err();

    assert_eq!(err, GraphError::SlotAlreadyAssigned(Feature::button(dev(1), 0)));
    assert!(!graph.contains_tool(tool(9)));
    assert_eq!(graph.bound_tool(Feature::button(dev(1), 1)), None);
    assert_eq!(graph.tools_by_level(), before.tools_by_level());
}

#[test]
fn add_tool_rejects_unknown_features() {
    let mut graph = chain();

    assert_eq!(
        graph.add_tool(tool(9), buttons(&[Feature::button(dev(7), 0)])),
        Err(GraphError::UnknownDevice(dev(7)))
    );
    assert_eq!(
        graph.add_tool(tool(9), buttons(&[Feature::button(dev(1), 5)])),
        Err(GraphError::InvalidFeature(Feature::button(dev(1), 5)))
    );
    assert_eq!(
        graph.add_tool(tool(1), buttons(&[Feature::button(dev(1), 1)])),
        Err(GraphError::DuplicateTool(tool(1)))
    );
}

#[test]
fn removing_a_tool_frees_its_slots_and_grabs() {
    let mut graph = chain();

    let assignment = graph.remove_tool(tool(1)).unwrap();
    assert_eq!(assignment.buttons(), &[Feature::button(dev(1), 0)]);
    assert_eq!(graph.bound_tool(Feature::button(dev(1), 0)), None);
    assert!(!graph.is_grabbed(dev(2)));
    assert_eq!(graph.tool_level(tool(2)), Some(0));
    assert!(graph.remove_tool(tool(1)).is_none());
}

#[test]
fn removing_a_device_cascades_to_bound_tools() {
    let mut graph = InputGraphManager::new();
    graph.add_device(dev(1), 2, 0);
    graph.add_device(dev(2), 2, 0);
    graph
        .add_tool(
            tool(1),
            buttons(&[Feature::button(dev(1), 0), Feature::button(dev(2), 0)]),
        )
        .unwrap();
    graph.add_tool(tool(2), buttons(&[Feature::button(dev(2), 1)])).unwrap();

    let removed = graph.remove_device(dev(1)).unwrap();

    assert_eq!(removed, vec![tool(1)]);
    assert!(!graph.contains_tool(tool(1)));
    assert_eq!(graph.bound_tool(Feature::button(dev(2), 0)), None);
    assert!(graph.contains_tool(tool(2)));
    assert!(graph.remove_device(dev(1)).is_none());
    assert!(graph.levels_consistent());
}

#[test]
fn removing_a_grabbed_chain_shrinks_levels() {
    let mut graph = chain();
    graph.remove_device(dev(2)).unwrap();

    assert!(!graph.contains_tool(tool(2)));
    assert_eq!(graph.num_levels(), 1);
}

#[test]
fn multi_hop_chain_resolves_in_one_call() {
    let mut graph = InputGraphManager::new();
    for n in 1..=4 {
        graph.add_device(dev(n), 1, 0);
    }
    // Build the chain top-down so every grab has to lift already-placed nodes.
    graph.add_tool(tool(3), buttons(&[Feature::button(dev(3), 0)])).unwrap();
    assert!(graph.grab(dev(4), Grabber::Tool(tool(3))));
    graph.add_tool(tool(2), buttons(&[Feature::button(dev(2), 0)])).unwrap();
    assert!(graph.grab(dev(3), Grabber::Tool(tool(2))));
    graph.add_tool(tool(1), buttons(&[Feature::button(dev(1), 0)])).unwrap();
    assert!(graph.grab(dev(2), Grabber::Tool(tool(1))));

    assert_eq!(graph.device_level(dev(4)), Some(3));
    assert_eq!(graph.tool_level(tool(3)), Some(2));
    assert_eq!(graph.num_levels(), 4);
    assert!(graph.levels_consistent());
}

#[test]
fn level_maintenance_is_idempotent() {
    let mut graph = chain();
    assert_eq!(graph.maintain_levels(), 0);
    assert!(graph.release(dev(2), Grabber::Tool(tool(1))));
    assert_eq!(graph.maintain_levels(), 0);
}

#[test]
fn first_unassigned_feature_is_start_when_unbound() {
    let graph = chain();
    let free = Feature::button(dev(1), 1);
    assert_eq!(graph.find_first_unassigned_feature(free, &NoForwarders), Some(free));
    assert_eq!(
        graph.find_first_unassigned_feature(Feature::button(dev(1), 0), &NoForwarders),
        None
    );
}

#[test]
fn first_unassigned_feature_follows_forwarding_in_declared_order() {
    let mut graph = chain();
    let mut forwarders = HashMap::new();
    let mut map = ForwardingMap::new();
    map.add_device(dev(2), dev(1));
    map.link(Feature::button(dev(1), 0), Feature::button(dev(2), 0));
    map.link(Feature::button(dev(1), 0), Feature::button(dev(2), 1));
    forwarders.insert(tool(1), map);

    // Button 0 of device 2 is taken by tool 2, so button 1 is the first free one.
    assert_eq!(
        graph.find_first_unassigned_feature(Feature::button(dev(1), 0), &forwarders),
        Some(Feature::button(dev(2), 1))
    );

    graph.remove_tool(tool(2));
    assert_eq!(
        graph.find_first_unassigned_feature(Feature::button(dev(1), 0), &forwarders),
        Some(Feature::button(dev(2), 0))
    );
}

#[test]
fn forwarding_cycle_search_terminates() {
    let mut graph = InputGraphManager::new();
    graph.add_device(dev(1), 1, 0);
    graph.add_device(dev(2), 1, 0);
    graph.add_tool(tool(1), buttons(&[Feature::button(dev(1), 0)])).unwrap();
    graph.add_tool(tool(2), buttons(&[Feature::button(dev(2), 0)])).unwrap();

    let mut forwarders = HashMap::new();
    let mut a = ForwardingMap::new();
    a.add_device(dev(2), dev(1));
    a.link(Feature::button(dev(1), 0), Feature::button(dev(2), 0));
    let mut b = ForwardingMap::new();
    b.add_device(dev(1), dev(2));
    b.link(Feature::button(dev(2), 0), Feature::button(dev(1), 0));
    forwarders.insert(tool(1), a);
    forwarders.insert(tool(2), b);

    assert_eq!(
        graph.find_first_unassigned_feature(Feature::button(dev(1), 0), &forwarders),
        None
    );
    assert_eq!(
        graph.terminal_tool(Feature::button(dev(1), 0), &forwarders),
        Some(tool(2))
    );
    let root = graph.root_device(dev(1), &forwarders);
    assert!(root == dev(1) || root == dev(2));
    assert_eq!(
        graph.tool_stack(Feature::button(dev(1), 0), &forwarders).len(),
        2
    );
}

#[test]
fn source_queries_invert_forwarding() {
    let graph = chain();
    let mut forwarders = HashMap::new();
    let mut map = ForwardingMap::new();
    map.add_device(dev(2), dev(1));
    map.link(Feature::button(dev(1), 0), Feature::button(dev(2), 0));
    forwarders.insert(tool(1), map);

    assert_eq!(graph.source_device(dev(2), &forwarders), Some(dev(1)));
    assert_eq!(graph.source_device(dev(1), &forwarders), None);
    assert_eq!(graph.root_device(dev(2), &forwarders), dev(1));
    assert_eq!(
        graph.source_features(Feature::button(dev(2), 0), &forwarders),
        vec![Feature::button(dev(1), 0)]
    );
    assert_eq!(
        graph.forwarded_features(Feature::button(dev(1), 0), &forwarders),
        vec![Feature::button(dev(2), 0)]
    );
    assert_eq!(
        graph.terminal_tool(Feature::button(dev(1), 0), &forwarders),
        Some(tool(2))
    );
}
