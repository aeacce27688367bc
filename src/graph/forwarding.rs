//! Queries that follow device forwarding through the graph.
//!
//! A forwarding chain is only trustworthy as long as tools do not forward
//! onto themselves, so every walk here is capped at the number of tools in
//! the graph. Hitting the cap is logged and the walk stops.

use super::{Grabber, InputGraphManager};
use crate::device::{DeviceId, Feature};
use crate::tool::{ForwarderLookup, ToolId};
use log::warn;
use std::collections::HashSet;

/// One row of a tool stack: a feature reached from the base feature and the
/// tool bound to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStackEntry {
    pub depth: usize,
    pub feature: Feature,
    pub tool: Option<ToolId>,
}

impl InputGraphManager {
    /// Features the tool bound to `feature` forwards it to.
    pub fn forwarded_features<L>(&self, feature: Feature, lookup: &L) -> Vec<Feature>
    where
        L: ForwarderLookup + ?Sized,
    {
        self.bound_tool(feature)
            .and_then(|tool| lookup.forwarder(tool))
            .map(|forwarder| forwarder.forwarded_features(feature))
            .unwrap_or_default()
    }

    /// The forwarding tool that created `device`, if any.
    pub fn forwarding_tool<L>(&self, device: DeviceId, lookup: &L) -> Option<ToolId>
    where
        L: ForwarderLookup + ?Sized,
    {
        let forwards = |tool: ToolId| {
            lookup
                .forwarder(tool)
                .is_some_and(|forwarder| forwarder.source_device(device).is_some())
        };

        if let Some(Grabber::Tool(grabber)) = self.grabber(device) {
            if forwards(grabber) {
                return Some(grabber);
            }
        }
        let mut candidates: Vec<ToolId> = self.tools.keys().copied().collect();
        candidates.sort();
        candidates.into_iter().find(|tool| forwards(*tool))
    }

    /// Device that `forwarded` was derived from.
    pub fn source_device<L>(&self, forwarded: DeviceId, lookup: &L) -> Option<DeviceId>
    where
        L: ForwarderLookup + ?Sized,
    {
        let tool = self.forwarding_tool(forwarded, lookup)?;
        lookup.forwarder(tool)?.source_device(forwarded)
    }

    /// Bound features feeding the forwarded feature `forwarded`.
    pub fn source_features<L>(&self, forwarded: Feature, lookup: &L) -> Vec<Feature>
    where
        L: ForwarderLookup + ?Sized,
    {
        self.forwarding_tool(forwarded.device, lookup)
            .and_then(|tool| lookup.forwarder(tool))
            .map(|forwarder| forwarder.source_features(forwarded))
            .unwrap_or_default()
    }

    /// Follows [`source_device`](Self::source_device) back to a device that
    /// is not forwarded from anything.
    pub fn root_device<L>(&self, device: DeviceId, lookup: &L) -> DeviceId
    where
        L: ForwarderLookup + ?Sized,
    {
        let mut current = device;
        for _ in 0..=self.tools.len() {
            match self.source_device(current, lookup) {
                Some(source) if source != current => current = source,
                _ => return current,
            }
        }
        warn!("Forwarding cycle while tracing root of {}", device);
        current
    }

    /// Depth-first search for an unbound feature reachable from `start`.
    ///
    /// Returns `start` itself if it is unbound. Otherwise, if its tool is a
    /// forwarder, the forwarded features are searched, first-declared first.
    /// Has no side effects.
    pub fn find_first_unassigned_feature<L>(&self, start: Feature, lookup: &L) -> Option<Feature>
    where
        L: ForwarderLookup + ?Sized,
    {
        let max_depth = self.tools.len();
        let mut visited = HashSet::new();
        let mut stack = vec![(start, 0usize)];

        while let Some((feature, depth)) = stack.pop() {
            if !visited.insert(feature) {
                continue;
            }
            let Ok(slot) = self.slot(feature) else {
                continue;
            };
            let Some(tool) = slot.bound_tool else {
                return Some(feature);
            };
            let Some(forwarder) = lookup.forwarder(tool) else {
                continue;
            };
            if depth >= max_depth {
                warn!(
                    "Forwarding chain from {} deeper than {} tools; truncating search",
                    start, max_depth
                );
                continue;
            }
            let forwarded = forwarder.forwarded_features(feature);
            stack.extend(forwarded.into_iter().rev().map(|f| (f, depth + 1)));
        }
        None
    }

    /// The last tool in the forwarding chain that starts at `feature`.
    ///
    /// From the bound tool, repeatedly moves to the first forwarded feature
    /// that has a tool of its own.
    pub fn terminal_tool<L>(&self, feature: Feature, lookup: &L) -> Option<ToolId>
    where
        L: ForwarderLookup + ?Sized,
    {
        let mut current = feature;
        let mut tool = self.bound_tool(feature)?;
        for _ in 0..=self.tools.len() {
            let Some(forwarder) = lookup.forwarder(tool) else {
                return Some(tool);
            };
            let next = forwarder
                .forwarded_features(current)
                .into_iter()
                .find_map(|f| self.bound_tool(f).map(|t| (f, t)));
            match next {
                Some((next_feature, next_tool)) if next_tool != tool => {
                    current = next_feature;
                    tool = next_tool;
                }
                _ => return Some(tool),
            }
        }
        warn!("Forwarding cycle while resolving terminal tool of {}", feature);
        Some(tool)
    }

    /// Every feature reachable from `base` through forwarding, pre-order.
    pub fn tool_stack<L>(&self, base: Feature, lookup: &L) -> Vec<ToolStackEntry>
    where
        L: ForwarderLookup + ?Sized,
    {
        let max_depth = self.tools.len();
        let mut visited = HashSet::new();
        let mut entries = Vec::new();
        let mut stack = vec![(base, 0usize)];

        while let Some((feature, depth)) = stack.pop() {
            if !visited.insert(feature) {
                continue;
            }
            let tool = self.bound_tool(feature);
            entries.push(ToolStackEntry {
                depth,
                feature,
                tool,
            });
            if depth >= max_depth {
                continue;
            }
            let forwarded = self.forwarded_features(feature, lookup);
            stack.extend(forwarded.into_iter().rev().map(|f| (f, depth + 1)));
        }
        entries
    }
}
