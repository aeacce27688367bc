//! Input device enumeration and feature state.
//!
//! The [`DeviceRegistry`] knows every device the framework exposes, real or
//! virtual, how many buttons and valuators each carries and what they are
//! called. Feature state changes are recorded here and queued as
//! [`FeatureEvent`]s; the tool manager drains that queue once per dispatch
//! pass so no callback ever runs re-entrantly.

mod feature;

pub use feature::{DeviceId, Feature, FeatureEvent, FeatureKind, FeatureValue, Transform};

use crate::graph::GraphError;
use crate::tool::ToolId;
use log::debug;
use std::collections::{HashMap, VecDeque};

/// Where a device came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOrigin {
    /// A physical device reported by the driver layer.
    Real,
    /// A virtual device owned by the framework itself.
    Virtual,
    /// A virtual device created by a forwarding tool.
    Forwarded(ToolId),
}

/// Layout description used to register a device.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub name: String,
    pub num_buttons: usize,
    pub num_valuators: usize,
    pub button_names: Vec<String>,
    pub valuator_names: Vec<String>,
    pub transform: Transform,
}

impl DeviceSpec {
    pub fn new(name: impl Into<String>, num_buttons: usize, num_valuators: usize) -> Self {
        Self {
            name: name.into(),
            num_buttons,
            num_valuators,
            button_names: Vec::new(),
            valuator_names: Vec::new(),
            transform: Transform::IDENTITY,
        }
    }

    pub fn with_button_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.button_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_valuator_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valuator_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}

/// A registered device together with its current feature state.
#[derive(Debug, Clone)]
pub struct InputDevice {
    id: DeviceId,
    name: String,
    origin: DeviceOrigin,
    buttons: Vec<bool>,
    valuators: Vec<f64>,
    button_names: Vec<String>,
    valuator_names: Vec<String>,
    pub transform: Transform,
}

impl InputDevice {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> DeviceOrigin {
        self.origin
    }

    pub fn num_buttons(&self) -> usize {
        self.buttons.len()
    }

    pub fn num_valuators(&self) -> usize {
        self.valuators.len()
    }

    /// Total number of features, buttons first.
    pub fn num_features(&self) -> usize {
        self.buttons.len() + self.valuators.len()
    }

    pub fn button_state(&self, index: usize) -> Option<bool> {
        self.buttons.get(index).copied()
    }

    pub fn valuator_state(&self, index: usize) -> Option<f64> {
        self.valuators.get(index).copied()
    }

    /// Kind of the feature at flat `slot_index` (buttons first).
    pub fn feature_kind(&self, slot_index: usize) -> Option<FeatureKind> {
        if slot_index < self.buttons.len() {
            Some(FeatureKind::Button)
        } else if slot_index < self.num_features() {
            Some(FeatureKind::Valuator)
        } else {
            None
        }
    }

    /// Converts a flat slot index into a feature reference.
    pub fn feature_at(&self, slot_index: usize) -> Option<Feature> {
        match self.feature_kind(slot_index)? {
            FeatureKind::Button => Some(Feature::button(self.id, slot_index)),
            FeatureKind::Valuator => Some(Feature::valuator(
                self.id,
                slot_index - self.buttons.len(),
            )),
        }
    }

    /// Whether `feature` addresses an existing feature on this device.
    pub fn contains(&self, feature: Feature) -> bool {
        feature.device == self.id
            && match feature.kind {
                FeatureKind::Button => feature.index < self.buttons.len(),
                FeatureKind::Valuator => feature.index < self.valuators.len(),
            }
    }

    /// Iterates every feature on this device, buttons first.
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        (0..self.num_features()).filter_map(|slot| self.feature_at(slot))
    }

    /// Display name of a feature; custom names win over `Button<n>`/`Valuator<n>`.
    pub fn feature_name(&self, feature: Feature) -> Option<String> {
        if !self.contains(feature) {
            return None;
        }
        let custom = match feature.kind {
            FeatureKind::Button => self.button_names.get(feature.index),
            FeatureKind::Valuator => self.valuator_names.get(feature.index),
        };
        Some(match custom {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}{}", feature.kind.prefix(), feature.index),
        })
    }

    /// Resolves a feature name produced by [`feature_name`](Self::feature_name).
    pub fn parse_feature(&self, name: &str) -> Option<Feature> {
        let name = name.trim();
        if let Some(index) = self.button_names.iter().position(|n| n == name) {
            if index < self.buttons.len() {
                return Some(Feature::button(self.id, index));
            }
        }
        if let Some(index) = self.valuator_names.iter().position(|n| n == name) {
            if index < self.valuators.len() {
                return Some(Feature::valuator(self.id, index));
            }
        }

        for kind in [FeatureKind::Button, FeatureKind::Valuator] {
            if let Some(rest) = name.strip_prefix(kind.prefix()) {
                if let Ok(index) = rest.parse::<usize>() {
                    let feature = Feature {
                        device: self.id,
                        kind,
                        index,
                    };
                    if self.contains(feature) {
                        return Some(feature);
                    }
                }
            }
        }
        None
    }
}

/// Registry of all devices known to the framework.
#[derive(Debug)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, InputDevice>,
    order: Vec<DeviceId>,
    next_id: u32,
    pending: VecDeque<FeatureEvent>,
    callbacks_enabled: bool,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: HashMap::new(),
            order: Vec::new(),
            next_id: 1,
            pending: VecDeque::new(),
            callbacks_enabled: true,
        }
    }

    /// Registers a device and returns its new identifier.
    pub fn add(&mut self, spec: DeviceSpec, origin: DeviceOrigin) -> DeviceId {
        let id = DeviceId(self.next_id);
        self.next_id += 1;

        let device = InputDevice {
            id,
            name: spec.name,
            origin,
            buttons: vec![false; spec.num_buttons],
            valuators: vec![0.0; spec.num_valuators],
            button_names: spec.button_names,
            valuator_names: spec.valuator_names,
            transform: spec.transform,
        };
        debug!(
            "Registered {:?} device '{}' as {} ({} buttons, {} valuators)",
            origin,
            device.name,
            id,
            device.num_buttons(),
            device.num_valuators()
        );
        self.devices.insert(id, device);
        self.order.push(id);
        id
    }

    /// Unregisters a device, dropping any events still queued for it.
    pub fn remove(&mut self, id: DeviceId) -> Option<InputDevice> {
        let device = self.devices.remove(&id)?;
        self.order.retain(|other| *other != id);
        self.pending.retain(|event| event.feature.device != id);
        Some(device)
    }

    pub fn get(&self, id: DeviceId) -> Option<&InputDevice> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut InputDevice> {
        self.devices.get_mut(&id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates devices in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &InputDevice> + '_ {
        self.order.iter().filter_map(|id| self.devices.get(id))
    }

    /// Finds the first device registered under `name`.
    pub fn find_by_name(&self, name: &str) -> Option<DeviceId> {
        self.iter()
            .find(|device| device.name == name)
            .map(|device| device.id)
    }

    pub fn num_features(&self, id: DeviceId) -> Option<usize> {
        self.get(id).map(InputDevice::num_features)
    }

    pub fn feature_name(&self, feature: Feature) -> Option<String> {
        self.get(feature.device)?.feature_name(feature)
    }

    /// Validates that `feature` exists.
    pub fn check_feature(&self, feature: Feature) -> Result<(), GraphError> {
        let device = self
            .get(feature.device)
            .ok_or(GraphError::UnknownDevice(feature.device))?;
        if device.contains(feature) {
            Ok(())
        } else {
            Err(GraphError::InvalidFeature(feature))
        }
    }

    /// Updates a button and queues an event if its state changed.
    pub fn set_button(&mut self, feature: Feature, pressed: bool) -> Result<(), GraphError> {
        self.check_feature(feature)?;
        if !feature.is_button() {
            return Err(GraphError::InvalidFeature(feature));
        }
        let device = self
            .devices
            .get_mut(&feature.device)
            .ok_or(GraphError::UnknownDevice(feature.device))?;
        if device.buttons[feature.index] != pressed {
            device.buttons[feature.index] = pressed;
            self.pending.push_back(FeatureEvent {
                feature,
                value: FeatureValue::Button(pressed),
            });
        }
        Ok(())
    }

    /// Updates a valuator (clamped to `[-1, 1]`) and queues an event if it changed.
    pub fn set_valuator(&mut self, feature: Feature, value: f64) -> Result<(), GraphError> {
        self.check_feature(feature)?;
        if !feature.is_valuator() {
            return Err(GraphError::InvalidFeature(feature));
        }
        let value = value.clamp(-1.0, 1.0);
        let device = self
            .devices
            .get_mut(&feature.device)
            .ok_or(GraphError::UnknownDevice(feature.device))?;
        if device.valuators[feature.index] != value {
            device.valuators[feature.index] = value;
            self.pending.push_back(FeatureEvent {
                feature,
                value: FeatureValue::Valuator(value),
            });
        }
        Ok(())
    }

    /// Holds back queued events until [`enable_callbacks`](Self::enable_callbacks).
    pub fn disable_callbacks(&mut self) {
        self.callbacks_enabled = false;
    }

    pub fn enable_callbacks(&mut self) {
        self.callbacks_enabled = true;
    }

    pub fn callbacks_enabled(&self) -> bool {
        self.callbacks_enabled
    }

    /// Pops the oldest queued event, if callbacks are enabled.
    pub fn next_event(&mut self) -> Option<FeatureEvent> {
        if self.callbacks_enabled {
            self.pending.pop_front()
        } else {
            None
        }
    }

    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }
}
