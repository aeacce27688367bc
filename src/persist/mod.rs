//! Saving and restoring the input graph.
//!
//! A configuration is a flat list of sections replayed top to bottom.
//! Device sections describe framework-owned virtual devices; tool sections
//! name a tool class and its bindings. Bindings reference devices either by
//! a real device's name or by the name of an earlier section that created
//! the device (a device section, or a tool section whose tool forwards onto
//! new devices: `"Tool2"` for its first forwarded device, `"Tool2:1"` for the
//! second, and so on).

use crate::device::{DeviceId, DeviceOrigin, DeviceSpec, Feature, InputDevice, Transform};
use crate::manager::ToolManager;
use crate::tool::{ToolError, ToolId, ToolInputAssignment};
use anyhow::{Context, Result};
use chrono::Utc;
use fs2::FileExt;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CURRENT_VERSION: u32 = 1;

/// Serialisable description of the virtual devices and tools of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphConfiguration {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, rename = "section")]
    pub sections: Vec<ConfigSection>,
}

impl Default for GraphConfiguration {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            last_modified: None,
            sections: Vec::new(),
        }
    }
}

impl GraphConfiguration {
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn device_sections(&self) -> impl Iterator<Item = &DeviceSection> + '_ {
        self.sections.iter().filter_map(|section| match section {
            ConfigSection::Device(device) => Some(device),
            ConfigSection::Tool(_) => None,
        })
    }

    pub fn tool_sections(&self) -> impl Iterator<Item = &ToolSection> + '_ {
        self.sections.iter().filter_map(|section| match section {
            ConfigSection::Tool(tool) => Some(tool),
            ConfigSection::Device(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigSection {
    Device(DeviceSection),
    Tool(ToolSection),
}

impl ConfigSection {
    pub fn name(&self) -> &str {
        match self {
            ConfigSection::Device(device) => &device.name,
            ConfigSection::Tool(tool) => &tool.name,
        }
    }
}

/// A framework-owned virtual device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSection {
    pub name: String,
    pub num_buttons: usize,
    pub num_valuators: usize,
    #[serde(default)]
    pub navigational: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub button_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valuator_names: Vec<String>,
    #[serde(default)]
    pub transform: Transform,
}

/// A tool instance and its bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSection {
    pub name: String,
    pub tool_class: String,
    /// Groups of `[device, feature, feature, ...]`, in slot order.
    #[serde(default)]
    pub bindings: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<toml::Table>,
}

/// Problems with individual sections; the section is skipped.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("configuration version {0} is not supported")]
    UnsupportedVersion(u32),

    #[error("section '{0}' is defined twice")]
    DuplicateSection(String),

    #[error("section '{section}': empty binding group")]
    EmptyBinding { section: String },

    #[error("section '{section}': unknown device '{device}'")]
    UnknownDevice { section: String, device: String },

    #[error("section '{section}': device '{device}' has no feature '{feature}'")]
    UnknownFeature {
        section: String,
        device: String,
        feature: String,
    },

    #[error("section '{section}': feature {feature} and everything it forwards to is taken")]
    FeatureUnavailable { section: String, feature: Feature },

    #[error("section '{section}': {source}")]
    Tool {
        section: String,
        #[source]
        source: ToolError,
    },
}

/// Outcome of replaying a configuration.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub devices: Vec<DeviceId>,
    pub tools: Vec<ToolId>,
    pub skipped: Vec<LoadError>,
}

/// Describes the current virtual devices and tools of `manager`.
///
/// Tools are written in graph level order, so a forwarding tool always
/// precedes the tools bound to the devices it forwards onto.
pub fn configuration_from_manager(manager: &ToolManager) -> GraphConfiguration {
    let devices = manager.devices();
    let real_names: HashSet<&str> = devices
        .iter()
        .filter(|device| device.origin() == DeviceOrigin::Real)
        .map(|device| device.name())
        .collect();
    let mut used: HashSet<String> = HashSet::new();
    let mut refs: HashMap<DeviceId, String> = HashMap::new();
    let mut sections = Vec::new();

    for device in devices.iter() {
        match device.origin() {
            DeviceOrigin::Real => {
                refs.insert(device.id(), device.name().to_string());
            }
            DeviceOrigin::Virtual => {
                let name = unique_name(device.name(), 0, &real_names, &used);
                used.insert(name.clone());
                refs.insert(device.id(), name.clone());
                sections.push(ConfigSection::Device(DeviceSection {
                    name,
                    num_buttons: device.num_buttons(),
                    num_valuators: device.num_valuators(),
                    navigational: manager.graph().is_navigational(device.id()),
                    button_names: custom_names(
                        (0..device.num_buttons()).map(|i| Feature::button(device.id(), i)),
                        device,
                    ),
                    valuator_names: custom_names(
                        (0..device.num_valuators()).map(|i| Feature::valuator(device.id(), i)),
                        device,
                    ),
                    transform: device.transform,
                }));
            }
            DeviceOrigin::Forwarded(_) => {}
        }
    }

    for (index, tool_id) in manager.graph().tools_by_level().into_iter().enumerate() {
        let (Some(tool), Some(assignment)) =
            (manager.tool(tool_id), manager.graph().assignment(tool_id))
        else {
            continue;
        };
        let forwarded = manager.forwarded_devices(tool_id);
        let name = unique_name(&format!("Tool{index}"), forwarded.len(), &real_names, &used);
        used.insert(name.clone());

        for (k, device) in forwarded.into_iter().enumerate() {
            let reference = if k == 0 {
                name.clone()
            } else {
                format!("{name}:{k}")
            };
            used.insert(reference.clone());
            refs.insert(device, reference);
        }

        let mut bindings: Vec<Vec<String>> = Vec::new();
        let mut current: Option<DeviceId> = None;
        for feature in assignment.features() {
            let Some(feature_name) = devices.feature_name(feature) else {
                warn!("{} is bound to vanished {}; skipping", tool_id, feature);
                continue;
            };
            if current != Some(feature.device) || bindings.is_empty() {
                let reference = refs.get(&feature.device).cloned().unwrap_or_else(|| {
                    let fallback = devices
                        .get(feature.device)
                        .map_or_else(|| feature.device.to_string(), |d| d.name().to_string());
                    warn!(
                        "No section creates {}; referencing it as '{}'",
                        feature.device, fallback
                    );
                    fallback
                });
                bindings.push(vec![reference]);
                current = Some(feature.device);
            }
            if let Some(group) = bindings.last_mut() {
                group.push(feature_name);
            }
        }

        sections.push(ConfigSection::Tool(ToolSection {
            name,
            tool_class: tool.class_name().to_string(),
            bindings,
            state: tool.store_state(),
        }));
    }

    GraphConfiguration {
        version: CURRENT_VERSION,
        last_modified: Some(Utc::now().to_rfc3339()),
        sections,
    }
}

/// Replays `config` into `manager`.
///
/// Sections that cannot be applied are logged and skipped; only an
/// unsupported version aborts the whole load.
pub fn apply_configuration(
    manager: &mut ToolManager,
    config: &GraphConfiguration,
) -> Result<LoadReport, LoadError> {
    if config.version > CURRENT_VERSION {
        return Err(LoadError::UnsupportedVersion(config.version));
    }

    let mut report = LoadReport::default();
    let mut names: HashMap<String, DeviceId> = HashMap::new();

    for section in &config.sections {
        if names.contains_key(section.name()) {
            warn!("Skipping duplicate section '{}'", section.name());
            report
                .skipped
                .push(LoadError::DuplicateSection(section.name().to_string()));
            continue;
        }
        match section {
            ConfigSection::Device(device) => {
                let id = apply_device_section(manager, device);
                names.insert(device.name.clone(), id);
                report.devices.push(id);
            }
            ConfigSection::Tool(tool) => match apply_tool_section(manager, &names, tool) {
                Ok(id) => {
                    for (k, device) in manager.forwarded_devices(id).into_iter().enumerate() {
                        let reference = if k == 0 {
                            tool.name.clone()
                        } else {
                            format!("{}:{}", tool.name, k)
                        };
                        names.insert(reference, device);
                    }
                    report.tools.push(id);
                }
                Err(err) => {
                    warn!("Skipping tool section: {}", err);
                    report.skipped.push(err);
                }
            },
        }
    }

    info!(
        "Loaded input graph: {} device(s), {} tool(s), {} section(s) skipped",
        report.devices.len(),
        report.tools.len(),
        report.skipped.len()
    );
    Ok(report)
}

fn apply_device_section(manager: &mut ToolManager, section: &DeviceSection) -> DeviceId {
    let spec = DeviceSpec::new(
        section.name.clone(),
        section.num_buttons,
        section.num_valuators,
    )
    .with_button_names(section.button_names.iter().cloned())
    .with_valuator_names(section.valuator_names.iter().cloned())
    .with_transform(section.transform);
    let id = manager.add_virtual_device(spec);
    manager.set_navigational(id, section.navigational);
    debug!("Created virtual device '{}' as {}", section.name, id);
    id
}

fn apply_tool_section(
    manager: &mut ToolManager,
    names: &HashMap<String, DeviceId>,
    section: &ToolSection,
) -> Result<ToolId, LoadError> {
    let tool_error = |source: ToolError| LoadError::Tool {
        section: section.name.clone(),
        source,
    };
    let layout = manager
        .registry()
        .lookup(&section.tool_class)
        .map_err(tool_error)?
        .layout();

    let mut assignment = ToolInputAssignment::new(layout);
    for group in &section.bindings {
        let Some((device_name, feature_names)) = group.split_first() else {
            return Err(LoadError::EmptyBinding {
                section: section.name.clone(),
            });
        };
        let device = names
            .get(device_name)
            .copied()
            .or_else(|| manager.devices().find_by_name(device_name))
            .and_then(|id| manager.devices().get(id))
            .ok_or_else(|| LoadError::UnknownDevice {
                section: section.name.clone(),
                device: device_name.clone(),
            })?;

        for feature_name in feature_names {
            let feature =
                device
                    .parse_feature(feature_name)
                    .ok_or_else(|| LoadError::UnknownFeature {
                        section: section.name.clone(),
                        device: device_name.clone(),
                        feature: feature_name.clone(),
                    })?;
            let resolved = manager
                .graph()
                .find_first_unassigned_feature(feature, manager.tools())
                .ok_or_else(|| LoadError::FeatureUnavailable {
                    section: section.name.clone(),
                    feature,
                })?;
            assignment.push(resolved).map_err(tool_error)?;
        }
    }

    manager
        .create_tool(&section.tool_class, assignment, section.state.as_ref())
        .map_err(tool_error)
}

/// Writes `config` to `path` atomically under an exclusive advisory lock.
pub fn save_configuration(config: &GraphConfiguration, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let lock_path = lock_file_path(path);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;
    lock_file
        .lock_exclusive()
        .with_context(|| format!("failed to lock {}", lock_path.display()))?;

    let result = save_configuration_inner(config, path);

    lock_file.unlock().unwrap_or_else(|err| {
        warn!("failed to unlock {}: {}", lock_path.display(), err)
    });
    result
}

fn save_configuration_inner(config: &GraphConfiguration, path: &Path) -> Result<()> {
    let text = config
        .to_toml()
        .context("failed to serialise input graph configuration")?;

    let tmp_path = temp_path(path);
    {
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to open temporary file {}", tmp_path.display()))?;
        tmp_file
            .write_all(text.as_bytes())
            .context("failed to write input graph configuration")?;
        tmp_file
            .sync_all()
            .context("failed to sync temporary configuration file")?;
    }

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "failed to move temporary file {} -> {}",
            tmp_path.display(),
            path.display()
        )
    })?;

    info!(
        "Saved input graph to {} ({} sections)",
        path.display(),
        config.sections.len()
    );
    Ok(())
}

/// Reads a configuration under a shared advisory lock.
pub fn load_configuration(path: &Path) -> Result<GraphConfiguration> {
    let lock_path = lock_file_path(path);
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;
    lock_file
        .lock_shared()
        .with_context(|| format!("failed to acquire shared lock {}", lock_path.display()))?;

    let result = fs::read_to_string(path)
        .with_context(|| format!("failed to read input graph file {}", path.display()))
        .and_then(|text| {
            GraphConfiguration::from_toml(&text)
                .with_context(|| format!("failed to parse input graph file {}", path.display()))
        });

    lock_file.unlock().unwrap_or_else(|err| {
        warn!("failed to unlock {}: {}", lock_path.display(), err)
    });
    result
}

/// Saves the current graph of `manager` to `path`.
pub fn save_manager(manager: &ToolManager, path: &Path) -> Result<()> {
    save_configuration(&configuration_from_manager(manager), path)
}

/// Loads `path` and replays it into `manager`.
pub fn load_into_manager(manager: &mut ToolManager, path: &Path) -> Result<LoadReport> {
    let config = load_configuration(path)?;
    apply_configuration(manager, &config)
        .with_context(|| format!("failed to apply input graph file {}", path.display()))
}

/// First of `base`, `base_1`, `base_2`, ... that is free together with the
/// `name:k` references of its further forwarded devices.
fn unique_name(
    base: &str,
    forwarded: usize,
    reserved: &HashSet<&str>,
    used: &HashSet<String>,
) -> String {
    let taken = |name: &str| reserved.contains(name) || used.contains(name);
    let free = |candidate: &str| {
        !taken(candidate) && (1..forwarded).all(|k| !taken(&format!("{candidate}:{k}")))
    };
    if free(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| free(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Feature names worth saving: empty if every name is the generated default.
fn custom_names(features: impl Iterator<Item = Feature>, device: &InputDevice) -> Vec<String> {
    let mut custom = false;
    let names: Vec<String> = features
        .map(|feature| {
            let generated = format!("{}{}", feature.kind.prefix(), feature.index);
            let name = device.feature_name(feature).unwrap_or_else(|| generated.clone());
            custom |= name != generated;
            name
        })
        .collect();
    if custom { names } else { Vec::new() }
}

fn lock_file_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn temp_path(target: &Path) -> PathBuf {
    let mut candidate = target.with_extension("toml.tmp");
    let mut counter = 0u32;
    while candidate.exists() {
        counter += 1;
        candidate = target.with_extension(format!("toml.tmp{counter}"));
    }
    candidate
}

#[cfg(test)]
mod tests;
