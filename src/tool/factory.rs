//! Tool class registry.

use super::{Tool, ToolError, ToolId, ToolInputAssignment, ToolLayout};
use log::{debug, warn};

/// Creates and destroys instances of one tool class.
pub trait ToolFactory {
    /// Stable class name, used in persisted configurations.
    fn class_name(&self) -> &str;

    /// Human readable name shown in class selection menus.
    fn display_name(&self) -> &str {
        self.class_name()
    }

    fn layout(&self) -> ToolLayout;

    /// Builds a tool instance bound to `assignment`.
    fn create(
        &self,
        id: ToolId,
        assignment: &ToolInputAssignment,
    ) -> Result<Box<dyn Tool>, ToolError>;

    /// Releases a tool instance previously returned by [`create`](Self::create).
    fn destroy(&self, tool: Box<dyn Tool>) {
        drop(tool);
    }
}

/// Registry of tool factories, looked up by class name.
///
/// Registration order is preserved and determines menu order.
#[derive(Default)]
pub struct ToolRegistry {
    factories: Vec<Box<dyn ToolFactory>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("classes", &self.class_names().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in tool classes.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        super::builtin::register_all(&mut registry);
        registry
    }

    /// Adds a factory, replacing any factory already registered under the same name.
    pub fn register(&mut self, factory: Box<dyn ToolFactory>) {
        let name = factory.class_name().to_string();
        if let Some(existing) = self
            .factories
            .iter_mut()
            .find(|existing| existing.class_name() == name)
        {
            warn!("Replacing tool factory for class '{}'", name);
            *existing = factory;
        } else {
            debug!("Registered tool class '{}'", name);
            self.factories.push(factory);
        }
    }

    pub fn get(&self, class: &str) -> Option<&dyn ToolFactory> {
        self.factories
            .iter()
            .find(|factory| factory.class_name() == class)
            .map(|factory| factory.as_ref())
    }

    pub fn lookup(&self, class: &str) -> Result<&dyn ToolFactory, ToolError> {
        self.get(class)
            .ok_or_else(|| ToolError::UnknownClass(class.to_string()))
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.factories.iter().map(|factory| factory.class_name())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
