//! Tool provider registry: configured tool names mapped to factories.
//!
//! The `tools` section of the configuration declares named tool instances. Agents refer to them
//! by that name; an agent asking for a name the provider does not know gets a warning and runs
//! without the tool.
//!
//! Built-in tool kinds:
//!
//! | Kind         | Required parameters | Optional parameters                        |
//! |--------------|---------------------|--------------------------------------------|
//! | `FileSystem` | `basepath`          | `extensions` (comma separated, e.g. `md,txt`) |
//!
//! The kind is taken from the configured `name`, compared case-insensitively.

use crate::config::ToolSettings;
use crate::tool_protocol::ToolProtocol;
use crate::tools::FileSystemTool;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a tool instance on demand.
pub type ToolConstructor = Arc<dyn Fn() -> Arc<dyn ToolProtocol> + Send + Sync>;

/// Registry of tool factories keyed by configured tool name.
#[derive(Clone, Default)]
pub struct ToolFactory {
    factories: HashMap<String, ToolConstructor>,
}

impl ToolFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build factories for every usable entry in `settings`, warning about the rest.
    pub fn from_settings(settings: &[ToolSettings]) -> Self {
        let mut factory = Self::new();
        for tool in settings {
            if factory.factories.contains_key(&tool.name) {
                log::warn!(
                    "conclave::tool_provider: tool '{}' is defined more than once, keeping the first definition",
                    tool.name
                );
                continue;
            }

            match tool.name.to_lowercase().as_str() {
                "filesystem" => {
                    if let Some(protocol) = build_filesystem(tool) {
                        factory.register(tool.name.clone(), move || protocol.clone());
                    }
                }
                _ => log::warn!(
                    "conclave::tool_provider: tool '{}' is not supported and was skipped",
                    tool.name
                ),
            }
        }
        factory
    }

    /// Register (or replace) a factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn ToolProtocol> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(constructor));
    }

    /// Instantiate the tool registered under `name`.
    pub fn create(&self, name: &str) -> Option<Arc<dyn ToolProtocol>> {
        self.factories.get(name).map(|constructor| constructor())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

fn build_filesystem(settings: &ToolSettings) -> Option<Arc<dyn ToolProtocol>> {
    let base = match settings.parameters.get("basepath") {
        Some(base) if !base.trim().is_empty() => base,
        _ => {
            log::warn!(
                "conclave::tool_provider: tool '{}' requires a 'basepath' parameter and was skipped",
                settings.name
            );
            return None;
        }
    };

    let mut tool = match FileSystemTool::new(base) {
        Ok(tool) => tool,
        Err(e) => {
            log::warn!(
                "conclave::tool_provider: tool '{}' was skipped: {}",
                settings.name,
                e
            );
            return None;
        }
    };

    if let Some(extensions) = settings.parameters.get("extensions") {
        let allowed: Vec<String> = extensions
            .split(',')
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if !allowed.is_empty() {
            tool = tool.with_allowed_extensions(allowed);
        }
    }

    log::info!(
        "conclave::tool_provider: tool '{}' sandboxed to {}",
        settings.name,
        tool.base_dir().display()
    );
    Some(Arc::new(tool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(name: &str, params: &[(&str, &str)]) -> ToolSettings {
        ToolSettings {
            name: name.to_string(),
            description: String::new(),
            parameters: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_filesystem_tool_is_built() {
        let dir = TempDir::new().unwrap();
        let factory = ToolFactory::from_settings(&[settings(
            "FileSystem",
            &[("basepath", dir.path().to_str().unwrap())],
        )]);
        let tool = factory.create("FileSystem").unwrap();
        assert_eq!(tool.protocol_name(), "filesystem");
        assert_eq!(tool.list_tools().len(), 3);
    }

    #[test]
    fn test_unusable_entries_are_skipped() {
        let dir = TempDir::new().unwrap();
        let factory = ToolFactory::from_settings(&[
            settings("FileSystem", &[]),
            settings("Browser", &[("url", "https://example.com")]),
            settings("filesystem", &[("basepath", "/no/such/conclave/dir")]),
        ]);
        assert!(factory.names().is_empty());

        let factory = ToolFactory::from_settings(&[
            settings("FileSystem", &[("basepath", dir.path().to_str().unwrap())]),
            settings("FileSystem", &[("basepath", "/tmp")]),
        ]);
        assert_eq!(factory.names(), vec!["FileSystem".to_string()]);
        assert!(factory.create("Missing").is_none());
    }

    #[test]
    fn test_extension_parameter() {
        let dir = TempDir::new().unwrap();
        let factory = ToolFactory::from_settings(&[settings(
            "FileSystem",
            &[
                ("basepath", dir.path().to_str().unwrap()),
                ("extensions", "md, txt"),
            ],
        )]);
        assert!(factory.contains("FileSystem"));
    }
}
