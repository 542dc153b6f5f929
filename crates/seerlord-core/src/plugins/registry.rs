//! Plugin registry
//!
//! Name-keyed lookup of registered plugins, populated once from an explicit
//! manifest during single-threaded startup and read-mostly afterwards. Also
//! maps each plugin back to its source directory so sibling config files
//! can be resolved.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};

use super::{AgentPlugin, is_system_plugin};

/// File name of a plugin's optional sibling configuration
const PLUGIN_CONFIG_FILE: &str = "plugin.toml";

/// Registry of agent plugins
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn AgentPlugin>>,
    dirs: HashMap<String, PathBuf>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Idempotent upsert keyed by name: the latest
    /// registration wins.
    pub fn register(&mut self, plugin: Arc<dyn AgentPlugin>) {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            warn!(plugin = %name, "Plugin already registered, overwriting");
        }
        info!(plugin = %name, description = %plugin.description(), "Plugin registered");
        self.plugins.insert(name, plugin);
    }

    /// Register a plugin together with its source directory
    pub fn register_with_dir(&mut self, plugin: Arc<dyn AgentPlugin>, dir: impl Into<PathBuf>) {
        let name = plugin.name().to_string();
        self.register(plugin);
        self.dirs.insert(name, dir.into());
    }

    /// Register every plugin in a manifest
    pub fn register_manifest(&mut self, manifest: Vec<Arc<dyn AgentPlugin>>) {
        for plugin in manifest {
            self.register(plugin);
        }
    }

    /// Look up a plugin by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentPlugin>> {
        self.plugins.get(name).cloned()
    }

    /// Directory a plugin was registered from, if any
    pub fn plugin_dir(&self, name: &str) -> Option<&Path> {
        self.dirs.get(name).map(PathBuf::as_path)
    }

    /// Path of a plugin's sibling config file, if its directory is known
    pub fn config_path(&self, name: &str) -> Option<PathBuf> {
        self.plugin_dir(name).map(|dir| dir.join(PLUGIN_CONFIG_FILE))
    }

    /// Load a plugin's sibling config file.
    ///
    /// `Ok(None)` when the plugin has no directory or no config file; a file
    /// that exists but fails to parse is an error.
    pub fn load_plugin_config(&self, name: &str) -> Result<Option<toml::Value>> {
        let Some(path) = self.config_path(name) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)?;
        let value = toml::from_str(&contents).map_err(|e| {
            Error::ConfigError(format!("Bad plugin config {}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    /// All non-system plugins, sorted by name.
    ///
    /// This is the planner's menu and the user-facing listing; system
    /// plugins stay invokable by name but never appear here.
    pub fn visible_plugins(&self) -> Vec<Arc<dyn AgentPlugin>> {
        let mut plugins: Vec<_> = self
            .plugins
            .values()
            .filter(|p| !is_system_plugin(p.name()))
            .cloned()
            .collect();
        plugins.sort_by(|a, b| a.name().cmp(b.name()));
        plugins
    }

    /// All registered names, system plugins included, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.plugins.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ExecutionGraph;

    struct TestPlugin {
        name: &'static str,
        description: &'static str,
    }

    impl TestPlugin {
        fn arc(name: &'static str, description: &'static str) -> Arc<dyn AgentPlugin> {
            Arc::new(Self { name, description })
        }
    }

    impl AgentPlugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            self.description
        }

        fn build_graph(&self) -> ExecutionGraph {
            ExecutionGraph::new(self.name)
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = PluginRegistry::new();
        registry.register(TestPlugin::arc("tutor", "Generates tutorials"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("tutor").unwrap().description(), "Generates tutorials");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_reregistration_last_wins() {
        let mut registry = PluginRegistry::new();
        registry.register(TestPlugin::arc("tutor", "First version"));
        registry.register(TestPlugin::arc("tutor", "Second version"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("tutor").unwrap().description(), "Second version");
    }

    #[test]
    fn test_system_plugins_hidden_from_listing() {
        let mut registry = PluginRegistry::new();
        registry.register(TestPlugin::arc("tutor", "Generates tutorials"));
        registry.register(TestPlugin::arc("_mail_service", "Sends mail"));

        let visible = registry.visible_plugins();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name(), "tutor");

        // Still invokable by name
        assert!(registry.get("_mail_service").is_some());
        assert_eq!(registry.names(), vec!["_mail_service", "tutor"]);
    }

    #[test]
    fn test_visible_plugins_sorted() {
        let mut registry = PluginRegistry::new();
        registry.register(TestPlugin::arc("zeta", "z"));
        registry.register(TestPlugin::arc("alpha", "a"));

        let names: Vec<_> = registry.visible_plugins().iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_plugin_dir_and_config_path() {
        let mut registry = PluginRegistry::new();
        registry.register_with_dir(TestPlugin::arc("tutor", "t"), "/opt/plugins/tutor");

        assert_eq!(
            registry.plugin_dir("tutor").unwrap(),
            Path::new("/opt/plugins/tutor")
        );
        assert_eq!(
            registry.config_path("tutor").unwrap(),
            PathBuf::from("/opt/plugins/tutor/plugin.toml")
        );
        assert!(registry.plugin_dir("missing").is_none());
    }

    #[test]
    fn test_load_plugin_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plugin.toml"), "max_sections = 5\n").unwrap();

        let mut registry = PluginRegistry::new();
        registry.register_with_dir(TestPlugin::arc("tutor", "t"), dir.path());

        let config = registry.load_plugin_config("tutor").unwrap().unwrap();
        assert_eq!(config["max_sections"].as_integer(), Some(5));

        // No directory registered: None, not an error
        registry.register(TestPlugin::arc("news", "n"));
        assert!(registry.load_plugin_config("news").unwrap().is_none());
    }

    #[test]
    fn test_bad_plugin_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("plugin.toml"), "not [valid toml").unwrap();

        let mut registry = PluginRegistry::new();
        registry.register_with_dir(TestPlugin::arc("tutor", "t"), dir.path());
        assert!(registry.load_plugin_config("tutor").is_err());
    }

    #[test]
    fn test_register_manifest() {
        let mut registry = PluginRegistry::new();
        registry.register_manifest(vec![
            TestPlugin::arc("tutor", "t"),
            TestPlugin::arc("news", "n"),
        ]);
        assert_eq!(registry.len(), 2);
    }
}
