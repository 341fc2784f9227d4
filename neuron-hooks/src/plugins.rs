//! Plugin manifest loading (§4.K, §6 on-disk layout's `plugins/`).
//!
//! Each plugin is a subdirectory carrying a `manifest.json` that declares
//! the hooks, skills, commands, and agent files it provides, plus the
//! names of other plugins it depends on. Dependency resolution is
//! best-effort: an unresolved dependency is logged, not fatal — the spec
//! explicitly does not abort startup over it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A plugin's declared manifest (`plugins/<name>/manifest.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// The plugin's unique name.
    pub name: String,
    /// Semver-ish version string, informational only.
    #[serde(default)]
    pub version: String,
    /// Names of other plugins this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Hook handler source files this plugin provides.
    #[serde(default)]
    pub hooks: Vec<String>,
    /// Skill definition files this plugin provides.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Slash-command definition files this plugin provides.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Agent definition files this plugin provides. Per §13 Open Question
    /// 2, these are never auto-registered into the active agent set — a
    /// plugin's agents only join the request's active set once the
    /// plugin is explicitly enabled.
    #[serde(default)]
    pub agents: Vec<String>,
}

/// A loaded plugin: its manifest plus the directory it was loaded from
/// and whether it is currently enabled.
#[derive(Debug, Clone)]
pub struct Plugin {
    /// The plugin's manifest.
    pub manifest: PluginManifest,
    /// The directory `manifest.json` was read from.
    pub dir: PathBuf,
    /// Whether the plugin is currently active. Plugins load disabled;
    /// `/api/plugins/:name/enable` flips this.
    pub enabled: bool,
}

/// Errors from loading a plugin directory.
#[derive(Debug, thiserror::Error)]
pub enum PluginLoadError {
    /// The plugins root directory could not be read.
    #[error("cannot read plugin directory: {0}")]
    Io(#[from] std::io::Error),
    /// A plugin's `manifest.json` was not valid JSON or didn't match the
    /// expected shape.
    #[error("invalid manifest in {path}: {source}")]
    InvalidManifest {
        /// Path to the offending manifest file.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Registry of loaded plugins, keyed by name.
pub struct PluginRegistry {
    plugins: HashMap<String, Plugin>,
}

impl PluginRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Load every `plugins/<name>/manifest.json` under `root`. A
    /// subdirectory with no `manifest.json` is skipped, not an error.
    /// After loading, validates each plugin's `dependencies` against the
    /// loaded set and logs (without aborting) any unresolved name.
    pub fn load_dir(root: impl AsRef<Path>) -> Result<Self, PluginLoadError> {
        let root = root.as_ref();
        let mut registry = Self::new();

        if !root.exists() {
            return Ok(registry);
        }

        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();
            let manifest_path = dir.join("manifest.json");
            if !manifest_path.exists() {
                continue;
            }
            let raw = std::fs::read_to_string(&manifest_path)?;
            let manifest: PluginManifest =
                serde_json::from_str(&raw).map_err(|source| PluginLoadError::InvalidManifest {
                    path: manifest_path.clone(),
                    source,
                })?;
            registry.plugins.insert(
                manifest.name.clone(),
                Plugin {
                    manifest,
                    dir,
                    enabled: false,
                },
            );
        }

        registry.validate_dependencies();
        Ok(registry)
    }

    fn validate_dependencies(&self) {
        for plugin in self.plugins.values() {
            for dep in &plugin.manifest.dependencies {
                if !self.plugins.contains_key(dep) {
                    warn!(
                        plugin = %plugin.manifest.name,
                        dependency = %dep,
                        "plugin dependency not resolved; continuing without it"
                    );
                }
            }
        }
    }

    /// Look up a loaded plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Plugin> {
        self.plugins.get(name)
    }

    /// Every loaded plugin (`GET /api/plugins`).
    #[must_use]
    pub fn list(&self) -> Vec<&Plugin> {
        let mut plugins: Vec<&Plugin> = self.plugins.values().collect();
        plugins.sort_by(|a, b| a.manifest.name.cmp(&b.manifest.name));
        plugins
    }

    /// Enable a plugin (`POST /api/plugins/:name/enable`). Returns `false`
    /// if no plugin by that name is loaded.
    pub fn enable(&mut self, name: &str) -> bool {
        match self.plugins.get_mut(name) {
            Some(plugin) => {
                plugin.enabled = true;
                true
            }
            None => false,
        }
    }

    /// Disable a plugin (`POST /api/plugins/:name/disable`). Returns
    /// `false` if no plugin by that name is loaded.
    pub fn disable(&mut self, name: &str) -> bool {
        match self.plugins.get_mut(name) {
            Some(plugin) => {
                plugin.enabled = false;
                true
            }
            None => false,
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
