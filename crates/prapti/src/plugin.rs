//! Plugins: named bundles of actions, a responder factory and configuration.
//!
//! The embedding program supplies a [`PluginCatalog`] mapping dotted plugin
//! names to implementations. `% plugins.load <name>` looks the name up and
//! calls [`Plugin::register`] once per run; everything the plugin registers
//! is staged in a [`PluginRegistrar`] and committed to the run state only
//! after conflict checks pass (see
//! [`ExecutionState::load_plugin`](crate::state::ExecutionState::load_plugin)).
//!
//! # Examples
//!
//! ```
//! use prapti::action::{ActionOutput, FnAction};
//! use prapti::config::FieldSchema;
//! use prapti::plugin::{Plugin, PluginCatalog, PluginRegistrar};
//!
//! struct Greeter;
//!
//! impl Plugin for Greeter {
//!     fn name(&self) -> &str { "demo.greeter" }
//!
//!     fn register(&self, registrar: &mut PluginRegistrar) {
//!         registrar.declare_config("greeting", FieldSchema::string("hello"));
//!         registrar.add_action("greet", FnAction::new(|args, _| {
//!             Ok(ActionOutput::Text(format!("hello {args}\n")))
//!         }));
//!     }
//! }
//!
//! let catalog = PluginCatalog::new().with(Greeter);
//! assert!(catalog.get("demo.greeter").is_some());
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::action::Action;
use crate::config::FieldSchema;
use crate::responder::ResponderFactory;

/// A loadable extension.
pub trait Plugin: Send + Sync {
    /// Dotted name used with `plugins.load` and `responder.new`.
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    /// One-line summary shown by `plugins.list`.
    fn description(&self) -> &str {
        ""
    }

    /// Describe everything the plugin contributes. Called at most once per run.
    fn register(&self, registrar: &mut PluginRegistrar);
}

/// Staging area filled by [`Plugin::register`].
pub struct PluginRegistrar {
    plugin: String,
    pub(crate) actions: Vec<(String, Arc<dyn Action>)>,
    pub(crate) responder_factory: Option<Arc<dyn ResponderFactory>>,
    pub(crate) config: Vec<(String, FieldSchema)>,
    pub(crate) dependencies: Vec<String>,
}

impl fmt::Debug for PluginRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistrar")
            .field("plugin", &self.plugin)
            .field(
                "actions",
                &self.actions.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("responder_factory", &self.responder_factory.is_some())
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl PluginRegistrar {
    pub(crate) fn new(plugin: &str) -> Self {
        Self {
            plugin: plugin.to_string(),
            actions: Vec::new(),
            responder_factory: None,
            config: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Name of the plugin being registered.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// Contribute an action under its full dotted name.
    pub fn add_action(&mut self, name: impl Into<String>, action: impl Action + 'static) {
        self.actions.push((name.into(), Arc::new(action)));
    }

    /// Contribute the plugin's responder factory.
    pub fn set_responder_factory(&mut self, factory: impl ResponderFactory + 'static) {
        self.responder_factory = Some(Arc::new(factory));
    }

    /// Declare a plugin-level field under `plugins.<plugin>.<field>`.
    pub fn declare_config(&mut self, field: impl Into<String>, schema: FieldSchema) {
        self.config.push((field.into(), schema));
    }

    /// Ask for another plugin to be loaded before this one is committed.
    pub fn require(&mut self, plugin: impl Into<String>) {
        self.dependencies.push(plugin.into());
    }
}

// ── Catalog ─────────────────────────────────────────────────────────

/// Name → plugin lookup supplied by the embedding program.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin. Replaces any plugin with the same name.
    pub fn add(&mut self, plugin: impl Plugin + 'static) {
        self.plugins
            .insert(plugin.name().to_string(), Arc::new(plugin));
    }

    /// Add a plugin (builder pattern).
    pub fn with(mut self, plugin: impl Plugin + 'static) -> Self {
        self.add(plugin);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// All plugins, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

// ── Loader bookkeeping ──────────────────────────────────────────────

/// Per-run record of which plugins are loaded, and in what order.
#[derive(Debug, Clone, Default)]
pub struct PluginLoader {
    catalog: PluginCatalog,
    loaded: Vec<String>,
    loading: HashSet<String>,
}

impl PluginLoader {
    pub fn new(catalog: PluginCatalog) -> Self {
        Self {
            catalog,
            loaded: Vec::new(),
            loading: HashSet::new(),
        }
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.iter().any(|n| n == name)
    }

    /// Loaded plugin names in load order.
    pub fn loaded(&self) -> &[String] {
        &self.loaded
    }

    /// Mark `name` as being registered. Returns `false` if it already is,
    /// which breaks dependency cycles.
    pub(crate) fn begin(&mut self, name: &str) -> bool {
        self.loading.insert(name.to_string())
    }

    pub(crate) fn finish(&mut self, name: &str, committed: bool) {
        self.loading.remove(name);
        if committed {
            self.loaded.push(name.to_string());
        }
    }
}
