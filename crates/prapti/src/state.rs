//! Execution state threaded through every document of a run.
//!
//! One [`ExecutionState`] owns the configuration tree, action registry,
//! plugin loader, responder table, accumulated messages and diagnostics.
//! Nothing is global: two runs in one process share no state.

use std::collections::HashSet;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::action::{ActionRegistry, split_exclamation};
use crate::builtins;
use crate::config::{ConfigTree, keys};
use crate::diagnostics::Diagnostics;
use crate::document::Message;
use crate::error::{ActionError, FatalError, LineError};
use crate::plugin::{Plugin, PluginCatalog, PluginLoader, PluginRegistrar};
use crate::responder::{
    CancelToken, ResponderContext, ResponderInstance, ResponderTable, visible_messages,
};

/// All mutable state of one run.
#[derive(Debug)]
pub struct ExecutionState {
    pub config: ConfigTree,
    pub actions: ActionRegistry,
    pub plugins: PluginLoader,
    pub responders: ResponderTable,
    /// Messages of every interpreted document, in order.
    pub messages: Vec<Message>,
    /// Messages produced by actions, appended to the output document.
    pub emitted: Vec<Message>,
    pub diagnostics: Diagnostics,
    /// Configuration files interpreted so far, in order.
    pub config_file_paths: Vec<PathBuf>,
    pub input_path: Option<PathBuf>,
    pub cancel: CancelToken,
}

impl ExecutionState {
    /// Fresh state with the root schema and built-in actions.
    pub fn new(catalog: PluginCatalog) -> Self {
        let mut actions = ActionRegistry::new();
        builtins::register(&mut actions);
        Self {
            config: ConfigTree::with_root_schema(),
            actions,
            plugins: PluginLoader::new(catalog),
            responders: ResponderTable::new(),
            messages: Vec::new(),
            emitted: Vec::new(),
            diagnostics: Diagnostics::new(),
            config_file_paths: Vec::new(),
            input_path: None,
            cancel: CancelToken::new(),
        }
    }

    /// Share a cancel token with the caller (builder pattern).
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Load a plugin by name. Loading a loaded plugin is a no-op.
    ///
    /// The plugin's contributions are staged first; dependencies it
    /// requires are loaded next, and only then are its actions, responder
    /// factory and configuration committed. An action-name conflict aborts
    /// before anything from the plugin is committed.
    pub fn load_plugin(&mut self, name: &str) -> Result<(), ActionError> {
        if self.plugins.is_loaded(name) {
            debug!("plugin '{name}' is already loaded");
            return Ok(());
        }
        let Some(plugin) = self.plugins.catalog().get(name) else {
            return Err(LineError::PluginNotFound {
                name: name.to_string(),
            }
            .into());
        };
        if !self.plugins.begin(name) {
            debug!("plugin '{name}' is already being loaded");
            return Ok(());
        }
        let result = self.commit_plugin(plugin.as_ref());
        self.plugins.finish(name, result.is_ok());
        result
    }

    fn commit_plugin(&mut self, plugin: &dyn Plugin) -> Result<(), ActionError> {
        let name = plugin.name();
        let mut registrar = PluginRegistrar::new(name);
        plugin.register(&mut registrar);

        for dependency in &registrar.dependencies {
            debug!("plugin '{name}' requires '{dependency}'");
            self.load_plugin(dependency)?;
        }

        let mut seen = HashSet::new();
        for (action, _) in &registrar.actions {
            let (action, _) = split_exclamation(action);
            let owner = self
                .actions
                .owner(action)
                .or_else(|| (!seen.insert(action)).then_some(name));
            if let Some(owner) = owner {
                return Err(FatalError::PluginConflict {
                    plugin: name.to_string(),
                    action: action.to_string(),
                    owner: owner.to_string(),
                }
                .into());
            }
        }

        let action_count = registrar.actions.len();
        for (action, handler) in registrar.actions {
            self.actions.register_shared(name, &action, handler)?;
        }
        self.config
            .declare_all(&format!("plugins.{name}"), registrar.config);
        if let Some(factory) = registrar.responder_factory {
            self.responders.add_factory(name, factory);
        }
        info!(
            "loaded plugin '{name}' {} ({action_count} action(s))",
            plugin.version()
        );
        Ok(())
    }

    /// Create (or replace) responder `name` from `plugin`'s factory,
    /// loading the plugin first when needed.
    ///
    /// The factory's schema is declared under `responders.<name>`, and
    /// non-null global aliases (`model`, `temperature`, `n`) seed the
    /// same-named responder fields.
    pub fn create_responder(&mut self, name: &str, plugin: &str) -> Result<(), ActionError> {
        self.load_plugin(plugin)?;
        let Some(factory) = self.responders.factory(plugin) else {
            return Err(LineError::action(
                "responder.new",
                format!("plugin '{plugin}' does not provide a responder"),
            )
            .into());
        };
        let responder = factory.create(name).map_err(|e| {
            LineError::action(
                "responder.new",
                format!("couldn't construct responder '{name}': {e}"),
            )
        })?;

        let prefix = format!("responders.{name}");
        self.config.remove_subtree(&prefix);
        self.config.declare_all(&prefix, factory.configuration());
        for alias in keys::ALIASES {
            let Ok(global) = self.config.get(alias) else {
                continue;
            };
            let field = format!("{prefix}.{alias}");
            if global.is_null() || !self.config.contains(&field) {
                continue;
            }
            let global = global.clone();
            if let Err(e) = self.config.set(&field, global) {
                self.diagnostics
                    .warning("alias-not-applied", e.to_string(), None);
            }
        }

        let replaced = self.responders.insert(
            name,
            ResponderInstance {
                plugin: plugin.to_string(),
                responder,
            },
        );
        if replaced.is_some() {
            debug!("replaced responder '{name}'");
        }
        info!("created responder '{name}' from plugin '{plugin}'");
        Ok(())
    }

    /// Copy non-null global aliases into `responders.<responder>` where the
    /// global was written after the responder's own field.
    fn apply_global_aliases(&mut self, responder: &str) {
        for alias in keys::ALIASES {
            let field = format!("responders.{responder}.{alias}");
            let (Ok(global), Some(global_revision), Some(field_revision)) = (
                self.config.get(alias),
                self.config.revision(alias),
                self.config.revision(&field),
            ) else {
                continue;
            };
            if global.is_null() || global_revision <= field_revision {
                continue;
            }
            let global = global.clone();
            debug!("applying global '{alias}' to responder '{responder}'");
            if let Err(e) = self.config.set(&field, global) {
                self.diagnostics
                    .warning("alias-not-applied", e.to_string(), None);
            }
        }
    }

    /// Invoke a responder over the visible messages accumulated so far.
    ///
    /// `None` selects the active responder (top of `responder_stack`, else
    /// `default`). Global aliases written since the responder's own fields
    /// take effect first. Cancellation before or during generation discards
    /// any output.
    pub fn generate(&mut self, responder: Option<&str>) -> Result<Vec<Message>, FatalError> {
        let name = responder
            .map(str::to_string)
            .unwrap_or_else(|| self.config.active_responder());
        let instance = self
            .responders
            .get(&name)
            .cloned()
            .ok_or_else(|| FatalError::ResponderNotFound(name.clone()))?;
        if self.cancel.is_cancelled() {
            return Err(FatalError::Cancelled);
        }
        self.apply_global_aliases(&name);

        let input = visible_messages(&self.messages, instance.responder.sees_hidden_messages());
        let ctx = ResponderContext {
            name: &name,
            config: self.config.scope(format!("responders.{name}")),
            root: &self.config,
            cancel: &self.cancel,
            input_path: self.input_path.as_deref(),
        };
        info!(
            "generating response with '{name}' ({}, {} message(s))",
            instance.plugin,
            input.len()
        );
        let responses = instance
            .responder
            .generate(&input, &ctx)
            .map_err(|e| FatalError::from_responder(&name, e))?;
        if self.cancel.is_cancelled() {
            return Err(FatalError::Cancelled);
        }
        Ok(responses)
    }

    /// The last enabled, non-hidden message.
    pub fn last_visible_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_visible())
    }

    /// Shared handle to the catalog, for listing.
    pub fn catalog(&self) -> &PluginCatalog {
        self.plugins.catalog()
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new(PluginCatalog::new())
    }
}
