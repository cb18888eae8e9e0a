//! Commands invocable from configuration lines.
//!
//! The [`Action`] trait is the interface behind every `% name args` line.
//! Actions are collected into an [`ActionRegistry`] keyed by dotted name;
//! plugins contribute them through the
//! [`PluginRegistrar`](crate::plugin::PluginRegistrar).
//!
//! # Examples
//!
//! ```
//! use prapti::action::{ActionOutput, ActionRegistry, FnAction};
//!
//! let mut registry = ActionRegistry::new();
//! registry
//!     .register("demo", "demo.shout", FnAction::new(|args, _ctx| {
//!         Ok(ActionOutput::Text(args.to_uppercase()))
//!     }))
//!     .unwrap();
//! assert!(registry.contains("demo.shout"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::document::{Message, SourceLocation, document_dir};
use crate::error::{ActionError, FatalError, LineError};
use crate::state::ExecutionState;

/// What a successful action contributes to the document.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    /// Nothing; the line disappears from the message content.
    None,
    /// Text spliced into the current message at the line's position.
    Text(String),
    /// A message appended to the output document. A run that emits
    /// messages does not invoke a responder.
    Message(Message),
}

/// Everything an action can see and change while it runs.
pub struct ActionContext<'a> {
    /// The run state: configuration, registries, responders, diagnostics.
    pub state: &'a mut ExecutionState,
    /// The message whose content is being assembled.
    pub message: &'a mut Message,
    /// Where the configuration line is.
    pub location: &'a SourceLocation,
}

impl ActionContext<'_> {
    /// Path of the document containing the line.
    pub fn document_path(&self) -> &Path {
        &self.location.file
    }

    /// Directory that relative paths on the line resolve against.
    pub fn document_dir(&self) -> &Path {
        document_dir(&self.location.file)
    }

    /// Request a responder turn over the messages closed so far.
    ///
    /// `None` selects the active responder. The call runs synchronously;
    /// the generated messages are returned to the caller and are not added
    /// to the document.
    pub fn generate(&mut self, responder: Option<&str>) -> Result<Vec<Message>, ActionError> {
        self.state.generate(responder).map_err(ActionError::from)
    }
}

/// A command handler.
///
/// `args` is the unparsed remainder of the configuration line after the
/// action name, trimmed.
pub trait Action: Send + Sync {
    fn execute(&self, args: &str, ctx: &mut ActionContext<'_>) -> Result<ActionOutput, ActionError>;
}

// ── FnAction ────────────────────────────────────────────────────────

type ErasedActionHandler = Box<
    dyn Fn(&str, &mut ActionContext<'_>) -> Result<ActionOutput, ActionError> + Send + Sync,
>;

/// A closure-based action.
///
/// Use [`FnAction`] for stateless commands. Commands that carry their own
/// state implement [`Action`] directly.
pub struct FnAction {
    handler: ErasedActionHandler,
}

impl FnAction {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &mut ActionContext<'_>) -> Result<ActionOutput, ActionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
        }
    }
}

impl Action for FnAction {
    fn execute(&self, args: &str, ctx: &mut ActionContext<'_>) -> Result<ActionOutput, ActionError> {
        (self.handler)(args, ctx)
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction").finish_non_exhaustive()
    }
}

// ── ActionRegistry ──────────────────────────────────────────────────

struct RegisteredAction {
    owner: String,
    exclamation_only: bool,
    action: Arc<dyn Action>,
}

/// An action found by [`ActionRegistry::lookup`].
#[derive(Clone)]
pub struct ResolvedAction {
    /// Fully qualified name the lookup settled on.
    pub name: String,
    /// Runs only from a `!` line.
    pub exclamation_only: bool,
    pub action: Arc<dyn Action>,
}

impl fmt::Debug for ResolvedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedAction")
            .field("name", &self.name)
            .field("exclamation_only", &self.exclamation_only)
            .finish_non_exhaustive()
    }
}

/// Split a registration name into its qualified form and the `!`-only flag.
///
/// `"!plugins.list"` registers `plugins.list` as exclamation-only.
pub fn split_exclamation(name: &str) -> (&str, bool) {
    match name.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (name, false),
    }
}

/// Dotted action name → handler, with the name of the plugin that owns it.
#[derive(Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, RegisteredAction>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action owned by `owner`. A leading `!` on `name` marks
    /// the action exclamation-only.
    ///
    /// Names are unique: registering a name that is already taken fails
    /// with [`FatalError::PluginConflict`] and leaves the registry unchanged.
    pub fn register(
        &mut self,
        owner: &str,
        name: &str,
        action: impl Action + 'static,
    ) -> Result<(), FatalError> {
        self.register_shared(owner, name, Arc::new(action))
    }

    /// Register an already-shared action.
    pub fn register_shared(
        &mut self,
        owner: &str,
        name: &str,
        action: Arc<dyn Action>,
    ) -> Result<(), FatalError> {
        let (name, exclamation_only) = split_exclamation(name);
        if let Some(existing) = self.actions.get(name) {
            return Err(FatalError::PluginConflict {
                plugin: owner.to_string(),
                action: name.to_string(),
                owner: existing.owner.clone(),
            });
        }
        debug!("registered action '{name}' from '{owner}'");
        self.actions.insert(
            name.to_string(),
            RegisteredAction {
                owner: owner.to_string(),
                exclamation_only,
                action,
            },
        );
        Ok(())
    }

    /// Look up an action by exact name. The handle is shared, so the
    /// registry can be mutated while the action runs.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).map(|r| Arc::clone(&r.action))
    }

    /// Resolve a name as written on a command line.
    ///
    /// An exact match wins. Otherwise `name` matches every action whose
    /// qualified name ends with `.<name>`, so `load` finds `plugins.load`.
    /// More than one such match is [`LineError::AmbiguousAction`].
    pub fn lookup(&self, name: &str) -> Result<ResolvedAction, LineError> {
        if let Some((qualified, entry)) = self.actions.get_key_value(name) {
            return Ok(entry.resolve(qualified));
        }
        let suffix = format!(".{name}");
        let matches: Vec<_> = self
            .actions
            .iter()
            .filter(|(qualified, _)| qualified.ends_with(&suffix))
            .collect();
        match matches.as_slice() {
            [] => Err(LineError::UnknownAction {
                name: name.to_string(),
            }),
            [(qualified, entry)] => Ok(entry.resolve(qualified)),
            [init @ .., (last, _)] => {
                let init: Vec<&str> = init.iter().map(|(q, _)| q.as_str()).collect();
                Err(LineError::AmbiguousAction {
                    name: name.to_string(),
                    alternatives: format!("{} or {last}", init.join(", ")),
                })
            }
        }
    }

    /// Name of the plugin that registered `name`.
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.actions.get(name).map(|r| r.owner.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl RegisteredAction {
    fn resolve(&self, qualified: &str) -> ResolvedAction {
        ResolvedAction {
            name: qualified.to_string(),
            exclamation_only: self.exclamation_only,
            action: Arc::clone(&self.action),
        }
    }
}
