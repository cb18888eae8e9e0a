//! Responders: named strategies that produce the next message(s).
//!
//! A plugin contributes a [`ResponderFactory`]; `% responder.new <name>
//! <plugin>` asks the factory for a [`Responder`] instance and declares the
//! factory's configuration schema under `responders.<name>`. Instances live
//! in the [`ResponderTable`] of the run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::{ConfigScope, ConfigTree, FieldSchema};
use crate::document::Message;
use crate::error::ResponderError;

/// Cooperative cancellation flag shared between the caller and a responder.
///
/// Responders poll [`CancelToken::is_cancelled`] during long operations and
/// return [`ResponderError::Cancelled`] when it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a responder sees while generating a turn.
pub struct ResponderContext<'a> {
    /// Instance name, e.g. `default`.
    pub name: &'a str,
    /// The instance's configuration subtree, `responders.<name>`.
    pub config: ConfigScope<'a>,
    /// The whole configuration tree.
    pub root: &'a ConfigTree,
    pub cancel: &'a CancelToken,
    /// Path of the input document, when there is one.
    pub input_path: Option<&'a Path>,
}

impl ResponderContext<'_> {
    /// Whether responses should be simulated without side effects.
    pub fn dry_run(&self) -> bool {
        self.root.get_bool(crate::config::keys::DRY_RUN)
    }

    /// Fail with [`ResponderError::Cancelled`] if cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), ResponderError> {
        if self.cancel.is_cancelled() {
            Err(ResponderError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A configured response-generation strategy.
pub trait Responder: Send + Sync {
    /// Whether hidden (`_`-prefixed) messages are forwarded to
    /// [`Responder::generate`]. Disabled messages never are.
    fn sees_hidden_messages(&self) -> bool {
        false
    }

    /// Produce the next message(s) for `messages`.
    fn generate(
        &self,
        messages: &[Message],
        ctx: &ResponderContext<'_>,
    ) -> Result<Vec<Message>, ResponderError>;
}

/// Creates responder instances for one plugin.
pub trait ResponderFactory: Send + Sync {
    /// Schema of the per-instance configuration, declared under
    /// `responders.<name>` when an instance is created.
    fn configuration(&self) -> Vec<(String, FieldSchema)> {
        Vec::new()
    }

    fn create(&self, name: &str) -> Result<Arc<dyn Responder>, ResponderError>;
}

/// A created responder and the plugin it came from.
#[derive(Clone)]
pub struct ResponderInstance {
    pub plugin: String,
    pub responder: Arc<dyn Responder>,
}

/// Factories keyed by plugin name, instances keyed by responder name.
#[derive(Default)]
pub struct ResponderTable {
    factories: HashMap<String, Arc<dyn ResponderFactory>>,
    instances: BTreeMap<String, ResponderInstance>,
}

impl fmt::Debug for ResponderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponderTable")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("instances", &self.instances.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ResponderTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_factory(&mut self, plugin: &str, factory: Arc<dyn ResponderFactory>) {
        self.factories.insert(plugin.to_string(), factory);
    }

    pub fn factory(&self, plugin: &str) -> Option<Arc<dyn ResponderFactory>> {
        self.factories.get(plugin).cloned()
    }

    /// Store an instance, replacing any previous one with the same name.
    pub fn insert(&mut self, name: &str, instance: ResponderInstance) -> Option<ResponderInstance> {
        self.instances.insert(name.to_string(), instance)
    }

    pub fn get(&self, name: &str) -> Option<&ResponderInstance> {
        self.instances.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    /// Instance names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// The messages a responder is allowed to see, in document order.
pub fn visible_messages(messages: &[Message], include_hidden: bool) -> Vec<Message> {
    messages
        .iter()
        .filter(|m| m.enabled && (include_hidden || !m.is_hidden()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn visibility_filter() {
        let messages = vec![
            Message::with_content("_head", "notes"),
            Message::with_content("user", "hi"),
            Message::with_content("user", "draft").with_enabled(false),
            Message::with_content("_aside", "psst"),
        ];
        let visible = visible_messages(&messages, false);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].text(), "hi");

        let with_hidden = visible_messages(&messages, true);
        assert_eq!(
            with_hidden.iter().map(|m| m.role.as_str()).collect::<Vec<_>>(),
            vec!["_head", "user", "_aside"]
        );
    }
}
