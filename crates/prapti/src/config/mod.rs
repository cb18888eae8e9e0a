//! The configuration tree: a schema-checked map from dotted paths to values.
//!
//! Every path that can be read or assigned has a [`FieldSchema`] declared by
//! its owner: the core declares the root keys, plugins declare
//! `plugins.<plugin>.*` and responders declare `responders.<name>.*`. Paths
//! are stored flat, so plugin names that themselves contain dots
//! (`plugins.prapti.test.test_config.a_string`) need no special handling.
//!
//! Assignments are validated against the declared [`ValueKind`]; integers
//! are accepted where floats are expected and widened on write.
//!
//! # Examples
//!
//! ```
//! use prapti::config::{ConfigTree, ConfigValue, FieldSchema};
//!
//! let mut config = ConfigTree::with_root_schema();
//! config.declare("responders.default.temperature", FieldSchema::float(1.0));
//! config.set("responders.default.temperature", ConfigValue::Int(0)).unwrap();
//!
//! let scope = config.scope("responders.default");
//! assert_eq!(scope.get_f64("temperature"), Some(0.0));
//! assert!(config.get("responders.default.nope").is_err());
//! ```

mod value;

pub use value::{ConfigValue, parse_literal};

use std::collections::BTreeMap;
use std::fmt;

use crate::error::LineError;

/// Root configuration keys declared by [`ConfigTree::with_root_schema`].
pub mod keys {
    /// Stops the upward `.prapticonfig.md` search at the file that sets it.
    pub const CONFIG_ROOT: &str = "config_root";
    /// Simulate responses and disable plugin side effects.
    pub const DRY_RUN: &str = "dry_run";
    /// Abort before the responder runs if any error was reported.
    pub const STRICT: &str = "strict";
    /// Stack of responder names; the last entry is the active responder.
    pub const RESPONDER_STACK: &str = "responder_stack";
    /// Treat fenced code blocks as verbatim text.
    pub const FENCED_CODE_VERBATIM: &str = "fenced_code_verbatim";
    /// Append an empty user heading after the responder output.
    pub const APPEND_USER_PROMPT: &str = "append_user_prompt";
    /// Global parameters aliased into responder namespaces.
    pub const ALIASES: [&str; 3] = ["model", "temperature", "n"];
}

/// Name of the responder used when `responder_stack` is empty.
pub const DEFAULT_RESPONDER: &str = "default";

// ── Schema ──────────────────────────────────────────────────────────

/// The shape a configuration path accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Bool,
    Int,
    /// Floats; integers are accepted and widened.
    Float,
    String,
    List(Box<ValueKind>),
    Map,
    /// The inner kind, or `null`.
    Optional(Box<ValueKind>),
    /// Anything at all.
    Any,
}

impl ValueKind {
    pub fn list_of(kind: ValueKind) -> Self {
        ValueKind::List(Box::new(kind))
    }

    pub fn optional(kind: ValueKind) -> Self {
        ValueKind::Optional(Box::new(kind))
    }

    /// Convert `value` to this kind, or `None` if it does not fit.
    pub fn coerce(&self, value: ConfigValue) -> Option<ConfigValue> {
        match (self, value) {
            (ValueKind::Any, v) => Some(v),
            (ValueKind::Optional(_), ConfigValue::Null) => Some(ConfigValue::Null),
            (ValueKind::Optional(inner), v) => inner.coerce(v),
            (ValueKind::Bool, v @ ConfigValue::Bool(_)) => Some(v),
            (ValueKind::Int, v @ ConfigValue::Int(_)) => Some(v),
            (ValueKind::Float, ConfigValue::Int(i)) => Some(ConfigValue::Float(i as f64)),
            (ValueKind::Float, v @ ConfigValue::Float(_)) => Some(v),
            (ValueKind::String, v @ ConfigValue::String(_)) => Some(v),
            (ValueKind::Map, v @ ConfigValue::Map(_)) => Some(v),
            (ValueKind::List(inner), ConfigValue::List(items)) => items
                .into_iter()
                .map(|item| inner.coerce(item))
                .collect::<Option<Vec<_>>>()
                .map(ConfigValue::List),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Int => write!(f, "int"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::String => write!(f, "string"),
            ValueKind::List(inner) => write!(f, "list of {inner}"),
            ValueKind::Map => write!(f, "map"),
            ValueKind::Optional(inner) => write!(f, "{inner} or null"),
            ValueKind::Any => write!(f, "any value"),
        }
    }
}

/// Schema entry for one configuration path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub kind: ValueKind,
    pub default: ConfigValue,
    pub doc: String,
}

impl FieldSchema {
    pub fn new(kind: ValueKind, default: impl Into<ConfigValue>) -> Self {
        Self {
            kind,
            default: default.into(),
            doc: String::new(),
        }
    }

    pub fn bool(default: bool) -> Self {
        Self::new(ValueKind::Bool, default)
    }

    pub fn int(default: i64) -> Self {
        Self::new(ValueKind::Int, default)
    }

    pub fn float(default: f64) -> Self {
        Self::new(ValueKind::Float, default)
    }

    pub fn string(default: impl Into<String>) -> Self {
        Self::new(ValueKind::String, default.into())
    }

    pub fn string_list() -> Self {
        Self::new(
            ValueKind::list_of(ValueKind::String),
            ConfigValue::List(Vec::new()),
        )
    }

    /// A nullable field whose default is `null`.
    pub fn optional(kind: ValueKind) -> Self {
        Self::new(ValueKind::optional(kind), ConfigValue::Null)
    }

    /// Attach a one-line description (builder pattern).
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }
}

// ── Tree ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    schema: FieldSchema,
    value: ConfigValue,
    /// Write counter value at the last declare or set.
    revision: u64,
}

/// Flat, schema-checked configuration store keyed by dotted path.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    entries: BTreeMap<String, Entry>,
    writes: u64,
}

impl ConfigTree {
    /// Create an empty tree with no declared paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree with the root keys declared at their defaults.
    pub fn with_root_schema() -> Self {
        let mut tree = Self::new();
        tree.declare(
            keys::CONFIG_ROOT,
            FieldSchema::bool(false)
                .with_doc("halt in-tree configuration file loading when true"),
        );
        tree.declare(
            keys::DRY_RUN,
            FieldSchema::bool(false).with_doc("simulate responses, disable side effects"),
        );
        tree.declare(
            keys::STRICT,
            FieldSchema::bool(false).with_doc("fail if any error is reported"),
        );
        tree.declare(
            keys::RESPONDER_STACK,
            FieldSchema::string_list().with_doc("active responder is the last entry"),
        );
        tree.declare(
            keys::FENCED_CODE_VERBATIM,
            FieldSchema::bool(true)
                .with_doc("suspend heading and config-line recognition inside code fences"),
        );
        tree.declare(
            keys::APPEND_USER_PROMPT,
            FieldSchema::bool(false).with_doc("append an empty user heading after responses"),
        );
        tree.declare(
            "model",
            FieldSchema::optional(ValueKind::String).with_doc("overrides responder models"),
        );
        tree.declare(
            "temperature",
            FieldSchema::optional(ValueKind::Float).with_doc("overrides responder temperature"),
        );
        tree.declare(
            "n",
            FieldSchema::optional(ValueKind::Int).with_doc("number of responses to generate"),
        );
        tree
    }

    /// Declare (or redeclare) a path. The value is reset to the default.
    pub fn declare(&mut self, path: impl Into<String>, schema: FieldSchema) {
        let value = schema.default.clone();
        self.writes += 1;
        let revision = self.writes;
        self.entries.insert(
            path.into(),
            Entry {
                schema,
                value,
                revision,
            },
        );
    }

    /// Declare every field under `prefix.`.
    pub fn declare_all<I>(&mut self, prefix: &str, fields: I)
    where
        I: IntoIterator<Item = (String, FieldSchema)>,
    {
        for (name, schema) in fields {
            self.declare(join_path(prefix, &name), schema);
        }
    }

    /// Remove every path equal to `prefix` or below it.
    pub fn remove_subtree(&mut self, prefix: &str) {
        self.entries
            .retain(|path, _| !(path == prefix || is_below(path, prefix)));
    }

    /// Whether `path` has a schema entry.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Whether any declared path lies below `prefix`.
    pub fn has_subtree(&self, prefix: &str) -> bool {
        self.entries.keys().any(|path| is_below(path, prefix))
    }

    pub fn schema(&self, path: &str) -> Option<&FieldSchema> {
        self.entries.get(path).map(|e| &e.schema)
    }

    /// Read a path. Undeclared paths fail with [`LineError::ConfigKey`].
    pub fn get(&self, path: &str) -> Result<&ConfigValue, LineError> {
        self.entries
            .get(path)
            .map(|e| &e.value)
            .ok_or_else(|| LineError::ConfigKey {
                path: path.to_string(),
            })
    }

    /// Validate and write a value.
    pub fn set(&mut self, path: &str, value: ConfigValue) -> Result<(), LineError> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| LineError::ConfigKey {
                path: path.to_string(),
            })?;
        let found = value.kind_name();
        let coerced = entry
            .schema
            .kind
            .coerce(value)
            .ok_or_else(|| LineError::ConfigType {
                path: path.to_string(),
                expected: entry.schema.kind.to_string(),
                found: found.to_string(),
            })?;
        entry.value = coerced;
        self.writes += 1;
        entry.revision = self.writes;
        Ok(())
    }

    /// Ordering stamp of the last write to `path`. Later writes compare
    /// greater.
    pub fn revision(&self, path: &str) -> Option<u64> {
        self.entries.get(path).map(|e| e.revision)
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).ok().and_then(ConfigValue::as_bool).unwrap_or(false)
    }

    /// `responder_stack` as strings.
    pub fn responder_stack(&self) -> Vec<String> {
        self.get(keys::RESPONDER_STACK)
            .ok()
            .and_then(ConfigValue::as_string_list)
            .unwrap_or_default()
    }

    /// The responder that answers when none is named explicitly.
    pub fn active_responder(&self) -> String {
        self.responder_stack()
            .pop()
            .unwrap_or_else(|| DEFAULT_RESPONDER.to_string())
    }

    /// Resolve a path written on an assignment line.
    ///
    /// Dotted paths are used as written. A bare identifier names
    /// `responders.<active>.<id>` when the active responder declares that
    /// field, and the global `<id>` otherwise.
    pub fn resolve_assignment_path(&self, path: &str) -> String {
        if path.contains('.') {
            return path.to_string();
        }
        let scoped = format!("responders.{}.{path}", self.active_responder());
        if self.contains(&scoped) {
            scoped
        } else {
            path.to_string()
        }
    }

    /// Read-only view of the paths below `prefix`.
    pub fn scope(&self, prefix: impl Into<String>) -> ConfigScope<'_> {
        ConfigScope {
            tree: self,
            prefix: prefix.into(),
        }
    }

    /// All declared paths in sorted order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Render the subtree below `prefix` as nested maps. An empty prefix
    /// renders the whole tree.
    pub fn subtree(&self, prefix: &str) -> ConfigValue {
        let mut root = BTreeMap::new();
        for (path, entry) in &self.entries {
            let relative = if prefix.is_empty() {
                Some(path.as_str())
            } else {
                path.strip_prefix(prefix).and_then(|p| p.strip_prefix('.'))
            };
            if let Some(relative) = relative {
                insert_nested(&mut root, relative, entry.value.clone());
            }
        }
        ConfigValue::Map(root)
    }
}

/// A read-only view of one subtree, e.g. `responders.default`.
#[derive(Debug, Clone)]
pub struct ConfigScope<'a> {
    tree: &'a ConfigTree,
    prefix: String,
}

impl ConfigScope<'_> {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn get(&self, name: &str) -> Result<&ConfigValue, LineError> {
        self.tree.get(&join_path(&self.prefix, name))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).ok().and_then(ConfigValue::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).ok().and_then(ConfigValue::as_bool)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).ok().and_then(ConfigValue::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).ok().and_then(ConfigValue::as_f64)
    }

    pub fn get_string_list(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).ok().and_then(ConfigValue::as_string_list)
    }

    /// The subtree rendered as nested maps.
    pub fn to_value(&self) -> ConfigValue {
        self.tree.subtree(&self.prefix)
    }
}

// ── Private helpers ──────────────────────────────────────────────────

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn is_below(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn insert_nested(map: &mut BTreeMap<String, ConfigValue>, path: &str, value: ConfigValue) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| ConfigValue::Map(BTreeMap::new()));
            if !matches!(child, ConfigValue::Map(_)) {
                *child = ConfigValue::Map(BTreeMap::new());
            }
            if let ConfigValue::Map(inner) = child {
                insert_nested(inner, rest, value);
            }
        }
    }
}
