//! Convenience re-exports for embedding programs and plugin authors.
//!
//! ```
//! use prapti::prelude::*;
//! ```

// ── Documents ───────────────────────────────────────────────────────
pub use crate::document::{Message, Segment, Segmenter, SourceLocation};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{ConfigScope, ConfigTree, ConfigValue, FieldSchema, ValueKind};

// ── Extension points ────────────────────────────────────────────────
pub use crate::action::{Action, ActionContext, ActionOutput, FnAction};
pub use crate::plugin::{Plugin, PluginCatalog, PluginRegistrar};
pub use crate::responder::{CancelToken, Responder, ResponderContext, ResponderFactory};

// ── Running ─────────────────────────────────────────────────────────
pub use crate::diagnostics::{Diagnostic, Diagnostics, Severity};
pub use crate::error::{ActionError, FatalError, LineError, ResponderError};
pub use crate::resolver::{ResolveOptions, UserConfigDirs};
pub use crate::run::{RunOptions, RunOutcome, run};
pub use crate::state::ExecutionState;
