//! Error taxonomy for a prapti run.
//!
//! Errors come in two tiers:
//!
//! - [`LineError`]: confined to one configuration line. The line's effect is
//!   skipped, the problem is recorded as a [`Diagnostic`](crate::diagnostics::Diagnostic)
//!   and scanning continues.
//! - [`FatalError`]: aborts the run. The document on disk is never touched
//!   once one of these has been raised.
//!
//! Malformed headings and other parse ambiguities are not errors at all: the
//! segmenter degrades them to plain text.

use std::path::PathBuf;

use thiserror::Error;

/// A problem with a single configuration line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    /// The dotted path has no schema entry.
    #[error("unknown configuration path '{path}'")]
    ConfigKey {
        /// Path as written (after alias resolution).
        path: String,
    },

    /// The value does not match the schema entry for the path.
    #[error("'{path}' expects {expected}, got {found}")]
    ConfigType {
        /// Target path.
        path: String,
        /// Description of the accepted kind.
        expected: String,
        /// Kind of the rejected value.
        found: String,
    },

    /// The right-hand side of an assignment is not a literal.
    #[error("invalid literal '{text}': {reason}")]
    InvalidLiteral { text: String, reason: String },

    /// No action is registered under the name.
    #[error("unknown action '{name}'")]
    UnknownAction { name: String },

    /// An unqualified name matches more than one action.
    #[error("action name '{name}' is ambiguous, did you mean: {alternatives}")]
    AmbiguousAction { name: String, alternatives: String },

    /// The action may only run from a `!` line in the final message.
    #[error("action '{name}' must be written with a '!' prefix")]
    ExclamationRequired { name: String },

    /// The line is neither an assignment nor a command.
    #[error("malformed configuration line '{text}'")]
    MalformedCommand { text: String },

    /// The plugin catalog has no entry for the name.
    #[error("plugin '{name}' not found")]
    PluginNotFound { name: String },

    /// An action rejected its arguments or failed to run.
    #[error("{action}: {message}")]
    ActionFailed { action: String, message: String },
}

impl LineError {
    /// Stable diagnostic id, printed in brackets next to the message.
    pub fn id(&self) -> &'static str {
        match self {
            LineError::ConfigKey { .. } => "config-key-error",
            LineError::ConfigType { .. } => "config-type-error",
            LineError::InvalidLiteral { .. } => "invalid-literal",
            LineError::UnknownAction { .. } => "unknown-action",
            LineError::AmbiguousAction { .. } => "ambiguous-action-name",
            LineError::ExclamationRequired { .. } => "exclamation-required",
            LineError::MalformedCommand { .. } => "malformed-command",
            LineError::PluginNotFound { .. } => "plugin-not-found",
            LineError::ActionFailed { .. } => "action-failed",
        }
    }

    /// Shorthand for [`LineError::ActionFailed`].
    pub fn action(action: impl Into<String>, message: impl Into<String>) -> Self {
        LineError::ActionFailed {
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Error reported by a responder while generating a turn.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResponderError {
    /// The responder observed the cancel token.
    #[error("cancelled")]
    Cancelled,

    /// The responder's configuration cannot be used.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Transport, authentication, quota or any other back-end failure.
    #[error("{0}")]
    Backend(String),
}

/// A run-aborting error. The input document is left unmodified.
#[derive(Debug, Error)]
pub enum FatalError {
    /// Two plugins tried to register the same action name.
    #[error("plugin '{plugin}' registers action '{action}' which is already provided by '{owner}'")]
    PluginConflict {
        plugin: String,
        action: String,
        owner: String,
    },

    /// The responder failed to produce a turn.
    #[error("responder '{responder}' failed: {source}")]
    Responder {
        responder: String,
        #[source]
        source: ResponderError,
    },

    /// The requested responder was never created with `responder.new`.
    #[error("no responder named '{0}' (create one with `% responder.new {0} <plugin>`)")]
    ResponderNotFound(String),

    /// The run was cancelled before the responder produced output.
    #[error("cancelled")]
    Cancelled,

    /// `strict` is set and at least one error diagnostic was reported.
    #[error("strict mode: {0} error(s) reported")]
    StrictMode(usize),

    /// Reading or writing a document failed.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FatalError {
    /// Wrap a responder error, mapping cancellation to [`FatalError::Cancelled`].
    pub fn from_responder(responder: impl Into<String>, source: ResponderError) -> Self {
        match source {
            ResponderError::Cancelled => FatalError::Cancelled,
            source => FatalError::Responder {
                responder: responder.into(),
                source,
            },
        }
    }

    /// Whether this error is a cooperative cancellation rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FatalError::Cancelled)
    }
}

/// Failure of an action handler: either confined to the line or fatal.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Line(#[from] LineError),
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_error_ids_are_stable() {
        let err = LineError::UnknownAction {
            name: "unknown.command".into(),
        };
        assert_eq!(err.id(), "unknown-action");
        assert_eq!(err.to_string(), "unknown action 'unknown.command'");
    }

    #[test]
    fn responder_cancellation_maps_to_cancelled() {
        let err = FatalError::from_responder("default", ResponderError::Cancelled);
        assert!(err.is_cancellation());

        let err = FatalError::from_responder("default", ResponderError::Backend("HTTP 401".into()));
        assert!(!err.is_cancellation());
        assert_eq!(err.to_string(), "responder 'default' failed: HTTP 401");
    }
}
