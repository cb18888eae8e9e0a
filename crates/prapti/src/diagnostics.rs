//! Compiler-style diagnostics collected during a run.
//!
//! Per-line problems never stop a scan. They are recorded here with their
//! source location and surfaced after the scan by [`Diagnostics::report`],
//! which emits one `tracing` event per entry. The
//! [`DiagnosticLayer`](crate::logging::DiagnosticLayer) renders those events as
//!
//! ```text
//! chat.md:12: error: [unknown-action]: unknown action 'foo.bar'
//! ```

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::document::SourceLocation;
use crate::error::LineError;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One reported problem or notice.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable kebab-case id, e.g. `unknown-action`.
    pub id: String,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{location}: ")?;
        }
        write!(f, "{}: [{}]: {}", self.severity, self.id, self.message)
    }
}

/// Ordered collection of diagnostics for one run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic.
    pub fn push(
        &mut self,
        severity: Severity,
        id: impl Into<String>,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) {
        let diagnostic = Diagnostic {
            severity,
            id: id.into(),
            message: message.into(),
            location,
        };
        debug!("recorded diagnostic: {diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn error(&mut self, id: &str, message: impl Into<String>, location: Option<SourceLocation>) {
        self.push(Severity::Error, id, message, location);
    }

    pub fn warning(
        &mut self,
        id: &str,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) {
        self.push(Severity::Warning, id, message, location);
    }

    pub fn info(&mut self, id: &str, message: impl Into<String>, location: Option<SourceLocation>) {
        self.push(Severity::Info, id, message, location);
    }

    /// Record a [`LineError`] as an error at `location`.
    pub fn line_error(&mut self, err: &LineError, location: &SourceLocation) {
        self.error(err.id(), err.to_string(), Some(location.clone()));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Whether any diagnostic carries `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|d| d.id == id)
    }

    /// Emit every diagnostic as a `tracing` event, in recording order.
    pub fn report(&self) {
        for d in &self.entries {
            let source = d.location.as_ref().map(ToString::to_string);
            let source = source.as_deref().unwrap_or("");
            match d.severity {
                Severity::Error => error!(message_id = %d.id, source, "{}", d.message),
                Severity::Warning => warn!(message_id = %d.id, source, "{}", d.message),
                Severity::Info => info!(message_id = %d.id, source, "{}", d.message),
            }
        }
    }
}
