//! A `tracing` layer that prints events as compiler-style diagnostics.
//!
//! Events carrying a `source` field (`file:line`) and a `message_id` field
//! are rendered as
//!
//! ```text
//! chat.md:3: error: [unknown-action]: unknown action 'unknown.command'
//! ```
//!
//! Other events use `prapti` in place of the source. Any remaining fields
//! are appended in braces.
//!
//! # Examples
//!
//! ```no_run
//! use prapti::logging::DiagnosticLayer;
//! use tracing_subscriber::layer::SubscriberExt;
//! use tracing_subscriber::util::SubscriberInitExt;
//!
//! tracing_subscriber::registry()
//!     .with(DiagnosticLayer::new())
//!     .init();
//! ```

use std::fmt;
use std::io::{self, Write};
use std::sync::Mutex;

use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Prefix used for events without a `source` field.
const DEFAULT_SOURCE: &str = "prapti";

/// Writes one line per event to stderr, or to a supplied writer.
pub struct DiagnosticLayer {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl DiagnosticLayer {
    pub fn new() -> Self {
        Self::with_writer(io::stderr())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

impl Default for DiagnosticLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DiagnosticLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticLayer").finish_non_exhaustive()
    }
}

fn level_name(level: &tracing::Level) -> &'static str {
    match *level {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warning",
        tracing::Level::ERROR => "error",
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for DiagnosticLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = DiagnosticVisitor::default();
        event.record(&mut visitor);

        let source = visitor
            .source
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let mut line = format!("{source}: {}: ", level_name(event.metadata().level()));
        if let Some(id) = &visitor.message_id {
            line.push_str(&format!("[{id}]: "));
        }
        line.push_str(&visitor.message);
        if !visitor.fields.is_empty() {
            let extras: Vec<String> = visitor
                .fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            line.push_str(&format!(" {{{}}}", extras.join(", ")));
        }

        // A failed write to stderr has nowhere better to go.
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
        }
    }
}

#[derive(Default)]
struct DiagnosticVisitor {
    message: String,
    message_id: Option<String>,
    source: Option<String>,
    fields: Vec<(String, String)>,
}

impl DiagnosticVisitor {
    fn record_value(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "message_id" => self.message_id = Some(value),
            "source" => self.source = Some(value),
            name => self.fields.push((name.to_string(), value)),
        }
    }
}

impl Visit for DiagnosticVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let raw = format!("{value:?}");
        let value = match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            Some(inner) if field.name() != "message" => inner.to_string(),
            _ => raw,
        };
        self.record_value(field, value);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing::{error, info, warn};
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(f: impl FnOnce()) -> String {
        let buf = SharedBuf::default();
        let subscriber = tracing_subscriber::registry().with(DiagnosticLayer::with_writer(buf.clone()));
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn renders_compiler_style_lines() {
        let out = capture(|| {
            error!(message_id = %"unknown-action", source = "chat.md:3", "unknown action 'x.y'");
        });
        assert_eq!(out, "chat.md:3: error: [unknown-action]: unknown action 'x.y'\n");
    }

    #[test]
    fn events_without_source_use_the_program_name() {
        let out = capture(|| {
            info!("loaded plugin");
            warn!(count = 2, "skipped lines");
        });
        assert_eq!(
            out,
            "prapti: info: loaded plugin\nprapti: warning: skipped lines {count=2}\n"
        );
    }

    #[test]
    fn reports_collected_diagnostics() {
        use crate::diagnostics::Diagnostics;
        use crate::document::SourceLocation;

        let mut diagnostics = Diagnostics::new();
        diagnostics.warning(
            "empty-assignment",
            "skipping assignment to 'model' with no value",
            Some(SourceLocation::new("chat.md", 7)),
        );
        let out = capture(|| diagnostics.report());
        assert!(out.contains(
            "chat.md:7: warning: [empty-assignment]: skipping assignment to 'model' with no value"
        ));
    }
}
