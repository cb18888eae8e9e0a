//! Single-pass interpretation of one document against the run state.
//!
//! [`interpret`] walks the [`Segmenter`] output left to right. Headings
//! close the current message and open the next one; text spans become
//! message content; configuration lines are parsed into a [`Command`] and
//! executed immediately, so an assignment is visible to every later line
//! and to no earlier one.
//!
//! A configuration line prefixed with `!` runs only when it sits in the
//! document's final message, and then in place like any other line.
//! Exclamation-only actions refuse to run from a plain `%` line.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//! use prapti::interpreter::interpret;
//! use prapti::state::ExecutionState;
//!
//! let mut state = ExecutionState::default();
//! let doc = "### @user:\n% temperature = 0.2\nHello\n";
//! interpret(&mut state, doc, Path::new("chat.md")).unwrap();
//!
//! assert_eq!(state.messages.len(), 1);
//! assert_eq!(state.messages[0].text(), "Hello");
//! assert_eq!(state.config.get("temperature").unwrap().as_f64(), Some(0.2));
//! ```

use std::path::Path;

use tracing::debug;

use crate::action::{ActionContext, ActionOutput};
use crate::config::{keys, parse_literal};
use crate::document::{HEAD_ROLE, Message, Segment, Segmenter, SourceLocation};
use crate::error::{ActionError, FatalError, LineError};
use crate::state::ExecutionState;

/// A parsed configuration line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `path = literal`. `value` is the trimmed right-hand side.
    Assign { path: &'a str, value: &'a str },
    /// `name args...`. `args` is trimmed.
    Invoke { name: &'a str, args: &'a str },
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '\\')
}

/// Split configuration-line text into a command.
///
/// Returns `None` when the text does not start with a name, or the name is
/// followed by something other than `=`, whitespace or the end of the line.
#[allow(clippy::string_slice)] // split points are char boundaries
pub fn parse_command(text: &str) -> Option<Command<'_>> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|&(_, c)| !is_name_char(c))
        .map_or(text.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    let (name, rest) = (&text[..end], &text[end..]);
    if rest.is_empty() {
        return Some(Command::Invoke { name, args: "" });
    }
    if !rest.starts_with(char::is_whitespace) && !rest.starts_with('=') {
        return None;
    }
    let rest = rest.trim_start();
    match rest.strip_prefix('=') {
        Some(value) => Some(Command::Assign {
            path: name,
            value: value.trim(),
        }),
        None => Some(Command::Invoke { name, args: rest }),
    }
}

/// Whether `text` contains an enabled `config_root = true` assignment,
/// determined without executing anything. `fenced_code_verbatim` must match
/// the mode the text will be interpreted with.
pub fn is_config_root(text: &str, fenced_code_verbatim: bool) -> bool {
    let mut message_enabled = true;
    let mut root = false;
    for segment in Segmenter::new(text).with_fenced_code_verbatim(fenced_code_verbatim) {
        match segment {
            Segment::MessageHeading { enabled, .. } => message_enabled = enabled,
            Segment::ConfigLine {
                enabled: true,
                text,
                ..
            } if message_enabled => {
                if let Some(Command::Assign { path, value }) = parse_command(text)
                    && path == keys::CONFIG_ROOT
                    && let Ok(value) = parse_literal(value)
                    && let Some(flag) = value.as_bool()
                {
                    root = flag;
                }
            }
            _ => {}
        }
    }
    root
}

/// Interpret one document, appending its messages to `state.messages`.
///
/// Per-line problems are recorded in `state.diagnostics` and the line is
/// skipped. Only fatal errors (plugin conflicts, responder failures from a
/// re-entrant `generate`, cancellation) stop interpretation.
pub fn interpret(state: &mut ExecutionState, text: &str, origin: &Path) -> Result<(), FatalError> {
    let verbatim = state.config.get_bool(keys::FENCED_CODE_VERBATIM);
    let segments = || Segmenter::new(text).with_fenced_code_verbatim(verbatim);
    let heading_count = segments()
        .filter(|s| matches!(s, Segment::MessageHeading { .. }))
        .count();
    let mut headings_seen = 0;
    let mut current = Message::head(SourceLocation::new(origin, 1));

    for segment in segments() {
        match segment {
            Segment::MessageHeading {
                role,
                name,
                enabled,
                line,
                ..
            } => {
                headings_seen += 1;
                let next = Message::new(role)
                    .with_name(name)
                    .with_enabled(enabled)
                    .with_source(SourceLocation::new(origin, line));
                close_message(state, std::mem::replace(&mut current, next));
            }
            Segment::TextSpan { text, .. } => {
                if current.enabled {
                    current.push_content(text);
                }
            }
            Segment::ConfigLine {
                enabled,
                text,
                line,
                ..
            } => {
                if !enabled || !current.enabled {
                    debug!("{}:{line}: ignoring disabled configuration line", origin.display());
                    continue;
                }
                let (text, exclamation) = match text.strip_prefix('!') {
                    Some(rest) => (rest.trim_start(), true),
                    None => (text, false),
                };
                if exclamation && headings_seen != heading_count {
                    debug!("{}:{line}: skipping '!' line outside the final message", origin.display());
                    continue;
                }
                let location = SourceLocation::new(origin, line);
                if let Some(output) = execute_line(state, &mut current, text, exclamation, &location)? {
                    current.push_content(output);
                }
            }
        }
    }
    close_message(state, current);
    Ok(())
}

fn close_message(state: &mut ExecutionState, message: Message) {
    if message.role == HEAD_ROLE && message.is_empty() {
        return;
    }
    state.messages.push(message);
}

/// Execute one configuration line. Returns text to splice into the
/// message, if any.
fn execute_line(
    state: &mut ExecutionState,
    message: &mut Message,
    text: &str,
    exclamation: bool,
    location: &SourceLocation,
) -> Result<Option<String>, FatalError> {
    let Some(command) = parse_command(text) else {
        let err = LineError::MalformedCommand {
            text: text.to_string(),
        };
        state
            .diagnostics
            .warning(err.id(), err.to_string(), Some(location.clone()));
        return Ok(None);
    };
    match command {
        Command::Assign { path, value } => {
            assign(state, path, value, location);
            Ok(None)
        }
        Command::Invoke { name, args } => invoke(state, message, name, args, exclamation, location),
    }
}

fn assign(state: &mut ExecutionState, path: &str, value: &str, location: &SourceLocation) {
    if value.is_empty() {
        state.diagnostics.warning(
            "empty-assignment",
            format!("skipping assignment to '{path}' with no value"),
            Some(location.clone()),
        );
        return;
    }
    let resolved = state.config.resolve_assignment_path(path);
    match parse_literal(value).and_then(|v| state.config.set(&resolved, v)) {
        Ok(()) => debug!("{location}: {resolved} = {value}"),
        Err(e) => state.diagnostics.line_error(&e, location),
    }
}

fn invoke(
    state: &mut ExecutionState,
    message: &mut Message,
    name: &str,
    args: &str,
    exclamation: bool,
    location: &SourceLocation,
) -> Result<Option<String>, FatalError> {
    let resolved = match state.actions.lookup(name) {
        Ok(resolved) if resolved.exclamation_only && !exclamation => {
            Err(LineError::ExclamationRequired { name: resolved.name })
        }
        other => other,
    };
    let action = match resolved {
        Ok(resolved) => resolved.action,
        Err(e) => {
            state.diagnostics.line_error(&e, location);
            return Ok(None);
        }
    };
    debug!("{location}: running '{name}'");
    let mut ctx = ActionContext {
        state: &mut *state,
        message: &mut *message,
        location,
    };
    match action.execute(args, &mut ctx) {
        Ok(ActionOutput::None) => Ok(None),
        Ok(ActionOutput::Text(text)) => Ok(Some(text)),
        Ok(ActionOutput::Message(emitted)) => {
            state.emitted.push(emitted);
            Ok(None)
        }
        Err(ActionError::Line(e)) => {
            state.diagnostics.line_error(&e, location);
            Ok(None)
        }
        Err(ActionError::Fatal(e)) => Err(e),
    }
}
