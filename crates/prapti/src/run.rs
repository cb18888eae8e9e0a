//! One complete run: configuration, input interpretation, response.
//!
//! [`run`] returns the new document text instead of writing it, so callers
//! decide how (and whether) to persist it. Fatal errors return `Err` and
//! leave the input untouched by construction.

use std::path::Path;

use tracing::{debug, info};

use crate::config::keys;
use crate::document::{Message, SourceLocation, append_messages};
use crate::error::FatalError;
use crate::interpreter::interpret;
use crate::resolver::{ResolveOptions, load_config_sources, load_start_template, resolve};
use crate::state::ExecutionState;

/// Run-level switches. `dry_run` and `strict` only ever turn the matching
/// configuration flags on.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub strict: bool,
    pub resolve: ResolveOptions,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A responder produced `responses`; `document` has them appended.
    Responded {
        document: String,
        responses: Vec<Message>,
    },
    /// Actions emitted messages; no responder was invoked.
    Emitted { document: String },
    /// The input was blank and is replaced by the start template.
    Template { document: String },
    /// Nothing to respond to. Diagnostics explain why.
    Skipped,
}

impl RunOutcome {
    /// The text to write back, or `None` when the input stays as it is.
    pub fn document(&self) -> Option<&str> {
        match self {
            RunOutcome::Responded { document, .. }
            | RunOutcome::Emitted { document }
            | RunOutcome::Template { document } => Some(document),
            RunOutcome::Skipped => None,
        }
    }
}

/// Interpret configuration and `input`, then generate a response.
pub fn run(
    state: &mut ExecutionState,
    input: &str,
    input_path: &Path,
    options: &RunOptions,
) -> Result<RunOutcome, FatalError> {
    state.input_path = Some(input_path.to_path_buf());
    apply_overrides(state, options);

    let sources = resolve(Some(input_path), &options.resolve);
    load_config_sources(state, &sources)?;

    if input.trim().is_empty() {
        info!("{} is blank; writing the start template", input_path.display());
        return Ok(RunOutcome::Template {
            document: load_start_template(state, input_path, &options.resolve),
        });
    }

    interpret(state, input, input_path)?;
    apply_overrides(state, options);

    if !state.emitted.is_empty() {
        debug!("{} message(s) emitted; skipping the responder", state.emitted.len());
        let mut appended = state.emitted.clone();
        appended.extend(user_prompt(state));
        return Ok(RunOutcome::Emitted {
            document: append_messages(input, &appended),
        });
    }

    match state.last_visible_message() {
        None => {
            state.diagnostics.error(
                "absent-prompt",
                "there is no enabled message to respond to",
                Some(SourceLocation::file(input_path)),
            );
            return Ok(RunOutcome::Skipped);
        }
        Some(message) if message.is_empty() => {
            let location = message.source.clone();
            state.diagnostics.error(
                "empty-final-prompt",
                "the final message is empty; write a prompt before requesting a response",
                location,
            );
            return Ok(RunOutcome::Skipped);
        }
        Some(_) => {}
    }

    if state.config.get_bool(keys::STRICT) {
        let errors = state.diagnostics.error_count();
        if errors > 0 {
            return Err(FatalError::StrictMode(errors));
        }
    }

    let responses = state.generate(None)?;
    let mut appended = responses.clone();
    appended.extend(user_prompt(state));
    Ok(RunOutcome::Responded {
        document: append_messages(input, &appended),
        responses,
    })
}

/// The empty user heading appended after output when `append_user_prompt`
/// is set, named after the last enabled user message.
fn user_prompt(state: &ExecutionState) -> Option<Message> {
    if !state.config.get_bool(keys::APPEND_USER_PROMPT) {
        return None;
    }
    let name = state
        .messages
        .iter()
        .rev()
        .find(|m| m.enabled && m.role == "user")
        .and_then(|m| m.name.clone());
    Some(Message::new("user").with_name(name))
}

fn apply_overrides(state: &mut ExecutionState, options: &RunOptions) {
    for (enabled, key) in [(options.dry_run, keys::DRY_RUN), (options.strict, keys::STRICT)] {
        if enabled && let Err(e) = state.config.set(key, true.into()) {
            debug!("couldn't apply {key} override: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DEFAULT_TEMPLATE;
    use crate::responder::CancelToken;
    use crate::testing::catalog;

    fn isolated() -> RunOptions {
        RunOptions {
            resolve: ResolveOptions {
                no_default_config: true,
                ..ResolveOptions::default()
            },
            ..RunOptions::default()
        }
    }

    fn run_doc(doc: &str, options: &RunOptions) -> (ExecutionState, Result<RunOutcome, FatalError>) {
        let mut state = ExecutionState::new(catalog());
        let outcome = run(&mut state, doc, Path::new("chat.md"), options);
        (state, outcome)
    }

    #[test]
    fn blank_input_yields_the_template() {
        let (_, outcome) = run_doc(" \n\n", &isolated());
        assert_eq!(outcome.unwrap().document(), Some(DEFAULT_TEMPLATE));
    }

    #[test]
    fn response_is_appended() {
        let doc = "% responder.new default test.echo\n### @user:\nping\n";
        let (_, outcome) = run_doc(doc, &isolated());
        let outcome = outcome.unwrap();
        assert_eq!(outcome.document(), Some(&*format!("{doc}\n### @assistant:\npong\n")));
        let RunOutcome::Responded { responses, .. } = outcome else {
            panic!("expected a response");
        };
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn latest_assignment_reaches_the_responder() {
        let doc = "% responder.new default test.echo\n\
                   % temperature = 0.8\n\
                   ### @user:\n\
                   % temperature = 0.2\n\
                   Hi\n";
        let (state, outcome) = run_doc(doc, &isolated());
        assert!(outcome.is_ok());
        assert_eq!(
            state.config.get("responders.default.temperature").unwrap().as_f64(),
            Some(0.2)
        );
    }

    #[test]
    fn unknown_command_does_not_block_the_response() {
        let doc = "% responder.new default test.echo\n\
                   % responders.default.transcript = true\n\
                   ### @user:\nbefore\n% unknown.command foo\nafter\n";
        let (state, outcome) = run_doc(doc, &isolated());
        let RunOutcome::Responded { responses, .. } = outcome.unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(responses[0].text(), "user: before\nafter");
        assert_eq!(state.diagnostics.error_count(), 1);
    }

    #[test]
    fn emitted_messages_short_circuit_the_responder() {
        let doc = "% responder.new default test.failing\n### @user:\nHi\n% !plugins.list\n";
        let (_, outcome) = run_doc(doc, &isolated());
        let outcome = outcome.unwrap();
        assert!(matches!(outcome, RunOutcome::Emitted { .. }));
        assert!(outcome.document().unwrap().contains("### //@_prapti/plugins:"));
    }

    #[test]
    fn nothing_to_respond_to() {
        let (state, outcome) = run_doc("### //@user:\nHi\n", &isolated());
        assert_eq!(outcome.unwrap(), RunOutcome::Skipped);
        assert!(state.diagnostics.contains("absent-prompt"));

        let (state, outcome) = run_doc("### @user:\nHi\n### @user:\n\n", &isolated());
        assert_eq!(outcome.unwrap(), RunOutcome::Skipped);
        assert!(state.diagnostics.contains("empty-final-prompt"));
    }

    #[test]
    fn strict_mode_aborts_on_errors() {
        let options = RunOptions {
            strict: true,
            ..isolated()
        };
        let doc = "% responder.new default test.echo\n% nosuch.key = 1\n### @user:\nHi\n";
        let (_, outcome) = run_doc(doc, &options);
        assert!(matches!(outcome, Err(FatalError::StrictMode(1))));
    }

    #[test]
    fn strict_can_be_set_in_the_document() {
        let doc = "% strict = true\n% no.such.action\n% responder.new default test.echo\n### @user:\nHi\n";
        let (_, outcome) = run_doc(doc, &isolated());
        assert!(matches!(outcome, Err(FatalError::StrictMode(1))));
    }

    #[test]
    fn responder_failures_are_fatal() {
        let doc = "% responder.new default test.failing\n### @user:\nHi\n";
        let (_, outcome) = run_doc(doc, &isolated());
        assert!(matches!(outcome, Err(FatalError::Responder { .. })));

        let (_, outcome) = run_doc("### @user:\nHi\n", &isolated());
        assert!(matches!(outcome, Err(FatalError::ResponderNotFound(ref name)) if name == "default"));
    }

    #[test]
    fn active_responder_follows_the_stack() {
        let doc = "% responder.new default test.echo\n\
                   % responder.new other test.echo\n\
                   % responders.other.reply = \"from other\"\n\
                   % responder.push other\n\
                   ### @user:\nHi\n";
        let (_, outcome) = run_doc(doc, &isolated());
        let RunOutcome::Responded { responses, .. } = outcome.unwrap() else {
            panic!("expected a response");
        };
        assert_eq!(responses[0].text(), "from other");
    }

    #[test]
    fn append_user_prompt_reuses_the_user_name() {
        let doc = "% append_user_prompt = true\n\
                   % responder.new default test.echo\n\
                   ### @user/alice:\nHi\n";
        let (_, outcome) = run_doc(doc, &isolated());
        let document = outcome.unwrap().document().unwrap().to_string();
        assert!(document.ends_with("### @assistant:\npong\n\n### @user/alice:\n"));
    }

    #[test]
    fn append_user_prompt_follows_emitted_messages() {
        let doc = "% append_user_prompt = true\n### @user/bob:\nHi\n% !plugins.list\n";
        let (_, outcome) = run_doc(doc, &isolated());
        let outcome = outcome.unwrap();
        assert!(matches!(outcome, RunOutcome::Emitted { .. }));
        assert!(outcome.document().unwrap().ends_with("\n\n### @user/bob:\n"));

        let doc = "### @user:\nHi\n% !plugins.list\n";
        let (_, outcome) = run_doc(doc, &isolated());
        assert!(!outcome.unwrap().document().unwrap().ends_with("### @user:\n"));
    }

    #[test]
    fn late_global_alias_reaches_the_responder() {
        let doc = "% responder.new default test.echo\n\
                   % responder.push elsewhere\n\
                   % model = \"late\"\n\
                   % responder.pop\n\
                   ### @user:\nHi\n";
        let (state, outcome) = run_doc(doc, &isolated());
        assert!(outcome.is_ok());
        assert_eq!(state.config.get("model").unwrap().as_str(), Some("late"));
        assert_eq!(
            state.config.get("responders.default.model").unwrap().as_str(),
            Some("late")
        );
    }

    #[test]
    fn newer_responder_field_beats_older_global() {
        let doc = "% model = \"early\"\n\
                   % responder.new default test.echo\n\
                   % responders.default.model = \"specific\"\n\
                   ### @user:\nHi\n";
        let (state, outcome) = run_doc(doc, &isolated());
        assert!(outcome.is_ok());
        assert_eq!(
            state.config.get("responders.default.model").unwrap().as_str(),
            Some("specific")
        );
    }

    #[test]
    fn cancellation_discards_output() {
        let token = CancelToken::new();
        token.cancel();
        let mut state = ExecutionState::new(catalog()).with_cancel_token(token);
        let doc = "% responder.new default test.echo\n### @user:\nHi\n";
        let outcome = run(&mut state, doc, Path::new("chat.md"), &isolated());
        assert!(matches!(outcome, Err(FatalError::Cancelled)));
    }

    #[test]
    fn dry_run_flag_is_visible_to_configuration() {
        let options = RunOptions {
            dry_run: true,
            ..isolated()
        };
        let doc = "% responder.new default test.echo\n### @user:\nHi\n";
        let (state, outcome) = run_doc(doc, &options);
        assert!(outcome.is_ok());
        assert!(state.config.get_bool(keys::DRY_RUN));
    }
}
