//! End-to-end runs of the tool against documents on disk.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use prapti::document::DEFAULT_TEMPLATE;
use prapti::error::FatalError;
use prapti::resolver::UserConfigDirs;
use prapti::run::RunOutcome;
use prapti::state::ExecutionState;
use prapti_tool::{Cli, builtin_catalog, execute};
use tempfile::tempdir;

const TEST_RESPONDER: &str = "\
% plugins.load prapti.test.test_responder
% responder.new default prapti.test.test_responder
";

fn run_file(path: &Path, extra: &[&str]) -> (ExecutionState, Result<RunOutcome, FatalError>) {
    let mut argv = vec!["prapti", "--no-default-config"];
    argv.extend_from_slice(extra);
    let path = path.to_string_lossy().into_owned();
    argv.push(&path);
    let cli = Cli::parse_from(argv);
    let mut state = ExecutionState::new(builtin_catalog());
    let outcome = execute(&cli, &mut state, UserConfigDirs::default());
    (state, outcome)
}

fn chat_file(dir: &Path, text: &str) -> PathBuf {
    let path = dir.join("chat.md");
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn response_is_appended_to_the_file() {
    let tmp = tempdir().unwrap();
    let doc = format!("{TEST_RESPONDER}### @user:\nHello");
    let path = chat_file(tmp.path(), &doc);

    let (_, outcome) = run_file(&path, &[]);
    assert!(matches!(outcome, Ok(RunOutcome::Responded { .. })));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        format!("{doc}\n\n### @assistant:\nTest!\n")
    );
}

#[test]
fn blank_file_gets_the_template() {
    let tmp = tempdir().unwrap();
    let path = chat_file(tmp.path(), "\n  \n");
    let (_, outcome) = run_file(&path, &[]);
    assert!(matches!(outcome, Ok(RunOutcome::Template { .. })));
    assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_TEMPLATE);
}

#[test]
fn plugin_listing_is_written_instead_of_a_response() {
    let tmp = tempdir().unwrap();
    let doc = "% plugins.load prapti.include\n### @user:\n% !plugins.list\n";
    let path = chat_file(tmp.path(), doc);

    let (_, outcome) = run_file(&path, &[]);
    assert!(matches!(outcome, Ok(RunOutcome::Emitted { .. })));
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.starts_with(doc));
    assert!(written.contains("### //@_prapti/plugins:\nAvailable plugins:"));
    assert!(written.contains("- **`prapti.include`** 0.1.0: Commands for including file contents (loaded)"));
    assert!(written.contains("- **`openai.chat`**"));
}

#[test]
fn included_code_reaches_the_responder_input() {
    let tmp = tempdir().unwrap();
    fs::create_dir(tmp.path().join("src")).unwrap();
    fs::write(tmp.path().join("src/lib.rs"), "pub fn answer() -> u32 { 42 }\n").unwrap();
    let doc = format!(
        "{TEST_RESPONDER}% plugins.load prapti.include\n### @user:\nReview:\n% include.code src/lib.rs\n"
    );
    let path = chat_file(tmp.path(), &doc);

    let (state, outcome) = run_file(&path, &["--strict"]);
    assert!(outcome.is_ok());
    assert_eq!(
        state.last_visible_message().unwrap().text(),
        "Review:\n```rust:lib.rs\npub fn answer() -> u32 { 42 }\n```"
    );
}

#[test]
fn test_actions_run_without_output() {
    let tmp = tempdir().unwrap();
    let doc = format!(
        "{TEST_RESPONDER}% plugins.load prapti.test.test_actions\n\
         % plugins.load prapti.test.test_config\n\
         % plugins.prapti.test.test_config.a_list_of_strings = [\"a\", 'b']\n\
         ### @user:\n% test.test one\n% teest.test\n% teast.test two three\nHi\n"
    );
    let path = chat_file(tmp.path(), &doc);

    let (state, outcome) = run_file(&path, &["--strict"]);
    assert!(outcome.is_ok());
    assert!(state.diagnostics.is_empty());
    assert_eq!(state.last_visible_message().unwrap().text(), "Hi");
    let list = state
        .config
        .get("plugins.prapti.test.test_config.a_list_of_strings")
        .unwrap()
        .as_string_list();
    assert_eq!(list, Some(vec!["a".to_string(), "b".to_string()]));
}

#[test]
fn short_action_names_resolve_or_report_ambiguity() {
    let tmp = tempdir().unwrap();
    let doc = format!(
        "{TEST_RESPONDER}% plugins.load prapti.test.test_actions\n\
         ### @user:\n% test\n% teest\n% teast.test\nHi\n"
    );
    let path = chat_file(tmp.path(), &doc);

    let (state, outcome) = run_file(&path, &[]);
    assert!(matches!(outcome, Ok(RunOutcome::Responded { .. })));
    assert_eq!(state.diagnostics.error_count(), 1);
    let diagnostic = state.diagnostics.iter().next().unwrap();
    assert_eq!(diagnostic.id, "ambiguous-action-name");
    assert!(diagnostic.message.contains("teast.test, teest.test or test.test"));
    assert_eq!(state.last_visible_message().unwrap().text(), "Hi");
}

#[test]
fn strict_errors_leave_the_file_untouched() {
    let tmp = tempdir().unwrap();
    let doc = format!("{TEST_RESPONDER}% no.such.command\n### @user:\nHello\n");
    let path = chat_file(tmp.path(), &doc);

    let (_, outcome) = run_file(&path, &["--strict"]);
    assert!(matches!(outcome, Err(FatalError::StrictMode(1))));
    assert_eq!(fs::read_to_string(&path).unwrap(), doc);

    let (state, outcome) = run_file(&path, &[]);
    assert!(outcome.is_ok());
    assert!(state.diagnostics.contains("unknown-action"));
}

#[test]
fn empty_final_prompt_leaves_the_file_untouched() {
    let tmp = tempdir().unwrap();
    let doc = format!("{TEST_RESPONDER}### @user:\nHello\n\n### @assistant:\nHi\n\n### @user:\n\n");
    let path = chat_file(tmp.path(), &doc);

    let (state, outcome) = run_file(&path, &[]);
    assert!(matches!(outcome, Ok(RunOutcome::Skipped)));
    assert!(state.diagnostics.contains("empty-final-prompt"));
    assert_eq!(fs::read_to_string(&path).unwrap(), doc);
}

#[test]
fn missing_input_is_an_io_error() {
    let tmp = tempdir().unwrap();
    let (_, outcome) = run_file(&tmp.path().join("absent.md"), &[]);
    assert!(matches!(outcome, Err(FatalError::Io { .. })));
}
