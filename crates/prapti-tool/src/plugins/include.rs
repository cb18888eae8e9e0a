//! `prapti.include`: splice file contents into a message.

use std::fs;
use std::path::Path;

use prapti::action::{ActionContext, ActionOutput, FnAction};
use prapti::error::{ActionError, LineError};
use prapti::plugin::{Plugin, PluginRegistrar};

pub struct IncludePlugin;

impl IncludePlugin {
    pub const NAME: &'static str = "prapti.include";
}

impl Plugin for IncludePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Commands for including file contents"
    }

    fn register(&self, registrar: &mut PluginRegistrar) {
        registrar.add_action("include.code", FnAction::new(include_code));
    }
}

/// Fence language tag for a file, or `""` when unknown.
fn markdown_language(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "py" => "python",
        "md" => "markdown",
        "js" => "javascript",
        "ts" => "typescript",
        "html" | "htm" => "html",
        "css" => "css",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" | "hh" | "cxx" | "hxx" | "c++" | "h++" => "cpp",
        "rs" => "rust",
        "toml" => "toml",
        "json" => "json",
        "sh" => "bash",
        _ => "",
    }
}

/// `% include.code <path>`: the file as a fenced code block, tagged
/// `language:file-name`. Relative paths resolve against the directory of
/// the document containing the line.
fn include_code(args: &str, ctx: &mut ActionContext<'_>) -> Result<ActionOutput, ActionError> {
    let arg = args.trim().trim_matches(|c| c == '"' || c == '\'');
    if arg.is_empty() {
        return Err(LineError::action("include.code", "expected a file path").into());
    }
    let path = Path::new(arg);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.document_dir().join(path)
    };
    let content = fs::read_to_string(&path).map_err(|e| {
        LineError::action("include.code", format!("couldn't read {}: {e}", path.display()))
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ActionOutput::Text(format!(
        "```{}:{file_name}\n{}\n```\n",
        markdown_language(&path),
        content.trim()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prapti::interpreter::interpret;
    use prapti::plugin::PluginCatalog;
    use prapti::state::ExecutionState;
    use tempfile::tempdir;

    #[test]
    fn languages_by_extension() {
        assert_eq!(markdown_language(Path::new("a.py")), "python");
        assert_eq!(markdown_language(Path::new("lib.RS")), "rust");
        assert_eq!(markdown_language(Path::new("x.hpp")), "cpp");
        assert_eq!(markdown_language(Path::new("Makefile")), "");
    }

    #[test]
    fn includes_relative_to_the_document() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("hello.py"), "print('hi')\n\n").unwrap();
        let chat = tmp.path().join("chat.md");

        let mut state = ExecutionState::new(PluginCatalog::new().with(IncludePlugin));
        let doc = "% plugins.load prapti.include\n### @user:\nExplain:\n% include.code \"hello.py\"\n";
        interpret(&mut state, doc, &chat).unwrap();

        assert!(state.diagnostics.is_empty());
        assert_eq!(
            state.messages[0].text(),
            "Explain:\n```python:hello.py\nprint('hi')\n```"
        );
    }

    #[test]
    fn missing_file_is_a_line_error() {
        let tmp = tempdir().unwrap();
        let mut state = ExecutionState::new(PluginCatalog::new().with(IncludePlugin));
        let doc = "% plugins.load prapti.include\n### @user:\n% include.code nope.txt\nHi\n";
        interpret(&mut state, doc, &tmp.path().join("chat.md")).unwrap();
        assert!(state.diagnostics.contains("action-failed"));
        assert_eq!(state.messages[0].text(), "Hi");
    }
}
