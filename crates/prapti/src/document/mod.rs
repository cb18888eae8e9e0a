//! The chat document model: messages, source locations and serialization.
//!
//! A document is markdown text in which `### @role[/name]:` headings start
//! messages. [`Segmenter`] lexes the text; the
//! [`interpreter`](crate::interpreter) turns segments into [`Message`]s;
//! [`append_messages`] writes new messages back in the same format.

mod segment;

pub use segment::{Segment, Segmenter};

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Role of the implicit message holding text before the first heading.
pub const HEAD_ROLE: &str = "_head";

/// Written in place of a blank input document.
pub const DEFAULT_TEMPLATE: &str = "\
### @system:
You are a helpful assistant.

### @user:

";

/// A file and 1-based line. Line `0` refers to the file as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// A location naming a file without a particular line.
    pub fn file(file: impl Into<PathBuf>) -> Self {
        Self::new(file, 0)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}", self.file.display())
        } else {
            write!(f, "{}:{}", self.file.display(), self.line)
        }
    }
}

/// One role-tagged unit of conversation.
///
/// `content` holds the literal text spans of the message in document order,
/// with configuration lines removed and replaced by their command output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub name: Option<String>,
    pub enabled: bool,
    pub content: Vec<String>,
    pub source: Option<SourceLocation>,
}

impl Message {
    /// An enabled message with no content.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: None,
            enabled: true,
            content: Vec::new(),
            source: None,
        }
    }

    /// An enabled message with a single content span.
    pub fn with_content(role: impl Into<String>, text: impl Into<String>) -> Self {
        let mut message = Self::new(role);
        message.content.push(text.into());
        message
    }

    /// The implicit leading message of a document.
    pub fn head(source: SourceLocation) -> Self {
        Self::new(HEAD_ROLE).with_source(source)
    }

    pub fn with_name(mut self, name: Option<impl Into<String>>) -> Self {
        self.name = name.map(Into::into);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_source(mut self, source: SourceLocation) -> Self {
        self.source = Some(source);
        self
    }

    pub fn push_content(&mut self, text: impl Into<String>) {
        self.content.push(text.into());
    }

    /// Roles starting with `_` are hidden from responders.
    pub fn is_hidden(&self) -> bool {
        self.role.starts_with('_')
    }

    /// Enabled and not hidden.
    pub fn is_visible(&self) -> bool {
        self.enabled && !self.is_hidden()
    }

    /// The content spans joined, with surrounding whitespace trimmed.
    pub fn text(&self) -> String {
        self.content.concat().trim().to_string()
    }

    /// Whether the message has no non-whitespace content.
    pub fn is_empty(&self) -> bool {
        self.content.iter().all(|span| span.trim().is_empty())
    }

    /// The heading line, without a line terminator.
    pub fn heading(&self) -> String {
        let marker = if self.enabled { "" } else { "//" };
        match &self.name {
            Some(name) => format!("### {marker}@{}/{name}:", self.role),
            None => format!("### {marker}@{}:", self.role),
        }
    }

    /// Heading and content in document form, ending with a newline.
    pub fn render(&self) -> String {
        let text = self.text();
        if text.is_empty() {
            format!("{}\n", self.heading())
        } else {
            format!("{}\n{text}\n", self.heading())
        }
    }
}

/// Append `messages` to `document`, separated from existing content and
/// from each other by a blank line.
///
/// # Examples
///
/// ```
/// use prapti::document::{Message, append_messages};
///
/// let out = append_messages("### @user:\nHi\n", &[Message::with_content("assistant", "pong")]);
/// assert_eq!(out, "### @user:\nHi\n\n### @assistant:\npong\n");
/// ```
pub fn append_messages(document: &str, messages: &[Message]) -> String {
    let mut out = document.to_string();
    for message in messages {
        if !out.is_empty() {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            if !out.ends_with("\n\n") {
                out.push('\n');
            }
        }
        out.push_str(&message.render());
    }
    out
}

/// The directory relative paths in a document resolve against.
pub fn document_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_and_visible() {
        let head = Message::head(SourceLocation::new("doc.md", 1));
        assert!(head.is_hidden());
        assert!(!head.is_visible());

        let disabled = Message::with_content("user", "hi").with_enabled(false);
        assert!(!disabled.is_visible());
        assert!(Message::new("user").is_visible());
    }

    #[test]
    fn text_trims_and_joins() {
        let mut message = Message::new("user");
        message.push_content("\n  Hello\n");
        message.push_content("world\n\n");
        assert_eq!(message.text(), "Hello\nworld");
        assert!(!message.is_empty());
        assert!(Message::with_content("user", " \n\t").is_empty());
    }

    #[test]
    fn renders_headings() {
        let message = Message::with_content("assistant", "pong").with_name(Some("Alice"));
        assert_eq!(message.render(), "### @assistant/Alice:\npong\n");

        let listing = Message::with_content("_prapti", "x")
            .with_name(Some("plugins"))
            .with_enabled(false);
        assert_eq!(listing.heading(), "### //@_prapti/plugins:");
        assert_eq!(Message::new("user").render(), "### @user:\n");
    }

    #[test]
    fn append_separates_with_blank_line() {
        let pong = [Message::with_content("assistant", "pong")];
        assert_eq!(
            append_messages("### @user:\nHi", &pong),
            "### @user:\nHi\n\n### @assistant:\npong\n"
        );
        assert_eq!(
            append_messages("### @user:\nHi\n\n", &pong),
            "### @user:\nHi\n\n### @assistant:\npong\n"
        );
        let two = [Message::with_content("assistant", "a"), Message::new("user")];
        assert_eq!(append_messages("", &two), "### @assistant:\na\n\n### @user:\n");
    }

    #[test]
    fn locations_display_like_compiler_output() {
        assert_eq!(SourceLocation::new("chat.md", 3).to_string(), "chat.md:3");
        assert_eq!(SourceLocation::file("chat.md").to_string(), "chat.md");
    }

    #[test]
    fn document_dir_defaults_to_current_dir() {
        assert_eq!(document_dir(Path::new("chat.md")), Path::new("."));
        assert_eq!(document_dir(Path::new("a/chat.md")), Path::new("a"));
    }
}
