//! Lossless segmentation of a chat document.
//!
//! [`Segmenter`] is a lazy iterator that splits document text into message
//! headings, configuration lines and text spans. Every segment borrows its
//! raw text from the input, and concatenating the raw text of all segments
//! reproduces the input exactly. Segmentation never fails: anything that
//! does not match the heading or configuration-line grammar is text.
//!
//! # Examples
//!
//! ```
//! use prapti::document::{Segment, Segmenter};
//!
//! let doc = "### @user:\n% temperature = 0.2\nHello\n";
//! let segments: Vec<_> = Segmenter::new(doc).collect();
//!
//! assert!(matches!(segments[0], Segment::MessageHeading { role: "user", .. }));
//! assert!(matches!(segments[1], Segment::ConfigLine { text: "temperature = 0.2", .. }));
//! assert!(matches!(segments[2], Segment::TextSpan { text: "Hello\n", .. }));
//! ```

/// One lexical unit of a chat document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// `### @role[/name]:`, or `### //@role:` when disabled.
    MessageHeading {
        role: &'a str,
        name: Option<&'a str>,
        enabled: bool,
        raw: &'a str,
        line: usize,
    },
    /// `% ...`, optionally block-quoted (`> % ...`) or disabled (`//% ...`).
    ConfigLine {
        enabled: bool,
        in_blockquote: bool,
        /// The line after the `%` marker, trimmed.
        text: &'a str,
        raw: &'a str,
        line: usize,
    },
    /// One or more consecutive ordinary lines.
    TextSpan { text: &'a str, line: usize },
}

impl<'a> Segment<'a> {
    /// Source text of the segment, including its line terminator.
    pub fn raw(&self) -> &'a str {
        match self {
            Segment::MessageHeading { raw, .. } | Segment::ConfigLine { raw, .. } => raw,
            Segment::TextSpan { text, .. } => text,
        }
    }

    /// 1-based line number of the segment's first line.
    pub fn line(&self) -> usize {
        match self {
            Segment::MessageHeading { line, .. }
            | Segment::ConfigLine { line, .. }
            | Segment::TextSpan { line, .. } => *line,
        }
    }
}

/// An open code fence: its marker character and run length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fence {
    marker: char,
    len: usize,
}

/// Lazy segment iterator over a document.
///
/// Cloning a segmenter, or creating a new one over the same text, restarts
/// segmentation from that point.
#[derive(Debug, Clone)]
pub struct Segmenter<'a> {
    rest: &'a str,
    line: usize,
    fence: Option<Fence>,
    fenced_code_verbatim: bool,
}

impl<'a> Segmenter<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            rest: text,
            line: 1,
            fence: None,
            fenced_code_verbatim: true,
        }
    }

    /// Whether fenced code blocks suspend heading and config-line
    /// recognition (builder pattern). Enabled by default.
    pub fn with_fenced_code_verbatim(mut self, enabled: bool) -> Self {
        self.fenced_code_verbatim = enabled;
        self
    }

    /// Split off the next physical line, including its terminator.
    fn take_line(&mut self) -> &'a str {
        let end = self.rest.find('\n').map_or(self.rest.len(), |i| i + 1);
        let (line, rest) = self.rest.split_at(end);
        self.rest = rest;
        self.line += 1;
        line
    }

    fn peek_line(&self) -> &'a str {
        let end = self.rest.find('\n').map_or(self.rest.len(), |i| i + 1);
        self.rest.split_at(end).0
    }

    /// Whether `line` is an ordinary text line in the current fence state.
    fn is_text(&self, line: &str) -> bool {
        self.fence.is_some() || (parse_heading(line).is_none() && parse_config_line(line).is_none())
    }

    /// Update fence state for a line that is being consumed as text.
    fn track_fence(&mut self, line: &str) {
        if !self.fenced_code_verbatim {
            return;
        }
        match self.fence {
            Some(open) => {
                if closes_fence(line, open) {
                    self.fence = None;
                }
            }
            None => self.fence = opens_fence(line),
        }
    }
}

impl<'a> Iterator for Segmenter<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        if self.rest.is_empty() {
            return None;
        }
        let start_line = self.line;
        let first = self.peek_line();

        if !self.is_text(first) {
            let raw = self.take_line();
            if let Some((role, name, enabled)) = parse_heading(raw) {
                return Some(Segment::MessageHeading {
                    role,
                    name,
                    enabled,
                    raw,
                    line: start_line,
                });
            }
            if let Some((enabled, in_blockquote, text)) = parse_config_line(raw) {
                return Some(Segment::ConfigLine {
                    enabled,
                    in_blockquote,
                    text,
                    raw,
                    line: start_line,
                });
            }
        }

        // Coalesce ordinary lines into one span.
        let span_start = self.rest;
        let mut len = 0;
        while !self.rest.is_empty() {
            let line = self.peek_line();
            if !self.is_text(line) {
                break;
            }
            self.take_line();
            self.track_fence(line);
            len += line.len();
        }
        let (text, _) = span_start.split_at(len);
        Some(Segment::TextSpan {
            text,
            line: start_line,
        })
    }
}

// ── Line grammar ────────────────────────────────────────────────────

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split `s` into a leading identifier and the remainder.
fn split_ident(s: &str) -> Option<(&str, &str)> {
    let end = s.find(|c: char| !is_ident_char(c)).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    Some(s.split_at(end))
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// Parse `### @role[/name]:` (or `### //@role[/name]:`).
///
/// Returns `(role, name, enabled)`.
fn parse_heading(line: &str) -> Option<(&str, Option<&str>, bool)> {
    let line = strip_line_ending(line);
    let body = line.trim_start_matches(' ');
    if line.len() - body.len() > 3 {
        return None;
    }
    let body = body.strip_prefix("###")?;
    let after_hashes = body.trim_start_matches([' ', '\t']);
    if after_hashes.len() == body.len() {
        return None;
    }
    let (enabled, body) = match after_hashes.strip_prefix("//") {
        Some(rest) => (false, rest),
        None => (true, after_hashes),
    };
    let body = body.strip_prefix('@')?;
    let (role, body) = split_ident(body)?;
    let (name, body) = match body.strip_prefix('/') {
        Some(rest) => {
            let (name, rest) = split_ident(rest)?;
            (Some(name), rest)
        }
        None => (None, body),
    };
    let body = body.strip_prefix(':')?;
    if !body.trim().is_empty() {
        return None;
    }
    Some((role, name, enabled))
}

/// Parse `% text`, `> % text` or `//% text`.
///
/// Returns `(enabled, in_blockquote, text)`.
fn parse_config_line(line: &str) -> Option<(bool, bool, &str)> {
    let body = strip_line_ending(line).trim_start();
    let (in_blockquote, body) = match body.strip_prefix('>') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, body),
    };
    let (enabled, body) = match body.strip_prefix("//") {
        Some(rest) => (false, rest),
        None => (true, body),
    };
    let text = body.strip_prefix('%')?;
    Some((enabled, in_blockquote, text.trim()))
}

/// Length of the leading run of `marker` in `s`.
fn run_length(s: &str, marker: char) -> usize {
    s.chars().take_while(|c| *c == marker).count()
}

fn opens_fence(line: &str) -> Option<Fence> {
    let body = line.trim_start();
    let marker = body.chars().next().filter(|c| matches!(c, '`' | '~'))?;
    let len = run_length(body, marker);
    (len >= 3).then_some(Fence { marker, len })
}

fn closes_fence(line: &str, open: Fence) -> bool {
    let body = strip_line_ending(line).trim();
    let len = run_length(body, open.marker);
    len >= open.len && body.chars().count() == len
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_concat(text: &str) -> String {
        Segmenter::new(text).map(|s| s.raw()).collect()
    }

    #[test]
    fn segmentation_is_lossless() {
        let docs = [
            "",
            "no newline at end",
            "### @user:\nHi\n",
            "\r\n### @user/bob:  \r\n% a = 1\r\n> % b = 2\r\ntext\r\n",
            "```\n% not config\n### @user:\n```\n% config\n",
            "~~~~\n```\n~~~\n~~~~~\n### @assistant:\n",
            "####  @user:\n###@user:\n    ### @user:\n//% x\n",
            "é ü\n### @user:\n日本語\n",
        ];
        for doc in docs {
            assert_eq!(raw_concat(doc), doc, "lossless for {doc:?}");
        }
    }

    #[test]
    fn headings() {
        assert_eq!(parse_heading("### @user:\n"), Some(("user", None, true)));
        assert_eq!(
            parse_heading("   ### @assistant/Alice: \n"),
            Some(("assistant", Some("Alice"), true))
        );
        assert_eq!(parse_heading("### //@_aside:"), Some(("_aside", None, false)));
        assert_eq!(parse_heading("###\t@system:\r\n"), Some(("system", None, true)));
    }

    #[test]
    fn malformed_headings_are_text() {
        for line in [
            "###@user:",
            "#### @user:",
            "## @user:",
            "    ### @user:",
            "### @user",
            "### @user: hello",
            "### @:",
            "### @user/:",
            "### // @user:",
            "### @us-er:",
        ] {
            assert_eq!(parse_heading(line), None, "{line:?}");
        }
    }

    #[test]
    fn config_lines() {
        assert_eq!(
            parse_config_line("% temperature = 0.8\n"),
            Some((true, false, "temperature = 0.8"))
        );
        assert_eq!(
            parse_config_line("  >   %plugins.load openai.chat"),
            Some((true, true, "plugins.load openai.chat"))
        );
        assert_eq!(parse_config_line("//% n = 2"), Some((false, false, "n = 2")));
        assert_eq!(parse_config_line("> //% n = 2"), Some((false, true, "n = 2")));
        assert_eq!(parse_config_line("100% sure"), None);
        assert_eq!(parse_config_line("// % n = 2"), None);
        assert_eq!(parse_config_line(">> % n = 2"), None);
    }

    #[test]
    fn text_lines_coalesce() {
        let segments: Vec<_> = Segmenter::new("a\nb\n% x\nc").collect();
        assert_eq!(
            segments,
            vec![
                Segment::TextSpan { text: "a\nb\n", line: 1 },
                Segment::ConfigLine {
                    enabled: true,
                    in_blockquote: false,
                    text: "x",
                    raw: "% x\n",
                    line: 3,
                },
                Segment::TextSpan { text: "c", line: 4 },
            ]
        );
    }

    #[test]
    fn fenced_code_is_verbatim() {
        let doc = "### @user:\n```md\n% temperature = 0.1\n### @assistant:\n```\n% n = 2\n";
        let segments: Vec<_> = Segmenter::new(doc).collect();
        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments[1],
            Segment::TextSpan {
                text: "```md\n% temperature = 0.1\n### @assistant:\n```\n",
                line: 2,
            }
        );
        assert!(matches!(segments[2], Segment::ConfigLine { text: "n = 2", line: 6, .. }));
    }

    #[test]
    fn fence_close_needs_same_marker_and_length() {
        let doc = "````\n```\n~~~~\n% inside\n````\n% outside\n";
        let configs: Vec<_> = Segmenter::new(doc)
            .filter_map(|s| match s {
                Segment::ConfigLine { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(configs, vec!["outside"]);
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        let doc = "```\n% a\n### @user:\n";
        let segments: Vec<_> = Segmenter::new(doc).collect();
        assert_eq!(segments, vec![Segment::TextSpan { text: doc, line: 1 }]);
    }

    #[test]
    fn fence_suspension_can_be_disabled() {
        let doc = "```\n% a = 1\n```\n";
        let configs = Segmenter::new(doc)
            .with_fenced_code_verbatim(false)
            .filter(|s| matches!(s, Segment::ConfigLine { .. }))
            .count();
        assert_eq!(configs, 1);
    }

    #[test]
    fn restartable() {
        let doc = "### @user:\n```\nx\n";
        let mut first = Segmenter::new(doc);
        first.next();
        let resumed: Vec<_> = first.clone().collect();
        assert_eq!(resumed, first.collect::<Vec<_>>());
        assert_eq!(Segmenter::new(doc).count(), 2);
    }
}
