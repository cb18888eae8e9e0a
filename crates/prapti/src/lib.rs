//! Markdown chat documents with embedded configuration and pluggable responders.
//!
//! A chat document is ordinary markdown in which `### @role:` headings start
//! messages and `% ...` lines configure the run. `prapti` reads a document
//! top to bottom, executes its configuration lines in order, sends the
//! visible messages to the active responder and appends the reply to the
//! document.
//!
//! # Getting started
//!
//! ```
//! use std::path::Path;
//! use prapti::prelude::*;
//!
//! let mut state = ExecutionState::default();
//! let options = RunOptions {
//!     resolve: ResolveOptions { no_default_config: true, ..Default::default() },
//!     ..Default::default()
//! };
//!
//! // A blank document is replaced by the default template.
//! let outcome = run(&mut state, "", Path::new("chat.md"), &options).unwrap();
//! assert_eq!(outcome.document(), Some(prapti::document::DEFAULT_TEMPLATE));
//! ```
//!
//! # Where to find things
//!
//! - **Lex a document:** [`Segmenter`](document::Segmenter) yields
//!   [`Segment`](document::Segment)s that reproduce the input exactly.
//! - **Configuration:** [`ConfigTree`](config::ConfigTree) holds typed,
//!   schema-declared values; [`parse_literal`](config::parse_literal) reads
//!   the right-hand side of `% path = value`.
//! - **Add commands:** implement [`Action`](action::Action) or wrap a
//!   closure in [`FnAction`](action::FnAction), and contribute it from a
//!   [`Plugin`](plugin::Plugin).
//! - **Add a model backend:** implement
//!   [`ResponderFactory`](responder::ResponderFactory) and
//!   [`Responder`](responder::Responder).
//! - **Drive a run:** [`run::run`] resolves configuration files
//!   ([`resolver`]), interprets the input ([`interpreter`]) and invokes the
//!   responder.
//! - **Report problems:** per-line problems collect in
//!   [`Diagnostics`](diagnostics::Diagnostics); install
//!   [`DiagnosticLayer`](logging::DiagnosticLayer) to print them.

pub mod action;
pub mod builtins;
pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod interpreter;
pub mod logging;
pub mod plugin;
pub mod prelude;
pub mod resolver;
pub mod responder;
pub mod run;
pub mod state;

#[cfg(test)]
mod testing;
