//! `prapti`: append the next response to a markdown chat document.
//!
//! # Examples
//!
//! ```sh
//! export OPENAI_API_KEY=...
//! prapti chat.md
//! ```

use std::process::ExitCode;

use clap::Parser;
use prapti::logging::DiagnosticLayer;
use prapti::resolver::UserConfigDirs;
use prapti::state::ExecutionState;
use prapti_tool::{Cli, builtin_catalog, execute};
use tracing::error;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(DiagnosticLayer::new().with_filter(cli.log_level()))
        .init();

    let mut state = ExecutionState::new(builtin_catalog());
    match execute(&cli, &mut state, UserConfigDirs::from_env()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}; {} left unchanged", cli.filename.display());
            ExitCode::FAILURE
        }
    }
}
