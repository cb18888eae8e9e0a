//! The `prapti` command-line tool.
//!
//! Reads a markdown chat document, runs it through the configured
//! responder and writes the reply back into the same file.
//!
//! ```sh
//! prapti chat.md
//! prapti --dry-run --config-file team.md chat.md
//! ```
//!
//! The library half exposes [`execute`] and [`builtin_catalog`] so the
//! tool can be driven from tests without a process boundary.

pub mod plugins;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};
use prapti::document::document_dir;
use prapti::error::FatalError;
use prapti::resolver::{ResolveOptions, UserConfigDirs};
use prapti::run::{RunOptions, RunOutcome, run};
use prapti::state::ExecutionState;
use tempfile::NamedTempFile;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

pub use plugins::builtin_catalog;

/// Markdown chat: append the next response to a chat document.
#[derive(Debug, Parser)]
#[command(name = "prapti", version)]
pub struct Cli {
    /// Prepare the request without calling any backend.
    #[arg(long)]
    pub dry_run: bool,

    /// Fail if any errors are encountered instead of recovering.
    #[arg(long)]
    pub strict: bool,

    /// Disable user, in-tree and fallback configuration.
    #[arg(long)]
    pub no_default_config: bool,

    /// Additional configuration file (repeatable).
    #[arg(long = "config-file", value_name = "PATH")]
    pub config_files: Vec<PathBuf>,

    /// More output (-v: info, -vv: debug, -vvv: trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only report errors.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// The markdown chat file.
    pub filename: PathBuf,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::ERROR;
        }
        match self.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    fn run_options(&self, user_dirs: UserConfigDirs) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            strict: self.strict,
            resolve: ResolveOptions {
                no_default_config: self.no_default_config,
                config_files: self.config_files.clone(),
                user_dirs,
            },
        }
    }
}

/// Run the document named by `cli` through `state` and write the result
/// back.
///
/// Diagnostics are reported through `tracing` before returning. On error
/// the file is left exactly as it was.
pub fn execute(
    cli: &Cli,
    state: &mut ExecutionState,
    user_dirs: UserConfigDirs,
) -> Result<RunOutcome, FatalError> {
    let path = &cli.filename;
    let input = fs::read_to_string(path).map_err(|source| FatalError::Io {
        path: path.clone(),
        source,
    })?;

    let result = run(state, &input, path, &cli.run_options(user_dirs));
    state.diagnostics.report();
    let outcome = result?;

    if let Some(document) = outcome.document() {
        write_atomically(path, document)?;
        info!("updated {}", path.display());
    } else {
        debug!("{} left unchanged", path.display());
    }
    Ok(outcome)
}

/// Replace `path` with `contents` via a temporary file in the same
/// directory.
///
/// A symlinked `path` is written through to its target, and the target
/// keeps its permissions.
pub fn write_atomically(path: &Path, contents: &str) -> Result<(), FatalError> {
    let io_err = |source| FatalError::Io {
        path: path.to_path_buf(),
        source,
    };
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let permissions = fs::metadata(&target).ok().map(|m| m.permissions());
    let mut tmp = NamedTempFile::new_in(document_dir(&target)).map_err(io_err)?;
    tmp.write_all(contents.as_bytes()).map_err(io_err)?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions).map_err(io_err)?;
    }
    tmp.persist(&target).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from([
            "prapti",
            "--dry-run",
            "--config-file",
            "a.md",
            "--config-file",
            "b.md",
            "-vv",
            "chat.md",
        ]);
        assert!(cli.dry_run);
        assert!(!cli.strict);
        assert_eq!(cli.config_files, vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
        assert_eq!(cli.filename, PathBuf::from("chat.md"));
        assert_eq!(cli.log_level(), LevelFilter::DEBUG);
    }

    #[test]
    fn quiet_only_reports_errors() {
        let cli = Cli::parse_from(["prapti", "-q", "chat.md"]);
        assert_eq!(cli.log_level(), LevelFilter::ERROR);
        assert!(Cli::try_parse_from(["prapti", "-q", "-v", "chat.md"]).is_err());
        assert!(Cli::try_parse_from(["prapti"]).is_err());
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chat.md");
        fs::write(&path, "old").unwrap();
        write_atomically(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_keeps_permissions_and_symlinks() {
        use std::os::unix::fs::{PermissionsExt, symlink};

        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("chat.md");
        fs::write(&target, "old").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();
        let link = tmp.path().join("link.md");
        symlink(&target, &link).unwrap();

        write_atomically(&link, "new").unwrap();
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
