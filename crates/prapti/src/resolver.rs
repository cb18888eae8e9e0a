//! Locating and loading configuration documents.
//!
//! Configuration files are ordinary chat documents. Before the input is
//! interpreted, the run interprets, in order:
//!
//! 1. the user configuration file (`$XDG_CONFIG_HOME/prapti/config.md`, or
//!    `~/.config/prapti/config.md`, or `~/.prapti/config.md`),
//! 2. the in-tree chain of `.prapticonfig.md` files from the outermost
//!    `config_root` directory down to the input's directory,
//! 3. any explicitly named configuration files.
//!
//! When default search is enabled and none of those exist, a built-in
//! fallback that sets up the `openai.chat` responder is used instead.
//!
//! The same directories supply the start template written into a blank
//! input: the nearest `.praptistart.md` in the in-tree directories, then
//! `start.md` in the user configuration directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::keys;
use crate::document::{DEFAULT_TEMPLATE, SourceLocation, document_dir};
use crate::error::FatalError;
use crate::interpreter::{interpret, is_config_root};
use crate::state::ExecutionState;

/// File name searched for in the input's directory and its ancestors.
pub const IN_TREE_CONFIG_FILE_NAME: &str = ".prapticonfig.md";

/// File name inside the user configuration directory.
pub const USER_CONFIG_FILE_NAME: &str = "config.md";

/// Start template searched for in the in-tree directories.
pub const IN_TREE_START_FILE_NAME: &str = ".praptistart.md";

/// Start template inside the user configuration directory.
pub const USER_START_FILE_NAME: &str = "start.md";

/// Interpreted when no configuration file is found.
pub const FALLBACK_CONFIG: &str = "\
% plugins.load openai.chat
% responder.new default openai.chat
";

/// Source name reported for diagnostics raised by [`FALLBACK_CONFIG`].
pub const FALLBACK_ORIGIN: &str = "<fallback-config>";

/// Environment inputs for locating the user configuration directory.
///
/// Kept separate from the process environment so callers (and tests) can
/// supply their own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserConfigDirs {
    /// `$XDG_CONFIG_HOME`, when set and non-empty.
    pub xdg_config_home: Option<PathBuf>,
    /// `$HOME`.
    pub home: Option<PathBuf>,
}

impl UserConfigDirs {
    pub fn from_env() -> Self {
        Self {
            xdg_config_home: env::var_os("XDG_CONFIG_HOME")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            home: env::var_os("HOME").filter(|v| !v.is_empty()).map(PathBuf::from),
        }
    }

    /// The user configuration directory, if it exists.
    ///
    /// `$XDG_CONFIG_HOME/prapti` when `XDG_CONFIG_HOME` is set (and is a
    /// directory). Otherwise `~/.config/prapti` when it exists, else
    /// `~/.prapti`.
    pub fn locate_config_dir(&self) -> Option<PathBuf> {
        let dir = match &self.xdg_config_home {
            Some(xdg) if !xdg.is_dir() => {
                warn!(
                    "XDG_CONFIG_HOME is not a directory ({}); skipping user configuration",
                    xdg.display()
                );
                return None;
            }
            Some(xdg) => xdg.join("prapti"),
            None => {
                let home = self.home.as_ref()?;
                let xdg_default = home.join(".config").join("prapti");
                if xdg_default.exists() {
                    xdg_default
                } else {
                    home.join(".prapti")
                }
            }
        };
        if dir.is_dir() {
            debug!("using user configuration directory {}", dir.display());
            Some(dir)
        } else {
            None
        }
    }

    /// `config.md` in the user configuration directory, if present.
    pub fn locate_config_file(&self) -> Option<PathBuf> {
        let file = self.locate_config_dir()?.join(USER_CONFIG_FILE_NAME);
        file.is_file().then_some(file)
    }
}

/// Inputs to [`resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Skip user configuration, in-tree search and the fallback.
    pub no_default_config: bool,
    /// Explicit configuration files, interpreted in order.
    pub config_files: Vec<PathBuf>,
    pub user_dirs: UserConfigDirs,
}

/// Configuration documents for one run, in interpretation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSources {
    pub user_config: Option<PathBuf>,
    /// Input the in-tree chain was searched from, when searching is on.
    pub input_path: Option<PathBuf>,
    /// Outermost first, found with fenced code treated as verbatim.
    pub in_tree: Vec<PathBuf>,
    pub explicit: Vec<PathBuf>,
    /// Interpret [`FALLBACK_CONFIG`] after the (empty) file list.
    pub use_fallback: bool,
}

impl ConfigSources {
    /// Every file, in interpretation order.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.user_config
            .iter()
            .chain(&self.in_tree)
            .chain(&self.explicit)
            .map(PathBuf::as_path)
    }
}

/// Work out which configuration documents apply to `input_path`.
pub fn resolve(input_path: Option<&Path>, options: &ResolveOptions) -> ConfigSources {
    if options.no_default_config {
        return ConfigSources {
            explicit: options.config_files.clone(),
            ..ConfigSources::default()
        };
    }
    let user_config = options.user_dirs.locate_config_file();
    let in_tree = input_path
        .map(|path| find_in_tree_configs(path, true))
        .unwrap_or_default();
    let explicit = options.config_files.clone();
    let use_fallback = user_config.is_none() && in_tree.is_empty() && explicit.is_empty();
    ConfigSources {
        user_config,
        input_path: input_path.map(Path::to_path_buf),
        in_tree,
        explicit,
        use_fallback,
    }
}

/// The input's directory with symlinks and `..` resolved. Falls back to a
/// lexically absolute path when the directory does not exist.
fn canonical_document_dir(input_path: &Path) -> PathBuf {
    let dir = document_dir(input_path);
    fs::canonicalize(dir)
        .or_else(|_| std::path::absolute(dir))
        .unwrap_or_else(|_| dir.to_path_buf())
}

/// Directories searched for in-tree files: the input's directory and its
/// ancestors, nearest first, ending at the first one whose
/// `.prapticonfig.md` sets `config_root = true`.
pub fn in_tree_dirs(input_path: &Path, fenced_code_verbatim: bool) -> Vec<PathBuf> {
    let dir = canonical_document_dir(input_path);
    let mut dirs = Vec::new();
    for ancestor in dir.ancestors() {
        dirs.push(ancestor.to_path_buf());
        let candidate = ancestor.join(IN_TREE_CONFIG_FILE_NAME);
        if candidate.is_file()
            && fs::read_to_string(&candidate)
                .is_ok_and(|text| is_config_root(&text, fenced_code_verbatim))
        {
            break;
        }
    }
    dirs
}

/// `.prapticonfig.md` files in [`in_tree_dirs`], outermost first.
/// Unreadable files stay in the chain so loading reports them.
pub fn find_in_tree_configs(input_path: &Path, fenced_code_verbatim: bool) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = in_tree_dirs(input_path, fenced_code_verbatim)
        .into_iter()
        .map(|dir| dir.join(IN_TREE_CONFIG_FILE_NAME))
        .filter(|candidate| candidate.is_file())
        .inspect(|candidate| debug!("found in-tree configuration {}", candidate.display()))
        .collect();
    found.reverse();
    found
}

/// Interpret the resolved configuration documents into `state`.
pub fn load_config_sources(
    state: &mut ExecutionState,
    sources: &ConfigSources,
) -> Result<(), FatalError> {
    if let Some(path) = &sources.user_config {
        load_config_file(state, path)?;
    }
    let verbatim = state.config.get_bool(keys::FENCED_CODE_VERBATIM);
    let in_tree = match &sources.input_path {
        Some(input) if !verbatim && !sources.in_tree.is_empty() => {
            debug!("fenced code is not verbatim; searching in-tree configuration again");
            find_in_tree_configs(input, verbatim)
        }
        _ => sources.in_tree.clone(),
    };
    for path in &in_tree {
        load_config_file(state, path)?;
        if let Err(e) = state.config.set(keys::CONFIG_ROOT, false.into()) {
            debug!("couldn't reset config_root: {e}");
        }
    }
    for path in &sources.explicit {
        load_config_file(state, path)?;
    }
    if sources.use_fallback {
        info!("no configuration file found; using the built-in fallback");
        interpret(state, FALLBACK_CONFIG, Path::new(FALLBACK_ORIGIN))?;
    }
    Ok(())
}

/// Interpret one configuration file. A file that cannot be read is
/// reported and skipped.
pub fn load_config_file(state: &mut ExecutionState, path: &Path) -> Result<(), FatalError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            state.diagnostics.error(
                "config-file-unreadable",
                format!("couldn't read configuration file: {e}"),
                Some(SourceLocation::file(path)),
            );
            return Ok(());
        }
    };
    info!("loading configuration from {}", path.display());
    state.config_file_paths.push(path.to_path_buf());
    interpret(state, &text, path)
}

/// The start template path for a blank input, if any file applies.
pub fn locate_start_template(
    input_path: &Path,
    options: &ResolveOptions,
    fenced_code_verbatim: bool,
) -> Option<PathBuf> {
    if options.no_default_config {
        return None;
    }
    in_tree_dirs(input_path, fenced_code_verbatim)
        .into_iter()
        .map(|dir| dir.join(IN_TREE_START_FILE_NAME))
        .chain(
            options
                .user_dirs
                .locate_config_dir()
                .map(|dir| dir.join(USER_START_FILE_NAME)),
        )
        .find(|path| path.is_file())
}

/// Text written into a blank input. Falls back to [`DEFAULT_TEMPLATE`] when
/// no start template exists or it cannot be read.
pub fn load_start_template(
    state: &mut ExecutionState,
    input_path: &Path,
    options: &ResolveOptions,
) -> String {
    let verbatim = state.config.get_bool(keys::FENCED_CODE_VERBATIM);
    let Some(path) = locate_start_template(input_path, options, verbatim) else {
        return DEFAULT_TEMPLATE.to_string();
    };
    match fs::read_to_string(&path) {
        Ok(text) => {
            info!("using start template {}", path.display());
            text
        }
        Err(e) => {
            state.diagnostics.error(
                "start-template-unreadable",
                format!("couldn't read start template: {e}"),
                Some(SourceLocation::file(&path)),
            );
            DEFAULT_TEMPLATE.to_string()
        }
    }
}
