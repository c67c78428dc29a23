//! Settings discovery, loading and persistence.
//!
//! Settings come from the first `config.yml` candidate that loads, in the
//! order given by [`candidate_paths`]. A missing or unreadable settings file
//! is never fatal: the tool runs on defaults derived from the root directory.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use devtools_types::GlobalConfig;
use devtools_util::expand_abs_dir;
use tracing::{debug, warn};

use crate::error::ConfigError;

/// File name looked up inside root and home directories.
pub const CONFIG_FILE_NAME: &str = "config.yml";

/// Default of the `--root-dir` flag.
pub const DEFAULT_ROOT_DIR: &str = "~/.tools";

/// Environment variable naming the tool's home directory.
pub const HOME_ENV: &str = "DEV_TOOLS_HOME";

/// Global flag values relevant to settings resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsOptions {
    pub config_file: String,
    /// Whether `--config` was given on the command line.
    pub config_file_explicit: bool,
    pub root_dir: String,
    /// Whether `--root-dir` was given on the command line.
    pub root_dir_explicit: bool,
    pub debug: bool,
}

impl Default for SettingsOptions {
    fn default() -> Self {
        Self {
            config_file: CONFIG_FILE_NAME.to_string(),
            config_file_explicit: false,
            root_dir: DEFAULT_ROOT_DIR.to_string(),
            root_dir_explicit: false,
            debug: false,
        }
    }
}

/// Settings with every default applied, plus the file they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub config: GlobalConfig,
    pub source: Option<PathBuf>,
}

fn home_env() -> Option<String> {
    env::var(HOME_ENV).ok().filter(|value| !value.trim().is_empty())
}

/// Settings file candidates, highest priority first, without duplicates.
pub fn candidate_paths(options: &SettingsOptions) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    let has_config = !options.config_file.trim().is_empty();
    let has_root = !options.root_dir.trim().is_empty();

    if options.config_file_explicit && has_config {
        candidates.push(expand_abs_dir(&options.config_file));
    }
    if options.root_dir_explicit && has_root {
        candidates.push(expand_abs_dir(&options.root_dir).join(CONFIG_FILE_NAME));
    }
    if let Some(home) = home_env() {
        candidates.push(expand_abs_dir(&home).join(CONFIG_FILE_NAME));
    }
    if has_config {
        candidates.push(expand_abs_dir(&options.config_file));
    }
    if has_root {
        candidates.push(expand_abs_dir(&options.root_dir).join(CONFIG_FILE_NAME));
    }
    candidates.push(expand_abs_dir(".").join(CONFIG_FILE_NAME));

    let mut seen = HashSet::new();
    candidates.retain(|path| seen.insert(path.clone()));
    candidates
}

/// Reads one settings file.
///
/// # Errors
///
/// [`ConfigError::Io`] when the file cannot be read and
/// [`ConfigError::Yaml`] when it does not parse.
pub fn load_settings_from_path(path: &Path) -> Result<GlobalConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(GlobalConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the effective settings for this process.
pub fn load_settings(options: &SettingsOptions) -> ResolvedSettings {
    let mut loaded = None;
    for candidate in candidate_paths(options) {
        if !candidate.is_file() {
            continue;
        }
        match load_settings_from_path(&candidate) {
            Ok(config) => {
                debug!(path = %candidate.display(), "loaded settings");
                loaded = Some((config, candidate));
                break;
            }
            Err(error) => warn!(%error, "skipping settings file"),
        }
    }
    let (mut config, source) = match loaded {
        Some((config, path)) => (config, Some(path)),
        None => {
            debug!("no settings file found; using defaults");
            (GlobalConfig::default(), None)
        }
    };

    let file_root = config.common.root_dir.clone();
    let root_dir = resolve_root_dir(&file_root, options);
    let work_dir = resolve_work_dir(&file_root, options);

    config.common.root_dir = root_dir.clone();
    if config.common.work_dir.as_os_str().is_empty() {
        config.common.work_dir = work_dir;
    }
    config.common.debug |= options.debug;
    config.apply_defaults(&root_dir);

    ResolvedSettings { config, source }
}

/// Root directory: explicit flag, the file's root, the flag default, `~/.tools`.
fn resolve_root_dir(file_root: &Path, options: &SettingsOptions) -> PathBuf {
    let has_root = !options.root_dir.trim().is_empty();
    if options.root_dir_explicit && has_root {
        return expand_abs_dir(&options.root_dir);
    }
    if !file_root.as_os_str().is_empty() {
        return expand_abs_dir(&file_root.to_string_lossy());
    }
    if has_root {
        return expand_abs_dir(&options.root_dir);
    }
    expand_abs_dir(DEFAULT_ROOT_DIR)
}

/// Working directory: the file's root, explicit flag, `$DEV_TOOLS_HOME`, `.`.
fn resolve_work_dir(file_root: &Path, options: &SettingsOptions) -> PathBuf {
    if !file_root.as_os_str().is_empty() {
        return expand_abs_dir(&file_root.to_string_lossy());
    }
    if options.root_dir_explicit && !options.root_dir.trim().is_empty() {
        return expand_abs_dir(&options.root_dir);
    }
    if let Some(home) = home_env() {
        return expand_abs_dir(&home);
    }
    expand_abs_dir(".")
}

/// Writes `config` as YAML to `path`, creating parent directories.
pub fn save_settings(path: &Path, config: &GlobalConfig) -> Result<(), ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let content = serde_yaml::to_string(config).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(io_error)
}
