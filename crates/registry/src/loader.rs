//! Plugin descriptor loading and plugin-root scanning.
//!
//! A plugin is any directory containing a [`META_FILE_NAME`] document. The
//! scan walks the whole plugin root, so nested plugin directories are
//! discovered independently, and a bad descriptor only drops its own plugin.

use std::fs;
use std::path::{Path, PathBuf};

use devtools_types::PluginDescriptor;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::LoadError;

/// Fixed name of the descriptor document inside a plugin directory.
pub const META_FILE_NAME: &str = "meta.yml";

/// Reads and validates the descriptor of the plugin at `dir`.
///
/// # Errors
///
/// - [`LoadError::NotAPlugin`] when `dir` is not a directory or has no descriptor.
/// - [`LoadError::Io`] when the descriptor exists but cannot be read.
/// - [`LoadError::MalformedDescriptor`] when it does not parse or validate.
pub fn load_descriptor(dir: &Path) -> Result<PluginDescriptor, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::not_a_plugin(dir));
    }
    let meta_path = dir.join(META_FILE_NAME);
    if !meta_path.is_file() {
        return Err(LoadError::not_a_plugin(dir));
    }

    let content = fs::read_to_string(&meta_path).map_err(|source| LoadError::Io {
        path: meta_path.clone(),
        source,
    })?;
    let descriptor: PluginDescriptor =
        serde_yaml::from_str(&content).map_err(|error| LoadError::malformed(&meta_path, error))?;
    descriptor.validate().map_err(|error| LoadError::from((meta_path, error)))?;
    Ok(descriptor)
}

/// A plugin found on disk, ready for command tree assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPlugin {
    /// Directory holding the descriptor; artifacts resolve relative to it.
    pub base_path: PathBuf,
    pub descriptor: PluginDescriptor,
}

/// Result of scanning a plugin root.
#[derive(Debug, Default)]
pub struct PluginScan {
    /// Loaded plugins sorted by name, then by directory.
    pub plugins: Vec<DiscoveredPlugin>,
    /// Directories that held a descriptor which could not be loaded.
    pub rejected: Vec<LoadError>,
}

/// Walks `root` recursively and loads every plugin directory underneath it.
///
/// A missing root yields an empty scan. Unreadable entries and bad
/// descriptors are logged and skipped; the walk never aborts.
pub fn scan_plugins(root: &Path) -> PluginScan {
    let mut scan = PluginScan::default();
    if !root.is_dir() {
        debug!(root = %root.display(), "plugin root does not exist; skipping scan");
        return scan;
    }

    for entry in WalkDir::new(root).follow_links(true).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(%error, "skipping unreadable entry under plugin root");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        match load_descriptor(entry.path()) {
            Ok(descriptor) => {
                debug!(plugin = %descriptor.name, path = %entry.path().display(), "discovered plugin");
                scan.plugins.push(DiscoveredPlugin {
                    base_path: entry.path().to_path_buf(),
                    descriptor,
                });
            }
            Err(error) if error.is_benign() => {}
            Err(error) => {
                warn!(%error, "dropping plugin");
                scan.rejected.push(error);
            }
        }
    }

    scan.plugins.sort_by(|a, b| {
        a.descriptor
            .name
            .cmp(&b.descriptor.name)
            .then_with(|| a.base_path.cmp(&b.base_path))
    });
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use devtools_types::PluginKind;

    fn write_plugin(dir: &Path, meta: &str) {
        fs::create_dir_all(dir).expect("create plugin dir");
        fs::write(dir.join(META_FILE_NAME), meta).expect("write meta");
    }

    #[test]
    fn loads_valid_descriptor() {
        let root = tempfile::tempdir().expect("tempdir");
        write_plugin(root.path(), "name: hello\ntype: shell\nversion: \"0.1\"\n");
        let descriptor = load_descriptor(root.path()).expect("loads");
        assert_eq!(descriptor.name, "hello");
        assert_eq!(descriptor.kind, PluginKind::Shell);
        assert_eq!(descriptor.version, "0.1");
    }

    #[test]
    fn directory_without_meta_is_not_a_plugin() {
        let root = tempfile::tempdir().expect("tempdir");
        let error = load_descriptor(root.path()).expect_err("no meta");
        assert!(matches!(error, LoadError::NotAPlugin { .. }));
        assert!(error.is_benign());
    }

    #[test]
    fn file_path_is_not_a_plugin() {
        let root = tempfile::tempdir().expect("tempdir");
        let file = root.path().join("loose.txt");
        fs::write(&file, "x").expect("write");
        assert!(matches!(load_descriptor(&file), Err(LoadError::NotAPlugin { .. })));
    }

    #[test]
    fn unparseable_meta_is_malformed() {
        let root = tempfile::tempdir().expect("tempdir");
        write_plugin(root.path(), "name: [unterminated\n");
        let error = load_descriptor(root.path()).expect_err("malformed");
        assert!(matches!(error, LoadError::MalformedDescriptor { .. }));
        assert!(!error.is_benign());
    }

    #[test]
    fn invalid_descriptor_is_malformed() {
        let root = tempfile::tempdir().expect("tempdir");
        write_plugin(
            root.path(),
            "name: bad\ntype: shell\ncommands:\n  run:\n    options:\n      - name: help\n",
        );
        assert!(matches!(
            load_descriptor(root.path()),
            Err(LoadError::MalformedDescriptor { .. })
        ));
    }

    #[test]
    fn scan_discovers_nested_plugins_and_drops_malformed() {
        let root = tempfile::tempdir().expect("tempdir");
        write_plugin(&root.path().join("zeta"), "name: zeta\ntype: shell\n");
        write_plugin(&root.path().join("group/alpha"), "name: alpha\ntype: ansible\n");
        write_plugin(&root.path().join("group/alpha/inner"), "name: inner\ntype: shell\n");
        write_plugin(&root.path().join("broken"), "type: shell\n");
        fs::create_dir_all(root.path().join("empty")).expect("empty dir");

        let scan = scan_plugins(root.path());
        let names: Vec<_> = scan.plugins.iter().map(|p| p.descriptor.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "inner", "zeta"]);
        assert_eq!(scan.rejected.len(), 1);
        assert_eq!(scan.plugins[0].base_path, root.path().join("group/alpha"));
    }

    #[test]
    fn scan_of_missing_root_is_empty() {
        let root = tempfile::tempdir().expect("tempdir");
        let scan = scan_plugins(&root.path().join("nope"));
        assert!(scan.plugins.is_empty());
        assert!(scan.rejected.is_empty());
    }
}
