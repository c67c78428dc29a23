use std::path::{Path, PathBuf};

use dirs_next::home_dir;

/// Expands a leading `~` to the current user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Expands `~` and makes the path absolute against the current directory.
///
/// The path is not required to exist; when the current directory cannot be
/// determined the tilde-expanded path is returned unchanged.
pub fn expand_abs_dir(path: &str) -> PathBuf {
    let expanded = expand_tilde(path);
    std::path::absolute(&expanded).unwrap_or(expanded)
}

/// Returns true when something exists at `path`.
pub fn path_exists(path: &Path) -> bool {
    path.try_exists().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_home_prefix() {
        temp_env::with_var("HOME", Some("/home/tester"), || {
            assert_eq!(expand_tilde("~/.tools"), PathBuf::from("/home/tester/.tools"));
            assert_eq!(expand_tilde("~"), PathBuf::from("/home/tester"));
        });
    }

    #[test]
    fn leaves_plain_paths_alone() {
        assert_eq!(expand_tilde(" /etc/hosts "), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn absolutizes_relative_paths() {
        let resolved = expand_abs_dir("relative/dir");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("relative/dir"));
    }

    #[test]
    fn path_exists_reports_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(path_exists(dir.path()));
        assert!(!path_exists(&dir.path().join("missing")));
    }
}
