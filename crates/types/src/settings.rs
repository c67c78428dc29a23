//! Resolved settings model.
//!
//! The settings file is YAML with kebab-case keys. Every section is optional
//! in the file; [`GlobalConfig::apply_defaults`] fills whatever was left
//! empty from the resolved root directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Theme written to `.zshrc` when none is configured.
pub const DEFAULT_ZSH_THEME: &str = "robbyrussell";

/// Docker release installed when none is configured.
pub const DEFAULT_DOCKER_VERSION: &str = "26.1.0";

/// Top-level settings object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GlobalConfig {
    pub common: CommonConfig,
    pub ansible: AnsibleConfig,
    pub python: LangConfig,
    pub go: LangConfig,
    pub oh_my_zsh: OhMyzshConfig,
    pub docker: DockerConfig,
}

/// Settings shared by every command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CommonConfig {
    pub debug: bool,
    pub root_dir: PathBuf,
    pub work_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub github_proxy: String,
    pub http_proxy: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AnsibleConfig {
    pub base_dir: PathBuf,
    pub python_dir: PathBuf,
    pub ansible_dir: PathBuf,
}

/// Per-language toolchain settings (python, go).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LangConfig {
    pub base_dir: PathBuf,
    pub versions: Vec<String>,
    pub global: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OhMyzshConfig {
    pub install_dir: PathBuf,
    pub theme: String,
    pub plugins: Vec<OhMyzshPlugin>,
}

/// A custom oh-my-zsh plugin cloned from `github.com/<repo>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OhMyzshPlugin {
    pub name: String,
    pub repo: String,
}

impl OhMyzshPlugin {
    pub fn new(name: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            repo: repo.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DockerConfig {
    pub install_dir: PathBuf,
    pub version: String,
    pub http_proxy: String,
    pub registry_mirrors: Vec<String>,
}

/// Plugins enabled in `.zshrc` when the settings list none.
pub fn default_zsh_plugins() -> Vec<OhMyzshPlugin> {
    vec![
        OhMyzshPlugin::new("zsh-autosuggestions", "zsh-users/zsh-autosuggestions"),
        OhMyzshPlugin::new("zsh-history-substring-search", "zsh-users/zsh-history-substring-search"),
        OhMyzshPlugin::new("zsh-completions", "zsh-users/zsh-completions"),
        OhMyzshPlugin::new("zsh-syntax-highlighting", "zsh-users/zsh-syntax-highlighting"),
    ]
}

fn is_unset(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

impl GlobalConfig {
    /// Fills every empty field with a value derived from `root_dir`.
    ///
    /// Values already present (from the settings file) are kept; a root
    /// directory configured in the file wins over `root_dir`.
    pub fn apply_defaults(&mut self, root_dir: &Path) {
        let common = &mut self.common;
        if is_unset(&common.root_dir) {
            common.root_dir = root_dir.to_path_buf();
        }
        if is_unset(&common.cache_dir) {
            common.cache_dir = common.root_dir.join("cache");
        }
        let root = common.root_dir.clone();

        let ansible = &mut self.ansible;
        if is_unset(&ansible.base_dir) {
            ansible.base_dir = root.join("ansible");
        }
        if is_unset(&ansible.python_dir) {
            ansible.python_dir = ansible.base_dir.join("python");
        }
        if is_unset(&ansible.ansible_dir) {
            ansible.ansible_dir = ansible.base_dir.join("ansible");
        }

        if is_unset(&self.python.base_dir) {
            self.python.base_dir = root.join("python");
        }
        if is_unset(&self.go.base_dir) {
            self.go.base_dir = root.join("go");
        }

        let zsh = &mut self.oh_my_zsh;
        if is_unset(&zsh.install_dir) {
            zsh.install_dir = root.join("oh-my-zsh");
        }
        if zsh.theme.is_empty() {
            zsh.theme = DEFAULT_ZSH_THEME.to_string();
        }
        if zsh.plugins.is_empty() {
            zsh.plugins = default_zsh_plugins();
        }

        let docker = &mut self.docker;
        if docker.version.is_empty() {
            docker.version = DEFAULT_DOCKER_VERSION.to_string();
        }
        if is_unset(&docker.install_dir) {
            docker.install_dir = root.join("docker");
        }
        if docker.http_proxy.is_empty() {
            docker.http_proxy = self.common.http_proxy.clone();
        }
    }

    /// Moves every root-relative directory under a new root.
    pub fn update_root_dir(&mut self, root_dir: &Path) {
        let root = root_dir.to_path_buf();
        self.common.cache_dir = root.join("cache");
        self.ansible.base_dir = root.join("ansible");
        self.ansible.python_dir = self.ansible.base_dir.join("python");
        self.ansible.ansible_dir = self.ansible.base_dir.join("ansible");
        self.python.base_dir = root.join("python");
        self.go.base_dir = root.join("go");
        self.oh_my_zsh.install_dir = root.join("oh-my-zsh");
        self.docker.install_dir = root.join("docker");
        self.common.root_dir = root;
    }

    /// Directory scanned for declarative plugins.
    pub fn plugins_dir(&self) -> PathBuf {
        self.common.root_dir.join("plugins")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_from_root() {
        let mut cfg = GlobalConfig::default();
        cfg.apply_defaults(Path::new("/opt/tools"));
        assert_eq!(cfg.common.root_dir, PathBuf::from("/opt/tools"));
        assert_eq!(cfg.common.cache_dir, PathBuf::from("/opt/tools/cache"));
        assert_eq!(cfg.ansible.ansible_dir, PathBuf::from("/opt/tools/ansible/ansible"));
        assert_eq!(cfg.oh_my_zsh.install_dir, PathBuf::from("/opt/tools/oh-my-zsh"));
        assert_eq!(cfg.oh_my_zsh.theme, DEFAULT_ZSH_THEME);
        assert_eq!(cfg.oh_my_zsh.plugins.len(), 4);
        assert_eq!(cfg.docker.version, DEFAULT_DOCKER_VERSION);
        assert_eq!(cfg.plugins_dir(), PathBuf::from("/opt/tools/plugins"));
    }

    #[test]
    fn configured_values_survive_defaults() {
        let yaml = r#"
common:
  root-dir: /srv/dev
  http-proxy: http://proxy:3128
oh-my-zsh:
  theme: agnoster
"#;
        let mut cfg: GlobalConfig = serde_yaml::from_str(yaml).expect("settings parse");
        cfg.apply_defaults(Path::new("/ignored"));
        assert_eq!(cfg.common.root_dir, PathBuf::from("/srv/dev"));
        assert_eq!(cfg.oh_my_zsh.theme, "agnoster");
        assert_eq!(cfg.docker.http_proxy, "http://proxy:3128");
        assert_eq!(cfg.go.base_dir, PathBuf::from("/srv/dev/go"));
    }

    #[test]
    fn update_root_dir_moves_everything() {
        let mut cfg = GlobalConfig::default();
        cfg.apply_defaults(Path::new("/a"));
        cfg.update_root_dir(Path::new("/b"));
        assert_eq!(cfg.common.root_dir, PathBuf::from("/b"));
        assert_eq!(cfg.ansible.python_dir, PathBuf::from("/b/ansible/python"));
        assert_eq!(cfg.docker.install_dir, PathBuf::from("/b/docker"));
    }
}
