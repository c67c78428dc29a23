//! Proxy-aware git clone and pull.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use devtools_types::CommonConfig;
use devtools_util::{CommandRequest, ProcessError, Ui, path_exists, run_quiet, run_streaming};
use tokio_util::sync::CancellationToken;

/// Shared inputs of every git call made by one manager operation.
pub(crate) struct Git<'a> {
    pub ui: &'a Arc<dyn Ui>,
    pub global: &'a CommonConfig,
    pub env: &'a HashMap<String, String>,
    pub cancellation: &'a CancellationToken,
}

/// Prefixes `url` with a GitHub mirror proxy such as `https://ghproxy.example/`.
pub(crate) fn proxied_url(github_proxy: &str, url: &str) -> String {
    if github_proxy.is_empty() {
        return url.to_string();
    }
    if github_proxy.ends_with('/') {
        format!("{github_proxy}{url}")
    } else {
        format!("{github_proxy}/{url}")
    }
}

impl Git<'_> {
    fn request(&self) -> CommandRequest {
        let mut request = CommandRequest::new("git").envs(self.env.iter());
        if !self.global.http_proxy.is_empty() {
            request = request
                .env("HTTP_PROXY", &self.global.http_proxy)
                .env("HTTPS_PROXY", &self.global.http_proxy);
        }
        request
    }

    /// Whether `path` is a git work tree. Only cancellation is an error.
    async fn is_repo(&self, path: &Path) -> Result<bool, ProcessError> {
        if !path.join(".git").exists() {
            return Ok(false);
        }
        let request = CommandRequest::new("git")
            .arg("-C")
            .arg(path.to_string_lossy())
            .args(["rev-parse", "--is-inside-work-tree"]);
        match run_quiet(&request, self.cancellation).await {
            Ok(_) => Ok(true),
            Err(error @ ProcessError::Cancelled { .. }) => Err(error),
            Err(_) => Ok(false),
        }
    }

    /// Shallow-clones `url` into `path` unless a repository is already there.
    ///
    /// A non-repository directory at `path` is moved aside to `<path>.bak`.
    pub async fn clone(&self, url: &str, path: &Path) -> anyhow::Result<()> {
        if self.is_repo(path).await? {
            self.ui.info(&format!("Repository already present: {}", path.display()));
            return Ok(());
        }
        if path_exists(path) {
            let backup = backup_path(path);
            self.ui
                .warning(&format!("{} exists but is not a git repository; moving it to {}", path.display(), backup.display()));
            tokio::fs::rename(path, &backup)
                .await
                .with_context(|| format!("failed to back up {}", path.display()))?;
        }

        let url = if self.global.http_proxy.is_empty() {
            proxied_url(&self.global.github_proxy, url)
        } else {
            url.to_string()
        };
        self.ui.info(&format!("Cloning {url} -> {}", path.display()));
        let request = self
            .request()
            .args(["clone", "--depth=1"])
            .arg(url)
            .arg(path.to_string_lossy());
        run_streaming(&request, self.ui.clone(), self.cancellation).await?;
        Ok(())
    }

    /// Fast-forwards the repository at `path`.
    pub async fn pull(&self, path: &Path) -> anyhow::Result<()> {
        if !self.is_repo(path).await? {
            bail!("{} is not a git repository", path.display());
        }
        self.ui.info(&format!("Updating {}", path.display()));
        let request = self
            .request()
            .arg("-C")
            .arg(path.to_string_lossy())
            .args(["pull", "--ff-only"]);
        run_streaming(&request, self.ui.clone(), self.cancellation).await?;
        Ok(())
    }
}

/// `<path>.bak`, keeping any extension already on `path`.
pub(crate) fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}
