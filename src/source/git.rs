//! Git-branch file source. Mirrors `internal/git/git.go`, using `git2`
//! (libgit2 bindings) in place of go-git.

use std::path::PathBuf;

use async_trait::async_trait;
use git2::{Cred, FetchOptions, RemoteCallbacks, Repository};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KonvahtiError, Result};
use super::FileSource;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpAuth {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshAuth {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub key_path: String,
    #[serde(default)]
    pub key_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub url: String,
    pub branch: String,
    pub directory: String,
    #[serde(default)]
    pub http_auth: HttpAuth,
    #[serde(default)]
    pub ssh_auth: SshAuth,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(KonvahtiError::Config("no Git URL specified".into()));
        }
        if self.branch.is_empty() {
            return Err(KonvahtiError::Config("no Git branch specified".into()));
        }
        if self.directory.is_empty() {
            return Err(KonvahtiError::Config("no local directory specified".into()));
        }
        Ok(())
    }

    /// Auth precedence matches the upstream exactly: HTTP token, then HTTP
    /// basic, then an SSH key file, then no authentication at all.
    fn credentials(&self) -> Option<(HttpAuth, SshAuth)> {
        Some((self.http_auth.clone(), self.ssh_auth.clone()))
    }
}

pub struct GitSource {
    config: Config,
    repository: Option<Repository>,
}

impl GitSource {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            repository: None,
        }
    }

    fn fetch_options(&self) -> FetchOptions<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let (http_auth, ssh_auth) = self.config.credentials().unwrap_or_default();
        callbacks.credentials(move |_url, username_from_url, allowed_types| {
            if !http_auth.token.is_empty() {
                return Cred::userpass_plaintext(&http_auth.token, "");
            }
            if !http_auth.username.is_empty() || !http_auth.password.is_empty() {
                return Cred::userpass_plaintext(&http_auth.username, &http_auth.password);
            }
            if !ssh_auth.key_path.is_empty() {
                let username = if ssh_auth.username.is_empty() {
                    username_from_url.unwrap_or("git")
                } else {
                    &ssh_auth.username
                };
                let passphrase = if ssh_auth.key_password.is_empty() {
                    None
                } else {
                    Some(ssh_auth.key_password.as_str())
                };
                return Cred::ssh_key(username, None, std::path::Path::new(&ssh_auth.key_path), passphrase);
            }
            let _ = allowed_types;
            Cred::default()
        });

        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(callbacks);
        fetch_options.depth(10);
        fetch_options.download_tags(git2::AutotagOption::None);
        fetch_options
    }

    fn clone(&self) -> Result<Repository> {
        let mut builder = git2::build::RepoBuilder::new();
        builder.branch(&self.config.branch);
        builder.fetch_options(self.fetch_options());
        builder
            .clone(&self.config.url, std::path::Path::new(&self.config.directory))
            .map_err(|e| KonvahtiError::Source(e.into()))
    }

    fn fetch_and_diff(&mut self, repo: &Repository) -> Result<Vec<String>> {
        let prev_head = repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .map_err(|e| KonvahtiError::Source(e.into()))?;

        let mut remote = repo
            .find_remote("origin")
            .map_err(|e| KonvahtiError::Source(e.into()))?;
        remote
            .fetch(&[&self.config.branch], Some(&mut self.fetch_options()), None)
            .map_err(|e| KonvahtiError::Source(e.into()))?;

        let branch_ref = format!("refs/remotes/origin/{}", self.config.branch);
        let new_head = repo
            .find_reference(&branch_ref)
            .and_then(|r| r.peel_to_commit())
            .map_err(|e| KonvahtiError::Source(e.into()))?;

        if new_head.id() == prev_head.id() {
            debug!("no changes found");
            return Ok(Vec::new());
        }

        let mut local_branch = repo
            .find_branch(&self.config.branch, git2::BranchType::Local)
            .map_err(|e| KonvahtiError::Source(e.into()))?;
        local_branch
            .get_mut()
            .set_target(new_head.id(), "fast-forward")
            .map_err(|e| KonvahtiError::Source(e.into()))?;
        repo.set_head(&format!("refs/heads/{}", self.config.branch))
            .map_err(|e| KonvahtiError::Source(e.into()))?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .map_err(|e| KonvahtiError::Source(e.into()))?;

        diff_file_names(repo, &prev_head.tree().map_err(|e| KonvahtiError::Source(e.into()))?, &new_head.tree().map_err(|e| KonvahtiError::Source(e.into()))?)
    }
}

#[async_trait]
impl FileSource for GitSource {
    async fn refresh(&mut self) -> Result<Vec<String>> {
        if self.repository.is_none() {
            let repo = match Repository::open(&self.config.directory) {
                Ok(repo) => {
                    debug!("existing local repo found. using it.");
                    repo
                }
                Err(_) => {
                    debug!("no local repo found. cloning.");
                    self.clone()?
                }
            };
            // First successful use of a repo (just-cloned or just-opened)
            // reports every tracked file as changed, since there is no
            // previous tree to diff against.
            let files = list_tree_files(&repo)?;
            self.repository = Some(repo);
            return Ok(files);
        }

        let repo = self.repository.take().expect("checked above");
        let result = self.fetch_and_diff(&repo);
        self.repository = Some(repo);
        result
    }

    fn directory(&self) -> &str {
        &self.config.directory
    }
}

fn list_tree_files(repo: &Repository) -> Result<Vec<String>> {
    let head = repo
        .head()
        .and_then(|h| h.peel_to_tree())
        .map_err(|e| KonvahtiError::Source(e.into()))?;

    let mut files = Vec::new();
    head.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            let mut path = PathBuf::from(root);
            path.push(entry.name().unwrap_or_default());
            files.push(path.to_string_lossy().trim_start_matches("./").to_string());
        }
        git2::TreeWalkResult::Ok
    })
    .map_err(|e| KonvahtiError::Source(e.into()))?;
    Ok(files)
}

fn diff_file_names(repo: &Repository, old: &git2::Tree, new: &git2::Tree) -> Result<Vec<String>> {
    let diff = repo
        .diff_tree_to_tree(Some(old), Some(new), None)
        .map_err(|e| KonvahtiError::Source(e.into()))?;

    let mut files = Vec::new();
    for delta in diff.deltas() {
        if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
            files.push(path.to_string_lossy().into_owned());
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_url_branch_and_directory() {
        let base = Config {
            url: "https://example.com/repo.git".into(),
            branch: "main".into(),
            directory: "/tmp/repo".into(),
            http_auth: HttpAuth::default(),
            ssh_auth: SshAuth::default(),
        };
        assert!(base.validate().is_ok());

        let mut missing_url = base.clone();
        missing_url.url.clear();
        assert!(missing_url.validate().is_err());

        let mut missing_branch = base.clone();
        missing_branch.branch.clear();
        assert!(missing_branch.validate().is_err());

        let mut missing_dir = base.clone();
        missing_dir.directory.clear();
        assert!(missing_dir.validate().is_err());
    }
}
