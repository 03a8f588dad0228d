//! Top-level YAML configuration schema. Mirrors `internal/start/config.go`
//! and `internal/watcher/config.go`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::action;
use crate::error::{KonvahtiError, Result};
use crate::logging;
use crate::source::{git, s3};

/// A single watcher: one remote source, one set of actions to run against
/// files it reports changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    pub name: String,
    #[serde(default)]
    pub git: Option<git::Config>,
    #[serde(default)]
    pub s3: Option<s3::Config>,
    #[serde(default, with = "humantime_serde::option")]
    pub refresh_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub interval: Option<Duration>,
    #[serde(default)]
    pub actions: Vec<action::Config>,
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(KonvahtiError::Config("no name specified".into()));
        }

        match (&self.git, &self.s3) {
            (Some(_), Some(_)) => {
                return Err(KonvahtiError::Config("more than one source specified".into()))
            }
            (None, None) => return Err(KonvahtiError::Config("no sources specified".into())),
            (Some(git), None) => git.validate()?,
            (None, Some(s3)) => s3.validate()?,
        }

        if self.actions.is_empty() {
            return Err(KonvahtiError::Config("no actions specified".into()));
        }
        for (i, action) in self.actions.iter().enumerate() {
            action
                .validate()
                .map_err(|e| KonvahtiError::Config(format!("invalid action {i}: {e}")))?;
        }

        Ok(())
    }

    /// A watcher with no `interval` set runs its source refresh exactly
    /// once and returns, rather than looping.
    pub fn should_run_once(&self) -> bool {
        matches!(self.interval, None | Some(Duration::ZERO))
    }
}

/// The full document a single config file or STDIN stream decodes to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub watchers: Vec<WatcherConfig>,
    #[serde(default)]
    pub log: logging::Config,
}

impl Config {
    pub fn from_yaml(data: &str) -> Result<Self> {
        serde_yaml::from_str(data).map_err(|e| KonvahtiError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.watchers.is_empty() {
            return Err(KonvahtiError::Config(
                "no watcher configurations provided".into(),
            ));
        }
        for watcher in &self.watchers {
            watcher.validate()?;
        }
        self.log.validate()
    }

    /// Merges `other`'s watchers into `self`, keeping `self`'s logging
    /// config. Used when multiple config files are given on the command
    /// line: every file's watchers are pooled into one supervisor run.
    pub fn merge(mut self, mut other: Config) -> Self {
        self.watchers.append(&mut other.watchers);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_git_watcher() {
        let yaml = r#"
watchers:
  - name: site
    git:
      url: https://example.com/repo.git
      branch: main
      directory: /srv/site
    actions:
      - name: deploy
        command: ["echo", "deployed"]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.watchers.len(), 1);
        assert!(config.watchers[0].should_run_once());
    }

    #[test]
    fn rejects_watcher_with_both_sources() {
        let yaml = r#"
watchers:
  - name: site
    git:
      url: https://example.com/repo.git
      branch: main
      directory: /srv/site
    s3:
      endpoint: s3.example.com
      accessKeyId: x
      secretAccessKey: y
      bucketName: b
      bucketPrefix: p
      directory: /srv/site
    actions:
      - name: deploy
        command: ["echo", "deployed"]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_config_with_no_watchers() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn merge_pools_watchers_from_both_configs() {
        let a = Config {
            watchers: vec![WatcherConfig {
                name: "a".into(),
                git: None,
                s3: None,
                refresh_timeout: None,
                interval: None,
                actions: vec![],
            }],
            log: logging::Config::default(),
        };
        let b = Config {
            watchers: vec![WatcherConfig {
                name: "b".into(),
                git: None,
                s3: None,
                refresh_timeout: None,
                interval: None,
                actions: vec![],
            }],
            log: logging::Config::default(),
        };
        let merged = a.merge(b);
        assert_eq!(merged.watchers.len(), 2);
    }
}
