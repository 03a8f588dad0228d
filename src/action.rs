//! Action configuration and the pre/main/post command stage machine.
//!
//! Mirrors `internal/action/{config,runner}.go`. An action binds a glob
//! matcher to an optional pre-command, a required main command, and an
//! optional post-command that always runs (and always spends its full
//! retry budget) regardless of whether the main command succeeded.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::envvars::EnvVars;
use crate::error::{KonvahtiError, Result};
use crate::exec;
use crate::pathglob::PathMatcher;
use crate::retry;

const OUTCOME_ENV_KEY: &str = "KONVAHTI_ACTION_STATUS";
const OUTCOME_SUCCESS: &str = "success";
const OUTCOME_FAILED: &str = "failed";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub match_files: Vec<String>,
    #[serde(default)]
    pub env: EnvVars,
    #[serde(default)]
    pub inherit_all_env_vars: bool,
    #[serde(default)]
    pub inherit_env_vars: Vec<String>,
    #[serde(default)]
    pub work_directory: String,
    #[serde(default)]
    pub pre_command: Option<Vec<String>>,
    pub command: Vec<String>,
    #[serde(default)]
    pub post_command: Option<Vec<String>>,
    #[serde(default, with = "humantime_serde::option")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub max_retries: u32,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            return Err(KonvahtiError::Config(format!(
                "no action command specified for action {}",
                self.name
            )));
        }
        Ok(())
    }

    pub fn matcher(&self) -> Result<PathMatcher> {
        PathMatcher::new(&self.match_files)
    }
}

pub struct Runner {
    retry_strat: Box<dyn Fn(u32) -> Duration + Send + Sync>,
    work_dir: String,
    env_vars: EnvVars,
    matcher: PathMatcher,
    config: Config,
}

impl Runner {
    pub fn new(
        retry_strat: impl Fn(u32) -> Duration + Send + Sync + 'static,
        default_work_dir: &str,
        inherited_env_vars: EnvVars,
        config: Config,
    ) -> Result<Self> {
        let matcher = config.matcher()?;
        let work_dir = resolve_work_dir(default_work_dir, &config.work_directory);
        let env_vars = Self::inherit_env_vars(&config, inherited_env_vars);

        Ok(Self {
            retry_strat: Box::new(retry_strat),
            work_dir,
            env_vars,
            matcher,
            config,
        })
    }

    fn inherit_env_vars(config: &Config, process_env: EnvVars) -> EnvVars {
        let mut env_vars = if config.inherit_all_env_vars {
            process_env
        } else {
            let mut acc = EnvVars::new();
            for name in &config.inherit_env_vars {
                if let Some(value) = process_env.lookup(name) {
                    acc = acc.add(name, value);
                }
            }
            acc
        };
        env_vars = env_vars.join(config.env.clone());
        env_vars
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns the first path in `filenames` that matches this action's
    /// glob set, if any.
    pub fn match_any<'a>(&self, filenames: &'a [String]) -> Option<&'a str> {
        filenames
            .iter()
            .find(|f| self.matcher.matches(f))
            .map(String::as_str)
    }

    pub async fn run(&self, token: &CancellationToken) -> Result<()> {
        let span = info_span!("action", action = %self.config.name);
        async {
            debug!("executing command");

            let mut exec_result: Result<()> = Ok(());

            if let Some(pre_command) = &self.config.pre_command {
                exec_result = self
                    .run_stage(token, "preCommand", pre_command, EnvVars::new())
                    .await;
            }

            // The post-command always runs, and must see whether the main
            // command (not the pre-command) succeeded, so the main command
            // is only attempted when the pre-command didn't already fail.
            if exec_result.is_ok() {
                exec_result = self
                    .run_stage(token, "command", &self.config.command, EnvVars::new())
                    .await;
            }

            if let Some(post_command) = &self.config.post_command {
                let outcome = if exec_result.is_ok() {
                    OUTCOME_SUCCESS
                } else {
                    OUTCOME_FAILED
                };
                // Always spends its full retry budget, even once the
                // outcome is already decided: the post-command's own
                // result is intentionally discarded.
                let _ = self
                    .run_stage(
                        token,
                        "postCommand",
                        post_command,
                        EnvVars::from_key_value(OUTCOME_ENV_KEY, outcome),
                    )
                    .await;
            }

            match &exec_result {
                Ok(()) => info!(event = "action_success", "action executed successfully"),
                Err(err) => error!(event = "action_failed", error = %err, "action execution failed"),
            }

            exec_result
        }
        .instrument(span)
        .await
    }

    async fn run_stage(
        &self,
        token: &CancellationToken,
        stage: &'static str,
        command: &[String],
        extra_env: EnvVars,
    ) -> Result<()> {
        let backoff = &self.retry_strat;
        retry::retry(token, self.config.max_retries, backoff, |_attempt| {
            self.run_command(stage, command, extra_env.clone())
        })
        .await
    }

    async fn run_command(
        &self,
        stage: &'static str,
        command: &[String],
        extra_env: EnvVars,
    ) -> std::result::Result<(), anyhow::Error> {
        let span = info_span!("command", stage = stage, command = ?command);
        async {
            debug!("running command");

            let exec_command = exec::Command {
                args: command.to_vec(),
                env: self.env_vars.clone().join(extra_env),
                work_dir: self.work_dir.clone(),
            };

            let run_fut = exec::run(
                &exec_command,
                |line: &str| info!(event = "stdout", "{line}"),
                |line: &str| info!(event = "stderr", "{line}"),
            );

            let result = match self.config.timeout {
                Some(timeout) => match tokio::time::timeout(timeout, run_fut).await {
                    Ok(r) => r,
                    Err(_) => {
                        error!(event = "deadline_exceeded", "deadline exceeded");
                        return Err(KonvahtiError::DeadlineExceeded.into());
                    }
                },
                None => run_fut.await,
            };

            match result {
                Ok(outcome) => {
                    debug!(event = "command_success", return_code = outcome.exit_code, "command executed successfully");
                    Ok(())
                }
                Err(err) => {
                    error!(event = "command_failed", error = %err, "command execution failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn resolve_work_dir(default_work_dir: &str, desired_dir: &str) -> String {
    if desired_dir.is_empty() {
        return default_work_dir.to_string();
    }
    let path = std::path::Path::new(desired_dir);
    if path.is_absolute() {
        desired_dir.to_string()
    } else {
        std::path::Path::new(default_work_dir)
            .join(desired_dir)
            .to_string_lossy()
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, command: Vec<&str>) -> Config {
        Config {
            name: name.to_string(),
            match_files: vec![],
            env: EnvVars::new(),
            inherit_all_env_vars: false,
            inherit_env_vars: vec![],
            work_directory: String::new(),
            pre_command: None,
            command: command.into_iter().map(String::from).collect(),
            post_command: None,
            timeout: None,
            max_retries: 0,
        }
    }

    #[test]
    fn validate_requires_a_command() {
        let mut c = config("deploy", vec!["echo", "hi"]);
        assert!(c.validate().is_ok());
        c.command.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn resolve_work_dir_prefers_absolute_override() {
        assert_eq!(resolve_work_dir("/tmp/base", "/abs/override"), "/abs/override");
        assert_eq!(resolve_work_dir("/tmp/base", "sub"), "/tmp/base/sub");
        assert_eq!(resolve_work_dir("/tmp/base", ""), "/tmp/base");
    }

    #[tokio::test]
    async fn run_executes_command_and_succeeds() {
        let config = config("noop", vec!["true"]);
        let runner = Runner::new(
            |_| Duration::from_millis(0),
            ".",
            EnvVars::new(),
            config,
        )
        .unwrap();

        let token = CancellationToken::new();
        assert!(runner.run(&token).await.is_ok());
    }

    #[tokio::test]
    async fn post_command_runs_even_after_main_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("post_ran");

        let mut config = config("fails", vec!["false"]);
        config.post_command = Some(vec![
            "sh".into(),
            "-c".into(),
            format!("touch {}", marker.display()),
        ]);

        let runner = Runner::new(|_| Duration::from_millis(0), ".", EnvVars::new(), config).unwrap();
        let token = CancellationToken::new();

        let result = runner.run(&token).await;
        assert!(result.is_err());
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn match_any_returns_first_matching_filename() {
        let mut config = config("build", vec!["true"]);
        config.match_files = vec!["content/*.md".to_string()];
        let runner = Runner::new(|_| Duration::from_millis(0), ".", EnvVars::new(), config).unwrap();

        let filenames = vec!["README.md".to_string(), "content/index.md".to_string()];
        assert_eq!(runner.match_any(&filenames), Some("content/index.md"));
        assert_eq!(runner.match_any(&["other.txt".to_string()]), None);
    }
}
