//! Per-watcher loop: refresh the source, run any actions whose glob
//! matches a changed file. Mirrors `internal/watcher/watcher.go`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::action;
use crate::config::WatcherConfig;
use crate::envvars::EnvVars;
use crate::error::Result;
use crate::retry;
use crate::source::git::GitSource;
use crate::source::s3::S3Source;
use crate::source::FileSource;

const RETRY_MIN: Duration = Duration::from_millis(10);
const RETRY_MAX: Duration = Duration::from_secs(600);

pub struct Watcher {
    name: String,
    refresh_timeout: Option<Duration>,
    interval: Option<Duration>,
    should_run_once: bool,
    source: Box<dyn FileSource>,
    runners: Vec<action::Runner>,
}

impl Watcher {
    pub fn new(config: WatcherConfig, process_env: EnvVars) -> Result<Self> {
        let source: Box<dyn FileSource> = if let Some(git_config) = config.git {
            Box::new(GitSource::new(git_config))
        } else if let Some(s3_config) = config.s3 {
            Box::new(S3Source::new(s3_config))
        } else {
            return Err(crate::error::KonvahtiError::Config(format!(
                "no remote source specified for config {}",
                config.name
            )));
        };

        let default_work_dir = source.directory().to_string();

        // The runners are all built up front, rather than lazily per
        // action, so that every one of them can be logged before any
        // command executes.
        let mut runners = Vec::with_capacity(config.actions.len());
        for action_config in config.actions {
            runners.push(action::Runner::new(
                retry::exponential_backoff(RETRY_MIN, RETRY_MAX),
                &default_work_dir,
                process_env.clone(),
                action_config,
            )?);
        }

        Ok(Self {
            name: config.name,
            refresh_timeout: config.refresh_timeout,
            interval: config.interval,
            should_run_once: config.should_run_once(),
            source,
            runners,
        })
    }

    pub async fn run(&mut self, token: &CancellationToken) -> Result<()> {
        let span = info_span!("watcher", watcher = %self.name);
        async {
            if self.should_run_once {
                return self.run_once(token).await;
            }

            loop {
                if token.is_cancelled() {
                    return Ok(());
                }

                // Errors are swallowed here (not propagated to the
                // supervisor) so the watcher keeps retrying after the
                // interval elapses rather than taking the whole fleet down.
                let _ = self.run_once(token).await;

                let interval = self.interval.unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = token.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_once(&mut self, token: &CancellationToken) -> Result<()> {
        debug!(stage = "refresh", "refreshing file source");

        let refresh_fut = self.source.refresh();
        let changed_files = match self.refresh_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, refresh_fut).await {
                Ok(result) => result?,
                Err(_) => return Err(crate::error::KonvahtiError::DeadlineExceeded),
            },
            None => refresh_fut.await?,
        };

        for index in self.find_actions_to_run(&changed_files) {
            self.runners[index].run(token).await?;
        }

        Ok(())
    }

    fn find_actions_to_run(&self, changed_files: &[String]) -> Vec<usize> {
        let mut to_run = Vec::with_capacity(self.runners.len());
        for (i, runner) in self.runners.iter().enumerate() {
            if let Some(filename) = runner.match_any(changed_files) {
                debug!(filename, action = runner.name(), "match found");
                to_run.push(i);
            }
        }
        to_run
    }
}
