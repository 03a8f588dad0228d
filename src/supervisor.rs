//! Fans out the configured watchers, each on its own task, and cancels the
//! rest as soon as one returns an error. Mirrors `internal/start/start.go`'s
//! `errgroup`-based fan-out.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::envvars::EnvVars;
use crate::error::{KonvahtiError, Result};
use crate::watcher::Watcher;

pub struct Supervisor {
    token: CancellationToken,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Runs every watcher concurrently to completion. The first watcher to
    /// return an error cancels the shared token; every other watcher
    /// observes that at its next cancellation point. Returns that first
    /// error, if any, only after every task has finished.
    pub async fn run(&self, configs: Vec<WatcherConfig>, process_env: EnvVars) -> Result<()> {
        if configs.is_empty() {
            return Err(KonvahtiError::Config("no watchers configured".into()));
        }

        let mut join_set = JoinSet::new();
        for config in configs {
            let token = self.token.clone();
            let env = process_env.clone();
            join_set.spawn(async move {
                let mut watcher = Watcher::new(config, env)?;
                watcher.run(&token).await
            });
        }

        let mut first_error = None;
        while let Some(result) = join_set.join_next().await {
            let outcome = match result {
                Ok(watcher_result) => watcher_result,
                Err(join_err) => Err(KonvahtiError::Config(format!(
                    "watcher task panicked: {join_err}"
                ))),
            };

            if let Err(err) = outcome {
                self.token.cancel();
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
