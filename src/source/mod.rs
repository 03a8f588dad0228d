//! Remote file sources: a unified trait plus Git and S3 implementations.
//! Mirrors `internal/watcher/filesource.go`.

pub mod git;
pub mod s3;

use async_trait::async_trait;

use crate::error::Result;

/// A place watchers pull changed files from. `refresh` performs one pull
/// cycle and returns the set of paths (relative to `directory()`) that
/// changed; `directory` is the local path actions should treat as their
/// default working directory.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn refresh(&mut self) -> Result<Vec<String>>;
    fn directory(&self) -> &str;
}
