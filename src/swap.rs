//! Atomic directory swap via a staging symlink, plus a chroot-scoped view
//! for populators. Mirrors `internal/file/swap.go`.

use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::error::{KonvahtiError, Result};

const LINK_SUFFIX: &str = "_ln";

/// A filesystem view rooted at a fixed directory: every relative path a
/// populator passes in is joined onto that root before touching disk,
/// mirroring `go-billy`'s `Chroot`.
#[derive(Debug, Clone)]
pub struct ScopedFs {
    root: PathBuf,
}

impl ScopedFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `relative` against the root. Rejects absolute paths and
    /// `..` components that would escape the scope.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if rel.is_absolute() {
            return Err(KonvahtiError::Config(format!(
                "path {relative:?} must be relative to the scoped root"
            )));
        }
        if rel.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            return Err(KonvahtiError::Config(format!(
                "path {relative:?} escapes the scoped root"
            )));
        }
        Ok(self.root.join(rel))
    }

    pub async fn write(&self, relative: &str, contents: &[u8]) -> Result<()> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    pub async fn remove(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Populates `new_directory` (via a [`ScopedFs`] rooted there), then
/// atomically retargets `target_directory_link` to point at it. On any
/// failure the partially-built new directory and staging link are cleaned
/// up, leaving the existing target untouched.
pub async fn swap_directory<F, Fut>(
    target_directory_link: &Path,
    new_directory: &Path,
    populate: F,
) -> Result<()>
where
    F: FnOnce(ScopedFs) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let new_directory_link = append_suffix(new_directory, LINK_SUFFIX);

    create_populated_dir(new_directory).await?;

    let result = do_swap(
        target_directory_link,
        new_directory,
        &new_directory_link,
        populate,
    )
    .await;

    if result.is_err() {
        cleanup_new_directory(target_directory_link, new_directory).await;
    }
    cleanup_new_directory_link(&new_directory_link).await;

    result
}

async fn create_populated_dir(new_directory: &Path) -> Result<()> {
    tokio::fs::create_dir_all(new_directory)
        .await
        .map_err(KonvahtiError::Swap)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(new_directory, std::fs::Permissions::from_mode(0o750))
            .await
            .map_err(KonvahtiError::Swap)?;
    }

    Ok(())
}

async fn do_swap<F, Fut>(
    target_directory_link: &Path,
    new_directory: &Path,
    new_directory_link: &Path,
    populate: F,
) -> Result<()>
where
    F: FnOnce(ScopedFs) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    populate(ScopedFs::new(new_directory)).await?;

    #[cfg(unix)]
    {
        let target = new_directory
            .file_name()
            .ok_or_else(|| KonvahtiError::Config("new directory has no file name".into()))?;
        tokio::fs::symlink(target, new_directory_link)
            .await
            .map_err(KonvahtiError::Swap)?;
    }

    debug!(
        new_directory_link = %new_directory_link.display(),
        target_directory_link = %target_directory_link.display(),
        "replacing target directory link with the new link"
    );

    tokio::fs::rename(new_directory_link, target_directory_link)
        .await
        .map_err(KonvahtiError::Swap)?;
    Ok(())
}

async fn cleanup_new_directory(target_directory_link: &Path, new_directory: &Path) {
    let current_target = match tokio::fs::read_link(target_directory_link).await {
        Ok(link) => link,
        Err(_) => return,
    };

    let new_name = new_directory.file_name();
    if current_target.file_name() != new_name {
        if let Err(e) = tokio::fs::remove_dir_all(new_directory).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!(error = %e, "failed to clean new directory");
            }
        }
    }
}

async fn cleanup_new_directory_link(new_directory_link: &Path) {
    match tokio::fs::symlink_metadata(new_directory_link).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => {
            error!(error = %e, "failed to get new directory link info");
            return;
        }
    }
    if let Err(e) = tokio::fs::remove_file(new_directory_link).await {
        error!(error = %e, "failed to delete new directory link");
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}
