//! Async filesystem helpers shared by the migration phases.
//!
//! Every function maps I/O failures into [`UpgradeError::Io`] with the failing
//! path attached, so per-entry warnings can name what went wrong.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::core::{Result, UpgradeError};

pub async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|err| UpgradeError::io(path, err))
}

pub async fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .await
        .map_err(|err| UpgradeError::io(path, err))
}

/// Copies a single file, creating the destination's parent directory first.
pub async fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        ensure_dir(parent).await?;
    }
    fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(|err| UpgradeError::io(from, err))
}

/// Copies a file or an entire directory tree, overwriting existing files.
///
/// Directory recursion is driven by an explicit work stack so the future
/// stays unboxed.
pub async fn copy_recursive(from: &Path, to: &Path) -> Result<()> {
    let meta = fs::metadata(from)
        .await
        .map_err(|err| UpgradeError::io(from, err))?;
    if meta.is_file() {
        return copy_file(from, to).await;
    }

    let mut stack: Vec<(PathBuf, PathBuf)> = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = stack.pop() {
        ensure_dir(&dst).await?;
        let mut entries = fs::read_dir(&src)
            .await
            .map_err(|err| UpgradeError::io(&src, err))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| UpgradeError::io(&src, err))?
        {
            let child_src = entry.path();
            let child_dst = dst.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .map_err(|err| UpgradeError::io(&child_src, err))?;
            if file_type.is_dir() {
                stack.push((child_src, child_dst));
            } else {
                copy_file(&child_src, &child_dst).await?;
            }
        }
    }
    Ok(())
}

/// Lists the immediate child names of a directory.
pub async fn list_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|err| UpgradeError::io(dir, err))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|err| UpgradeError::io(dir, err))?
    {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Removes a file or directory tree; absent paths are not an error.
pub async fn remove_all(path: &Path) -> Result<()> {
    let meta = match fs::metadata(path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(UpgradeError::io(path, err)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|err| UpgradeError::io(path, err))
}

pub async fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)
        .await
        .map_err(|err| UpgradeError::io(from, err))
}

/// All-or-nothing text write: stage into a sibling `.tmp` file, then rename
/// over the destination.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    let staging = path.with_extension("tmp");
    fs::write(&staging, contents)
        .await
        .map_err(|err| UpgradeError::io(&staging, err))?;
    fs::rename(&staging, path)
        .await
        .map_err(|err| UpgradeError::io(path, err))
}

pub async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    fs::write(path, contents)
        .await
        .map_err(|err| UpgradeError::io(path, err))
}
