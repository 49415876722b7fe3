//! Applies a planned [`ReconcileAction`] to a single entry.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures::future::join_all;

use crate::core::{Result, fsx};
use crate::policy::{MigrationEntry, PathProbe, ReconcileAction};

async fn exists_opt(path: Option<&PathBuf>) -> bool {
    match path {
        Some(path) => fsx::path_exists(path).await,
        None => false,
    }
}

pub(crate) async fn probe_entry(entry: &MigrationEntry) -> PathProbe {
    PathProbe {
        target: fsx::path_exists(&entry.target).await,
        origin: exists_opt(entry.origin.as_ref()).await,
        source: exists_opt(entry.source.as_ref()).await,
        origin_backup: exists_opt(entry.origin_backup.as_ref()).await,
    }
}

pub(crate) async fn reconcile_entry(entry: &MigrationEntry) -> Result<()> {
    let probe = probe_entry(entry).await;
    let action = ReconcileAction::plan(entry, probe);
    apply(entry, action).await
}

async fn apply(entry: &MigrationEntry, action: ReconcileAction) -> Result<()> {
    match action {
        ReconcileAction::BackupThenDelete => {
            let Some(origin) = entry.origin.as_deref() else {
                return Ok(());
            };
            fsx::copy_recursive(origin, &entry.target).await?;
            fsx::remove_all(origin).await
        }
        ReconcileAction::OverwriteFromOrigin => {
            let Some(origin) = entry.origin.as_deref() else {
                return Ok(());
            };
            fsx::copy_recursive(origin, &entry.target).await
        }
        ReconcileAction::DefaultContentSeed => {
            let Some(content) = entry.default_content.as_deref() else {
                return Ok(());
            };
            fsx::write_file(&entry.target, content).await
        }
        ReconcileAction::SeedFromSource => {
            let Some(source) = entry.source.as_deref() else {
                return Ok(());
            };
            fsx::copy_recursive(source, &entry.target).await
        }
        ReconcileAction::BulkFromBackup => {
            let (Some(origin_backup), Some(target_backup)) =
                (entry.origin_backup.as_deref(), entry.target_backup.as_deref())
            else {
                return Ok(());
            };
            fsx::copy_recursive(origin_backup, target_backup).await
        }
        ReconcileAction::UserDataMerge { preset_overlay } => {
            merge_user_dir(entry, preset_overlay).await
        }
        ReconcileAction::EnsurePresent => fsx::ensure_dir(&entry.target).await,
        ReconcileAction::Noop => Ok(()),
    }
}

/// User-data directory merge. Never bulk-overwrites the target.
///
/// With `preset_overlay`, everything from `origin` is carried over and the
/// vendor `source` files are then copied on top unconditionally (vendor wins
/// for this category). Without it, only file names present in `origin` but
/// not in `source` are copied: vendor-duplicated names are assumed to be
/// seeded already.
async fn merge_user_dir(entry: &MigrationEntry, preset_overlay: bool) -> Result<()> {
    fsx::ensure_dir(&entry.target).await?;
    let origin = entry.origin.as_deref();
    let source = entry.source.as_deref();

    if preset_overlay {
        if let Some(origin) = origin {
            if fsx::path_exists(origin).await {
                copy_children(origin, &entry.target, None).await?;
            }
        }
        if let Some(source) = source {
            if fsx::path_exists(source).await {
                copy_children(source, &entry.target, None).await?;
            }
        }
        return Ok(());
    }

    let (Some(origin), Some(source)) = (origin, source) else {
        return Ok(());
    };
    if !fsx::path_exists(origin).await || !fsx::path_exists(source).await {
        return Ok(());
    }
    let vendor_names: HashSet<String> = fsx::list_names(source).await?.into_iter().collect();
    copy_children(origin, &entry.target, Some(&vendor_names)).await
}

/// Copies every immediate child of `from` into `to`, skipping names in
/// `exclude`, all copies dispatched concurrently.
async fn copy_children(from: &Path, to: &Path, exclude: Option<&HashSet<String>>) -> Result<()> {
    let names = fsx::list_names(from).await?;
    let copies = names
        .into_iter()
        .filter(|name| exclude.is_none_or(|set| !set.contains(name)))
        .map(|name| {
            let src = from.join(&name);
            let dst = to.join(&name);
            async move { fsx::copy_recursive(&src, &dst).await }
        });
    for result in join_all(copies).await {
        result?;
    }
    Ok(())
}
