//! Declarative migration entries and the per-entry reconciliation policy.
//!
//! The entry table is supplied by the caller; the engine only interprets it.
//! Which action applies to an entry is decided by [`ReconcileAction::plan`],
//! a single pure match over the entry and a snapshot of which of its paths
//! exist, so each variant can be exercised in isolation.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Ordered stages of the migration pipeline. Later phases assume earlier
/// phases have produced a stable directory skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Cache,
    System,
    UserData,
    CatalogCleanup,
    CatalogMerge,
    Log,
    LegacyRootCleanup,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::System => "system",
            Self::UserData => "user-data",
            Self::CatalogCleanup => "catalog-cleanup",
            Self::CatalogMerge => "catalog-merge",
            Self::Log => "log",
            Self::LegacyRootCleanup => "legacy-root-cleanup",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical directory or file to reconcile during a phase.
///
/// `target` is always required; `origin` points at the old layout, `source`
/// at the vendor preset, and `default_content` seeds a file that exists
/// nowhere else. `origin_backup`/`target_backup` cover OS-specific path
/// differences for bulk directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationEntry {
    pub phase: Phase,
    pub target: PathBuf,
    #[serde(default)]
    pub origin: Option<PathBuf>,
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub default_content: Option<String>,
    #[serde(default)]
    pub is_file: bool,
    #[serde(default)]
    pub only_user_data: bool,
    #[serde(default)]
    pub is_map_data: bool,
    #[serde(default)]
    pub should_delete: bool,
    #[serde(default)]
    pub target_backup: Option<PathBuf>,
    #[serde(default)]
    pub origin_backup: Option<PathBuf>,
}

impl MigrationEntry {
    pub fn file(phase: Phase, target: impl Into<PathBuf>) -> Self {
        Self {
            phase,
            target: target.into(),
            origin: None,
            source: None,
            default_content: None,
            is_file: true,
            only_user_data: false,
            is_map_data: false,
            should_delete: false,
            target_backup: None,
            origin_backup: None,
        }
    }

    pub fn dir(phase: Phase, target: impl Into<PathBuf>) -> Self {
        Self {
            is_file: false,
            ..Self::file(phase, target)
        }
    }

    pub fn origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn default_content(mut self, content: impl Into<String>) -> Self {
        self.default_content = Some(content.into());
        self
    }

    pub fn only_user_data(mut self) -> Self {
        self.only_user_data = true;
        self
    }

    pub fn map_data(mut self) -> Self {
        self.is_map_data = true;
        self
    }

    pub fn should_delete(mut self) -> Self {
        self.should_delete = true;
        self
    }

    pub fn backup_pair(
        mut self,
        origin_backup: impl Into<PathBuf>,
        target_backup: impl Into<PathBuf>,
    ) -> Self {
        self.origin_backup = Some(origin_backup.into());
        self.target_backup = Some(target_backup.into());
        self
    }
}

/// Which of an entry's paths currently exist on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathProbe {
    pub target: bool,
    pub origin: bool,
    pub source: bool,
    pub origin_backup: bool,
}

/// The reconciliation rule, reduced to a tagged variant per branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Copy `origin` to `target` as a backup, then delete `origin`.
    BackupThenDelete,
    /// Copy `origin` over `target` (or wholesale for directories).
    OverwriteFromOrigin,
    /// Create `target` with the entry's default content.
    DefaultContentSeed,
    /// Seed `target` from the vendor `source`.
    SeedFromSource,
    /// Merge user files into `target` without bulk-overwriting; with
    /// `preset_overlay` the vendor files are copied on top afterwards.
    UserDataMerge { preset_overlay: bool },
    /// Copy the OS-compatibility backup pair instead of `origin`/`target`.
    BulkFromBackup,
    /// Just guarantee the target directory exists.
    EnsurePresent,
    Noop,
}

impl ReconcileAction {
    pub fn plan(entry: &MigrationEntry, probe: PathProbe) -> Self {
        if entry.is_file {
            if entry.should_delete && probe.origin {
                Self::BackupThenDelete
            } else if probe.origin {
                Self::OverwriteFromOrigin
            } else if entry.default_content.is_some() && !probe.target {
                Self::DefaultContentSeed
            } else if probe.source {
                Self::SeedFromSource
            } else {
                Self::Noop
            }
        } else if entry.only_user_data {
            Self::UserDataMerge {
                preset_overlay: entry.is_map_data,
            }
        } else if probe.origin {
            Self::OverwriteFromOrigin
        } else if probe.origin_backup && entry.target_backup.is_some() {
            Self::BulkFromBackup
        } else if probe.target {
            Self::Noop
        } else if probe.source {
            Self::SeedFromSource
        } else {
            Self::EnsurePresent
        }
    }
}
