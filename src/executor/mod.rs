//! The engine: ordered phases, fan-out per phase, best-effort error funnel.

mod reconcile;

use std::collections::HashSet;
use std::path::PathBuf;

use futures::future::join_all;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogMergeConfig, merge_vehicle_catalogs, strip_preset_entries};
use crate::core::{MigrationReport, MigrationWarning, Result, UpgradeError, fsx};
use crate::legacy;
use crate::policy::{MigrationEntry, Phase};
use crate::version::{CompareOp, VersionOracle};

/// Top-level entries that survive the legacy-root-cleanup phase.
pub fn default_cleanup_keep() -> Vec<String> {
    ["cache", "Cache", "sys", "data", "log", "lockfile"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Everything the engine needs for one migration run: the user data root,
/// the running application identity, the phase-partitioned entry table and
/// the catalog paths. Supplied by the caller; the engine computes none of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    pub root: PathBuf,
    pub app_name: String,
    pub app_version: String,
    #[serde(default)]
    pub entries: Vec<MigrationEntry>,
    /// Catalog documents scrubbed of preset entries during catalog-cleanup.
    #[serde(default)]
    pub catalog_cleanup: Vec<PathBuf>,
    /// Paths for the catalog-merge phase; skipped entirely when absent.
    #[serde(default)]
    pub catalog_merge: Option<CatalogMergeConfig>,
    /// Persisted sensor-preset blob for the legacy field fix-up.
    #[serde(default)]
    pub legacy_sensor_presets: Option<PathBuf>,
    #[serde(default = "default_cleanup_keep")]
    pub cleanup_keep: Vec<String>,
}

impl UpgradeConfig {
    pub fn new(
        root: impl Into<PathBuf>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            app_name: app_name.into(),
            app_version: app_version.into(),
            entries: Vec::new(),
            catalog_cleanup: Vec::new(),
            catalog_merge: None,
            legacy_sensor_presets: None,
            cleanup_keep: default_cleanup_keep(),
        }
    }

    pub fn entry(mut self, entry: MigrationEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(mut self, entries: impl IntoIterator<Item = MigrationEntry>) -> Self {
        self.entries.extend(entries);
        self
    }

    pub fn catalog_cleanup(mut self, document: impl Into<PathBuf>) -> Self {
        self.catalog_cleanup.push(document.into());
        self
    }

    pub fn catalog_merge(mut self, merge: CatalogMergeConfig) -> Self {
        self.catalog_merge = Some(merge);
        self
    }

    pub fn legacy_sensor_presets(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_sensor_presets = Some(path.into());
        self
    }

    pub fn keep_on_cleanup(mut self, name: impl Into<String>) -> Self {
        self.cleanup_keep.push(name.into());
        self
    }
}

/// Runs the migration pipeline over a single, exclusively owned user data
/// tree. Phases execute strictly in order; entries within a phase are
/// reconciled concurrently; every expected failure lands in the report
/// instead of aborting the run.
pub struct UpgradeEngine {
    config: UpgradeConfig,
    oracle: VersionOracle,
}

impl UpgradeEngine {
    pub fn new(config: UpgradeConfig) -> Result<Self> {
        let app_version = Version::parse(&config.app_version).map_err(|err| {
            UpgradeError::VersionRecord(format!(
                "invalid application version '{}': {err}",
                config.app_version
            ))
        })?;
        let oracle = VersionOracle::new(&config.root, config.app_name.clone(), app_version);
        Ok(Self { config, oracle })
    }

    pub fn config(&self) -> &UpgradeConfig {
        &self.config
    }

    pub fn oracle(&self) -> &VersionOracle {
        &self.oracle
    }

    /// Synchronous guarantee that the cache directory exists, for callers
    /// that need it before the async engine runs.
    pub fn ensure_cache_sync(&self) -> Result<()> {
        let cache = self.config.root.join("cache");
        std::fs::create_dir_all(&cache).map_err(|err| UpgradeError::io(cache, err))
    }

    /// Whether the workspace predates the running application version.
    /// Delegates to the oracle; computed once per engine.
    pub async fn needs_upgrade(&self) -> bool {
        self.oracle.needs_upgrade().await
    }

    /// Runs every phase, in order, to completion. Never fails: all expected
    /// errors are funneled into the returned report.
    pub async fn run_migration(&self) -> MigrationReport {
        let mut report = MigrationReport::default();
        self.run_entry_phase(Phase::Cache, &mut report).await;
        self.run_entry_phase(Phase::System, &mut report).await;
        self.run_entry_phase(Phase::UserData, &mut report).await;
        self.run_catalog_cleanup(&mut report).await;
        self.run_catalog_merge(&mut report).await;
        self.run_entry_phase(Phase::Log, &mut report).await;
        self.run_root_cleanup(&mut report).await;
        report
    }

    /// The one-off sensor field-name fix-up, gated by its own legacy
    /// threshold; independent of the main upgrade decision.
    pub async fn run_legacy_sensor_fix(&self) -> MigrationReport {
        let mut report = MigrationReport::default();
        let Some(path) = self.config.legacy_sensor_presets.as_deref() else {
            return report;
        };
        let gated = self
            .oracle
            .compare_install_version(legacy::LEGACY_SENSOR_VERSION_CEILING, CompareOp::Le)
            .await;
        if !gated {
            return report;
        }
        if let Err(err) = legacy::migrate_sensor_field_names(path).await {
            report.push(MigrationWarning::SensorPresetRewriteFailed {
                path: path.to_path_buf(),
                detail: err.to_string(),
            });
        }
        report
    }

    async fn run_entry_phase(&self, phase: Phase, report: &mut MigrationReport) {
        let tasks = self
            .config
            .entries
            .iter()
            .filter(|entry| entry.phase == phase)
            .map(|entry| async move {
                reconcile::reconcile_entry(entry)
                    .await
                    .map_err(|err| MigrationWarning::EntryFailed {
                        phase,
                        target: entry.target.clone(),
                        detail: err.to_string(),
                    })
            });
        for result in join_all(tasks).await {
            if let Err(warning) = result {
                report.push(warning);
            }
        }
    }

    async fn run_catalog_cleanup(&self, report: &mut MigrationReport) {
        for path in &self.config.catalog_cleanup {
            if !fsx::path_exists(path).await {
                continue;
            }
            if let Err(err) = strip_preset_entries(path).await {
                report.push(MigrationWarning::CatalogUnreadable {
                    path: path.clone(),
                    detail: err.to_string(),
                });
            }
        }
    }

    async fn run_catalog_merge(&self, report: &mut MigrationReport) {
        let Some(merge) = self.config.catalog_merge.as_ref() else {
            return;
        };
        if let Err(err) = merge_vehicle_catalogs(merge, report).await {
            report.push(MigrationWarning::CatalogUnreadable {
                path: merge.user_vehicle_catalog.clone(),
                detail: err.to_string(),
            });
        }
    }

    /// Discards the pre-migration flat layout: everything directly under the
    /// root except the allow-list is removed.
    async fn run_root_cleanup(&self, report: &mut MigrationReport) {
        let keep: HashSet<&str> = self.config.cleanup_keep.iter().map(String::as_str).collect();
        let names = match fsx::list_names(&self.config.root).await {
            Ok(names) => names,
            Err(err) => {
                report.push(MigrationWarning::CleanupFailed {
                    path: self.config.root.clone(),
                    detail: err.to_string(),
                });
                return;
            }
        };
        let removals = names
            .into_iter()
            .filter(|name| !keep.contains(name.as_str()))
            .map(|name| {
                let path = self.config.root.join(&name);
                async move {
                    let result = fsx::remove_all(&path).await;
                    (path, result)
                }
            });
        for (path, result) in join_all(removals).await {
            if let Err(err) = result {
                report.push(MigrationWarning::CleanupFailed {
                    path,
                    detail: err.to_string(),
                });
            }
        }
    }
}
