//! Installed-version detection and the one-shot upgrade decision.
//!
//! The version record lives at `<root>/sys/package.json`; a legacy copy at
//! `<root>/package.json` is still read (never written) so pre-split layouts
//! are recognized. A missing or unparsable record always means "upgrade
//! needed" and never surfaces as an error.

use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use crate::core::{Result, UpgradeError, fsx};

pub const VERSION_RECORD_FILE: &str = "package.json";
pub const DEFAULT_LANGUAGE: &str = "en";

/// The single persisted record describing the previously installed data
/// version. Written all-or-nothing; never partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub name: String,
    pub version: String,
    pub language: String,
}

/// Comparison operator for [`VersionOracle::compare_install_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Le,
    Lt,
    Gt,
    Ge,
    Eq,
}

impl CompareOp {
    pub fn eval(self, installed: &Version, threshold: &Version) -> bool {
        match self {
            Self::Le => installed <= threshold,
            Self::Lt => installed < threshold,
            Self::Gt => installed > threshold,
            Self::Ge => installed >= threshold,
            Self::Eq => installed == threshold,
        }
    }
}

/// Decides whether the on-disk workspace predates the running application.
///
/// Both the first record read and the upgrade decision are computed once per
/// oracle and cached: later comparisons (e.g. the legacy sensor fix-up gate)
/// must see the version that was installed *before* this run rewrote the
/// record.
pub struct VersionOracle {
    root: PathBuf,
    app_name: String,
    app_version: Version,
    installed: OnceCell<Option<VersionRecord>>,
    decision: OnceCell<bool>,
}

impl VersionOracle {
    pub fn new(root: impl Into<PathBuf>, app_name: impl Into<String>, app_version: Version) -> Self {
        Self {
            root: root.into(),
            app_name: app_name.into(),
            app_version,
            installed: OnceCell::new(),
            decision: OnceCell::new(),
        }
    }

    pub fn record_path(&self) -> PathBuf {
        self.root.join("sys").join(VERSION_RECORD_FILE)
    }

    fn legacy_record_path(&self) -> PathBuf {
        self.root.join(VERSION_RECORD_FILE)
    }

    /// The record as it was when this process first looked, or `None` if no
    /// readable record existed. Parse failures are swallowed.
    async fn installed_record(&self) -> &Option<VersionRecord> {
        self.installed
            .get_or_init(|| async {
                for path in [self.legacy_record_path(), self.record_path()] {
                    if let Some(record) = read_record(&path).await {
                        return Some(record);
                    }
                }
                None
            })
            .await
    }

    /// Returns `true` when the workspace was produced by an older (or no)
    /// application version. As a side effect, the decision rewrites the
    /// version record with the running version, preserving any previously
    /// recorded language. Computed once and cached.
    pub async fn needs_upgrade(&self) -> bool {
        *self
            .decision
            .get_or_init(|| async {
                let (upgrade, language) = match self.installed_record().await {
                    None => (true, DEFAULT_LANGUAGE.to_string()),
                    Some(record) => match Version::parse(&record.version) {
                        Ok(installed) if installed < self.app_version => {
                            (true, record.language.clone())
                        }
                        Ok(_) => (false, record.language.clone()),
                        // Unparsable version: treat as no prior record.
                        Err(_) => (true, record.language.clone()),
                    },
                };
                if upgrade {
                    if let Err(err) = self.write_record(&language).await {
                        log::error!("failed to persist version record: {err}");
                    }
                }
                upgrade
            })
            .await
    }

    /// Stateless comparison of the previously installed version against a
    /// threshold. Missing or malformed records compare as `false`: a workspace
    /// with no history never qualifies for a historical fix-up.
    pub async fn compare_install_version(&self, threshold: &str, op: CompareOp) -> bool {
        let Some(record) = self.installed_record().await else {
            return false;
        };
        let Ok(installed) = Version::parse(&record.version) else {
            return false;
        };
        let Ok(threshold) = Version::parse(threshold) else {
            return false;
        };
        op.eval(&installed, &threshold)
    }

    async fn write_record(&self, language: &str) -> Result<()> {
        let record = VersionRecord {
            name: self.app_name.clone(),
            version: self.app_version.to_string(),
            language: language.to_string(),
        };
        let text = serde_json::to_string_pretty(&record)
            .map_err(|err| UpgradeError::Serialize(err.to_string()))?;
        fsx::write_atomic(&self.record_path(), &text).await
    }
}

async fn read_record(path: &Path) -> Option<VersionRecord> {
    let text = fsx::read_to_string(path).await.ok()?;
    serde_json::from_str(&text).ok()
}
