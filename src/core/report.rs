use std::fmt;
use std::path::PathBuf;

use crate::policy::Phase;

/// A non-fatal condition observed during a migration run.
///
/// The engine never aborts on these; they are accumulated into the
/// [`MigrationReport`] so callers and tests can inspect exactly what was
/// skipped or left inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationWarning {
    /// A single entry's reconciliation failed; the phase continued without it.
    EntryFailed {
        phase: Phase,
        target: PathBuf,
        detail: String,
    },
    /// A catalog document could not be read, parsed, or rewritten.
    CatalogUnreadable { path: PathBuf, detail: String },
    /// A vehicle references a dynamics side-file that does not exist.
    MissingDynamicsFile { vehicle: String, id: u64 },
    /// Two or more vehicles ended up pointing at the same sensor-group id.
    SensorGroupCollision { id: u64, vehicles: Vec<String> },
    /// A top-level legacy entry could not be removed during root cleanup.
    CleanupFailed { path: PathBuf, detail: String },
    /// The legacy sensor-preset blob could not be rewritten.
    SensorPresetRewriteFailed { path: PathBuf, detail: String },
}

impl fmt::Display for MigrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntryFailed {
                phase,
                target,
                detail,
            } => write!(
                f,
                "entry reconciliation failed in phase {phase} for '{}': {detail}",
                target.display()
            ),
            Self::CatalogUnreadable { path, detail } => {
                write!(f, "catalog '{}' unreadable: {detail}", path.display())
            }
            Self::MissingDynamicsFile { vehicle, id } => write!(
                f,
                "vehicle '{vehicle}' references dynamics profile {id} but dynamic_{id}.json does not exist"
            ),
            Self::SensorGroupCollision { id, vehicles } => write!(
                f,
                "sensor group id {id} is referenced by multiple vehicles: {}",
                vehicles.join(", ")
            ),
            Self::CleanupFailed { path, detail } => {
                write!(f, "failed to remove legacy entry '{}': {detail}", path.display())
            }
            Self::SensorPresetRewriteFailed { path, detail } => write!(
                f,
                "failed to rewrite sensor preset blob '{}': {detail}",
                path.display()
            ),
        }
    }
}

/// Outcome of a best-effort migration run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    pub warnings: Vec<MigrationWarning>,
}

impl MigrationReport {
    pub fn push(&mut self, warning: MigrationWarning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}
