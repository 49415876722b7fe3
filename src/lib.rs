// ============================================================================
// simdata-upgrade Library
// ============================================================================
//
// Forward-only, idempotent migration of a simulator user-data workspace
// across application version boundaries. The caller supplies the declarative
// entry table and catalog paths; the engine reconciles the tree in ordered
// phases, never fatally: expected failures accumulate in a MigrationReport.

pub mod catalog;
pub mod core;
pub mod executor;
pub mod legacy;
pub mod policy;
pub mod version;

// Re-export main types for convenience
pub use crate::core::{MigrationReport, MigrationWarning, Result, UpgradeError};
pub use executor::{UpgradeConfig, UpgradeEngine, default_cleanup_keep};
pub use catalog::{CatalogMergeConfig, Element, IdAllocator, IdRange, USER_ID_BASE};
pub use policy::{MigrationEntry, PathProbe, Phase, ReconcileAction};
pub use version::{CompareOp, VersionOracle, VersionRecord};
