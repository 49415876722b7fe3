pub mod error;
pub mod fsx;
pub mod report;

pub use error::{Result, UpgradeError};
pub use report::{MigrationReport, MigrationWarning};
