use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpgradeError {
    #[error("I/O error at '{path}': {detail}")]
    Io { path: PathBuf, detail: String },

    #[error("Catalog parse error: {0}")]
    CatalogParse(String),

    #[error("Catalog shape error: {0}")]
    CatalogShape(String),

    #[error("Version record error: {0}")]
    VersionRecord(String),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

pub type Result<T> = std::result::Result<T, UpgradeError>;

impl UpgradeError {
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            detail: err.to_string(),
        }
    }
}
