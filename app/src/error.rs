//! Error types for Glossa

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GlossaError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl From<rusqlite::Error> for GlossaError {
    fn from(e: rusqlite::Error) -> Self {
        GlossaError::Storage(e.to_string())
    }
}

impl serde::Serialize for GlossaError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
