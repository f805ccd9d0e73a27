use thiserror::Error;

use tafel_core::StoreError;

pub mod activity;
pub mod offer;

pub use activity::SqlActivityLog;
pub use offer::SqlOfferStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(sqlx::Error::RowNotFound) => {
                StoreError::NotFound("row not found".to_string())
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}
