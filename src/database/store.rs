use async_trait::async_trait;
use thiserror::Error;

use super::record::Record;
use crate::filter::{FilterError, Query};

/// Errors raised by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record of type '{0}' has no id")]
    MissingId(String),

    #[error("Invalid query: {0}")]
    Query(#[from] FilterError),

    #[error("Unexpected row shape: {0}")]
    RowShape(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence for records, addressed by wire type
#[async_trait]
pub trait Store: Send + Sync {
    async fn find(&self, resource_type: &str, id: &str) -> Result<Option<Record>, StoreError>;

    async fn select(&self, resource_type: &str, query: &Query) -> Result<Vec<Record>, StoreError>;

    async fn count(&self, resource_type: &str, query: &Query) -> Result<u64, StoreError>;

    /// Insert or update. A persisted record that is not dirty is a successful no-op.
    /// On success the record carries its id and its original snapshot is synced.
    async fn save(&self, record: &mut Record) -> Result<bool, StoreError>;

    async fn delete(&self, record: &Record) -> Result<bool, StoreError>;

    async fn all(&self, resource_type: &str) -> Result<Vec<Record>, StoreError> {
        self.select(resource_type, &Query::default()).await
    }
}
