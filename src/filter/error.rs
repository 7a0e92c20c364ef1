use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid table name: {0}")]
    InvalidTableName(String),

    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Sort column \"{0}\" must be prefixed with '+' (ascending) or '-' (descending)")]
    UnsignedSort(String),

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}
