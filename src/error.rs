use thiserror::Error;

/// Fatal conditions that abort a run.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("invalid storage location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("object store {operation} failed for {path}")]
    Storage {
        operation: &'static str,
        path: String,
        #[source]
        source: object_store::Error,
    },

    #[error("output {path} already contains data and write mode is error_if_exists")]
    OutputExists { path: String },

    #[error("failed to encode table {table}")]
    Encode {
        table: &'static str,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("failed to build record batch for table {table}")]
    Batch {
        table: &'static str,
        #[source]
        source: arrow::error::ArrowError,
    },
}

impl EtlError {
    pub fn storage(
        operation: &'static str,
        path: impl std::fmt::Display,
        source: object_store::Error,
    ) -> Self {
        EtlError::Storage {
            operation,
            path: path.to_string(),
            source,
        }
    }
}
