//! Error types for sqlx-pg-conn-mgr

use thiserror::Error;

/// Errors that may occur when working with sqlx-pg-conn-mgr
#[derive(Error, Debug)]
pub enum Error {
   /// Error from the sqlx library. Standard sqlx errors are converted to this variant
   #[error("Sqlx error: {0}")]
   Sqlx(#[from] sqlx::Error),

   /// Database has been closed and cannot be used
   #[error("Database has been closed")]
   DatabaseClosed,

   /// Connection string was empty or could not be parsed
   #[error("Invalid connection string: {0}")]
   InvalidConnectionString(String),

   /// Postgres type that cannot be mapped to JSON
   #[error("Unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// Requested column is not part of the row
   #[error("Column '{0}' not found in row")]
   ColumnNotFound(String),

   /// Column value could not be converted into the requested Rust type
   #[error("Failed to decode column '{column}': {source}")]
   Decode {
      column: String,
      #[source]
      source: serde_json::Error,
   },
}
