use std::fmt;

use crate::role::Role;

/// Result type alias for router operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What an endpoint was doing when the database client failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
   Exec,
   Query,
   QueryRow,
   Begin,
   Ping,
   Close,
   Commit,
   Rollback,
}

impl fmt::Display for Action {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Action::Exec => "executing query",
         Action::Query => "running query",
         Action::QueryRow => "running single-row query",
         Action::Begin => "starting transaction",
         Action::Ping => "pinging",
         Action::Close => "closing connection",
         Action::Commit => "committing transaction",
         Action::Rollback => "rolling back transaction",
      })
   }
}

/// Error types for routed database operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// No endpoint was available to serve a read.
   #[error("no available replicas")]
   NoAvailableReplicas,

   /// A write or transaction start was attempted on a replica.
   #[error("this operation can only be performed on the primary, not on the {0}")]
   MasterOnlyOperation(Role),

   /// Initial connection to an endpoint failed.
   #[error("connection to {role} failed: {source}")]
   ConnectionFailed {
      role: Role,
      source: sqlx_pg_conn_mgr::Error,
   },

   /// Every retry attempt failed with a transient error.
   #[error(
      "maximum number of retries exceeded: operation not performed after {attempts} attempts: {source}"
   )]
   MaxRetriesExceeded { attempts: u32, source: Box<Error> },

   /// Every endpoint of a fallback chain failed with a transient error.
   #[error("operation not performed on any endpoint (tried {}): {source}", join_roles(.attempted))]
   FallbackExhausted {
      attempted: Vec<Role>,
      source: Box<Error>,
   },

   /// The per-query timeout or the caller's deadline elapsed.
   #[error("query timeout exceeded on {0}")]
   QueryTimeout(Role),

   /// The caller cancelled the operation.
   #[error("operation cancelled")]
   Cancelled,

   /// Starting or committing a scoped transaction failed.
   #[error("transaction failed: {0}")]
   TransactionFailed(#[source] Box<Error>),

   /// Transaction failed and rollback also failed.
   #[error("transaction failed: {transaction_error}; rollback also failed: {rollback_error}")]
   TransactionRollbackFailed {
      #[source]
      transaction_error: Box<Error>,
      rollback_error: Box<Error>,
   },

   /// Transaction has already been committed or rolled back.
   #[error("transaction has already been finalized (committed or rolled back)")]
   TransactionAlreadyFinalized,

   #[error("nested transactions are not supported")]
   NestedTransaction,

   #[error("ping is not supported inside a transaction")]
   PingInTransaction,

   #[error("invalid configuration: {0}")]
   InvalidConfiguration(String),

   /// The endpoint was closed and cannot be used any more.
   #[error("{0} endpoint has been closed")]
   EndpointClosed(Role),

   /// One or more endpoints failed to close. Every endpoint was still attempted.
   #[error("errors while closing connections: {}", join_errors(.0))]
   CloseFailed(Vec<Error>),

   /// Error reported by the database client, tagged with where it happened.
   #[error("error {action} on {role}: {source}")]
   Client {
      role: Role,
      action: Action,
      source: sqlx::Error,
   },

   /// Error from SQLx operations outside of any endpoint.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),
}

fn join_roles(roles: &[Role]) -> String {
   roles
      .iter()
      .map(|role| role.as_str())
      .collect::<Vec<_>>()
      .join(", ")
}

fn join_errors(errors: &[Error]) -> String {
   errors
      .iter()
      .map(ToString::to_string)
      .collect::<Vec<_>>()
      .join("; ")
}

impl Error {
   pub(crate) fn client(role: Role, action: Action, source: sqlx::Error) -> Self {
      Error::Client {
         role,
         action,
         source,
      }
   }

   /// The innermost error, looking through retry, fallback and transaction wrappers.
   pub fn root(&self) -> &Error {
      match self {
         Error::MaxRetriesExceeded { source, .. } | Error::FallbackExhausted { source, .. } => {
            source.root()
         }
         Error::TransactionFailed(source) => source.root(),
         Error::TransactionRollbackFailed {
            transaction_error, ..
         } => transaction_error.root(),
         other => other,
      }
   }

   /// The database client error at the root of this error, if there is one.
   pub fn as_sqlx(&self) -> Option<&sqlx::Error> {
      match self.root() {
         Error::Client { source, .. } | Error::Sqlx(source) => Some(source),
         _ => None,
      }
   }

   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling. Database
   /// errors carry their SQLSTATE, e.g. `PG_23505`.
   pub fn error_code(&self) -> String {
      match self {
         Error::Client { source, .. } | Error::Sqlx(source) => {
            if let Some(code) = source.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("PG_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::NoAvailableReplicas => "NO_AVAILABLE_REPLICAS".to_string(),
         Error::MasterOnlyOperation(_) => "MASTER_ONLY_OPERATION".to_string(),
         Error::ConnectionFailed { .. } => "CONNECTION_FAILED".to_string(),
         Error::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED".to_string(),
         Error::FallbackExhausted { .. } => "FALLBACK_EXHAUSTED".to_string(),
         Error::QueryTimeout(_) => "QUERY_TIMEOUT".to_string(),
         Error::Cancelled => "CANCELLED".to_string(),
         Error::TransactionFailed(_) => "TRANSACTION_FAILED".to_string(),
         Error::TransactionRollbackFailed { .. } => "TRANSACTION_ROLLBACK_FAILED".to_string(),
         Error::TransactionAlreadyFinalized => "TRANSACTION_ALREADY_FINALIZED".to_string(),
         Error::NestedTransaction => "NESTED_TRANSACTION".to_string(),
         Error::PingInTransaction => "PING_IN_TRANSACTION".to_string(),
         Error::InvalidConfiguration(_) => "INVALID_CONFIGURATION".to_string(),
         Error::EndpointClosed(_) => "ENDPOINT_CLOSED".to_string(),
         Error::CloseFailed(_) => "CLOSE_FAILED".to_string(),
      }
   }
}
