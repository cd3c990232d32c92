//! Transient/fatal classification shared by fallback and retry

use std::io;

use crate::error::Error;

/// SQLSTATE codes that mean the connection, not the statement, failed.
const TRANSIENT_SQLSTATES: &[&str] = &[
   "08000", // connection_exception
   "08001", // sqlclient_unable_to_establish_sqlconnection
   "08003", // connection_does_not_exist
   "08004", // sqlserver_rejected_establishment_of_sqlconnection
   "08006", // connection_failure
   "08007", // transaction_resolution_unknown
   "08P01", // protocol_violation
   "57P01", // admin_shutdown
   "57P02", // crash_shutdown
   "57P03", // cannot_connect_now
   "53300", // too_many_connections
];

const TRANSIENT_MESSAGES: &[&str] = &["connection refused", "connection reset by peer"];

/// Whether an error is worth another endpoint or another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
   /// Connection-level failure; retrying or falling back may succeed.
   Transient,
   /// Propagate immediately.
   Fatal,
}

impl ErrorClass {
   /// Classify an optional error. No error is never retried.
   pub fn of(err: Option<&Error>) -> Self {
      err.map_or(ErrorClass::Fatal, classify)
   }

   pub fn is_transient(self) -> bool {
      self == ErrorClass::Transient
   }
}

/// Classify a router error, looking through client and orchestration wrappers.
pub fn classify(err: &Error) -> ErrorClass {
   match err {
      Error::Client { source, .. } | Error::Sqlx(source) => classify_sqlx(source),
      Error::MaxRetriesExceeded { source, .. } | Error::FallbackExhausted { source, .. } => {
         classify(source)
      }
      Error::ConnectionFailed {
         source: sqlx_pg_conn_mgr::Error::Sqlx(source),
         ..
      } => classify_sqlx(source),
      Error::QueryTimeout(_) => ErrorClass::Transient,
      _ => ErrorClass::Fatal,
   }
}

/// Classify an error reported by the database client.
pub fn classify_sqlx(err: &sqlx::Error) -> ErrorClass {
   let transient = match err {
      sqlx::Error::Io(io_err) => {
         is_transient_io(io_err.kind()) || has_transient_message(&io_err.to_string())
      }
      sqlx::Error::PoolTimedOut => true,
      sqlx::Error::Database(db_err) => {
         db_err
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref()))
            || has_transient_message(db_err.message())
      }
      other => has_transient_message(&other.to_string()),
   };

   if transient {
      ErrorClass::Transient
   } else {
      ErrorClass::Fatal
   }
}

pub fn is_transient(err: &Error) -> bool {
   classify(err).is_transient()
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
   matches!(
      kind,
      io::ErrorKind::ConnectionRefused
         | io::ErrorKind::ConnectionReset
         | io::ErrorKind::ConnectionAborted
         | io::ErrorKind::BrokenPipe
         | io::ErrorKind::NotConnected
         | io::ErrorKind::TimedOut
   )
}

fn has_transient_message(message: &str) -> bool {
   let message = message.to_ascii_lowercase();
   TRANSIENT_MESSAGES
      .iter()
      .any(|needle| message.contains(needle))
}

#[cfg(test)]
mod tests {
   use std::borrow::Cow;
   use std::fmt;

   use sqlx::error::{DatabaseError, ErrorKind};

   use super::*;
   use crate::error::Action;
   use crate::role::Role;

   #[derive(Debug)]
   struct CodedError {
      code: &'static str,
      message: &'static str,
   }

   impl fmt::Display for CodedError {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
         f.write_str(self.message)
      }
   }

   impl std::error::Error for CodedError {}

   impl DatabaseError for CodedError {
      fn message(&self) -> &str {
         self.message
      }

      fn code(&self) -> Option<Cow<'_, str>> {
         Some(Cow::Borrowed(self.code))
      }

      fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
         self
      }

      fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
         self
      }

      fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
         self
      }

      fn kind(&self) -> ErrorKind {
         ErrorKind::Other
      }
   }

   fn db_error(code: &'static str, message: &'static str) -> sqlx::Error {
      sqlx::Error::Database(Box::new(CodedError { code, message }))
   }

   fn io_error(kind: io::ErrorKind) -> sqlx::Error {
      sqlx::Error::Io(io::Error::from(kind))
   }

   #[test]
   fn test_connection_io_errors_are_transient() {
      for kind in [
         io::ErrorKind::ConnectionRefused,
         io::ErrorKind::ConnectionReset,
         io::ErrorKind::BrokenPipe,
         io::ErrorKind::TimedOut,
      ] {
         assert_eq!(classify_sqlx(&io_error(kind)), ErrorClass::Transient, "{kind:?}");
      }
      assert_eq!(
         classify_sqlx(&io_error(io::ErrorKind::PermissionDenied)),
         ErrorClass::Fatal
      );
   }

   #[test]
   fn test_sqlstate_classes() {
      assert!(classify_sqlx(&db_error("08006", "connection failure")).is_transient());
      assert!(classify_sqlx(&db_error("57P01", "terminating connection")).is_transient());
      assert!(classify_sqlx(&db_error("53300", "too many clients")).is_transient());

      assert_eq!(
         classify_sqlx(&db_error("23505", "duplicate key value")),
         ErrorClass::Fatal
      );
      assert_eq!(
         classify_sqlx(&db_error("42601", "syntax error at or near \"SELEC\"")),
         ErrorClass::Fatal
      );
   }

   #[test]
   fn test_message_fallback() {
      let err = sqlx::Error::Protocol("read failed: Connection reset by peer".into());
      assert!(classify_sqlx(&err).is_transient());

      let err = sqlx::Error::Protocol("unexpected message".into());
      assert_eq!(classify_sqlx(&err), ErrorClass::Fatal);
   }

   #[test]
   fn test_pool_timeout_is_transient() {
      assert!(classify_sqlx(&sqlx::Error::PoolTimedOut).is_transient());
      assert_eq!(classify_sqlx(&sqlx::Error::RowNotFound), ErrorClass::Fatal);
   }

   #[test]
   fn test_wrappers_are_looked_through() {
      let refused = Error::client(
         Role::AsyncReplica,
         Action::Query,
         io_error(io::ErrorKind::ConnectionRefused),
      );
      assert!(is_transient(&refused));

      let wrapped = Error::MaxRetriesExceeded {
         attempts: 2,
         source: Box::new(Error::FallbackExhausted {
            attempted: vec![Role::AsyncReplica],
            source: Box::new(refused),
         }),
      };
      assert!(is_transient(&wrapped));

      let constraint = Error::client(Role::Primary, Action::Exec, db_error("23505", "duplicate"));
      assert!(!is_transient(&constraint));
   }

   #[test]
   fn test_router_sentinels() {
      assert!(is_transient(&Error::QueryTimeout(Role::Primary)));

      for err in [
         Error::MasterOnlyOperation(Role::SyncReplica),
         Error::NoAvailableReplicas,
         Error::Cancelled,
         Error::EndpointClosed(Role::Primary),
      ] {
         assert_eq!(classify(&err), ErrorClass::Fatal, "{err}");
      }
   }

   #[test]
   fn test_no_error_is_fatal() {
      assert_eq!(ErrorClass::of(None), ErrorClass::Fatal);
      assert_eq!(
         ErrorClass::of(Some(&Error::QueryTimeout(Role::Primary))),
         ErrorClass::Transient
      );
   }
}
