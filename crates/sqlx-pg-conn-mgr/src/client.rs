//! The client boundary: what a router needs from one physical endpoint

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::rows::{Row, Rows};

/// Result returned from write statements (e.g. INSERT, UPDATE, DELETE).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTag {
   /// The number of rows affected by the statement.
   pub rows_affected: u64,
}

/// Transaction isolation levels understood by PostgreSQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
   ReadUncommitted,
   ReadCommitted,
   RepeatableRead,
   Serializable,
}

impl IsolationLevel {
   fn as_sql(self) -> &'static str {
      match self {
         IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
         IsolationLevel::ReadCommitted => "READ COMMITTED",
         IsolationLevel::RepeatableRead => "REPEATABLE READ",
         IsolationLevel::Serializable => "SERIALIZABLE",
      }
   }
}

/// Options applied when a transaction is started.
///
/// The default starts a transaction with the server's default isolation level
/// in read-write mode.
///
/// # Examples
///
/// ```
/// use sqlx_pg_conn_mgr::{IsolationLevel, TxOptions};
///
/// let options = TxOptions::default()
///     .with_isolation_level(IsolationLevel::Serializable)
///     .with_read_only(true);
///
/// assert_eq!(
///     options.begin_statement(),
///     "BEGIN ISOLATION LEVEL SERIALIZABLE, READ ONLY"
/// );
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxOptions {
   pub isolation_level: Option<IsolationLevel>,
   pub read_only: bool,
   /// Only meaningful for `SERIALIZABLE READ ONLY` transactions.
   pub deferrable: bool,
}

impl TxOptions {
   pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
      self.isolation_level = Some(level);
      self
   }

   pub fn with_read_only(mut self, read_only: bool) -> Self {
      self.read_only = read_only;
      self
   }

   pub fn with_deferrable(mut self, deferrable: bool) -> Self {
      self.deferrable = deferrable;
      self
   }

   /// The `BEGIN` statement that opens a transaction with these options.
   pub fn begin_statement(&self) -> String {
      let mut modes = Vec::new();
      if let Some(level) = self.isolation_level {
         modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
      }
      if self.read_only {
         modes.push("READ ONLY".to_string());
      }
      if self.deferrable {
         modes.push("DEFERRABLE".to_string());
      }

      if modes.is_empty() {
         "BEGIN".to_string()
      } else {
         format!("BEGIN {}", modes.join(", "))
      }
   }
}

/// Operations a router performs against one physical database endpoint.
///
/// Implementations own whatever connections they need; callers never see
/// them. Errors stay `sqlx::Error` so that higher layers can decide whether a
/// failure is worth retrying.
///
/// Returned futures are `Send` so routed operations can run on a
/// multi-threaded runtime.
pub trait DatabaseClient: Send + Sync + 'static {
   /// Transaction handle produced by [`begin`](Self::begin).
   type Transaction: ClientTransaction;

   /// Execute a statement that does not return rows.
   fn exec(
      &self,
      sql: &str,
      args: &[JsonValue],
   ) -> impl Future<Output = Result<CommandTag, sqlx::Error>> + Send;

   /// Run a query and buffer every row it returns.
   fn query(
      &self,
      sql: &str,
      args: &[JsonValue],
   ) -> impl Future<Output = Result<Rows, sqlx::Error>> + Send;

   /// Run a query and return its first row, if any.
   fn query_row(
      &self,
      sql: &str,
      args: &[JsonValue],
   ) -> impl Future<Output = Result<Option<Row>, sqlx::Error>> + Send;

   /// Open a transaction pinned to one connection.
   fn begin(
      &self,
      options: &TxOptions,
   ) -> impl Future<Output = Result<Self::Transaction, sqlx::Error>> + Send;

   /// Check that the endpoint answers.
   fn ping(&self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

   /// Release every connection held for this endpoint.
   fn close(&self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// A transaction opened by a [`DatabaseClient`].
///
/// `commit` and `rollback` consume the handle. Dropping an open handle must
/// not leave the transaction running on a reusable connection.
pub trait ClientTransaction: Send + 'static {
   fn exec(
      &mut self,
      sql: &str,
      args: &[JsonValue],
   ) -> impl Future<Output = Result<CommandTag, sqlx::Error>> + Send;

   fn query(
      &mut self,
      sql: &str,
      args: &[JsonValue],
   ) -> impl Future<Output = Result<Rows, sqlx::Error>> + Send;

   fn query_row(
      &mut self,
      sql: &str,
      args: &[JsonValue],
   ) -> impl Future<Output = Result<Option<Row>, sqlx::Error>> + Send;

   fn commit(self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

   fn rollback(self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}
