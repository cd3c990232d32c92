//! Transactions pinned to the primary

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx_pg_conn_mgr::{ClientTransaction, CommandTag, DatabaseClient, PgDatabase, Row, Rows, TxOptions};
use tracing::{debug, warn};

use crate::context::QueryContext;
use crate::endpoint::observe;
use crate::error::{Action, Error, Result};
use crate::role::Role;
use crate::telemetry::Telemetry;

/// Lifecycle of a [`Transaction`]. `Committed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
   Open,
   Committed,
   RolledBack,
}

/// A transaction on one primary connection
///
/// Transactions are never retried and never fall back to another endpoint:
/// the server-side state lives on a single connection. Statements run on
/// that connection until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) finishes it. Dropping an open transaction
/// discards its connection, which makes the server roll it back.
#[must_use = "if unused, the transaction is immediately rolled back"]
pub struct Transaction<C: DatabaseClient = PgDatabase> {
   inner: Option<C::Transaction>,
   state: TransactionState,
   telemetry: Arc<Telemetry>,
   query_timeout: Option<Duration>,
}

impl<C: DatabaseClient> fmt::Debug for Transaction<C> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Transaction")
         .field("state", &self.state)
         .finish_non_exhaustive()
   }
}

impl<C: DatabaseClient> Drop for Transaction<C> {
   fn drop(&mut self) {
      if self.inner.is_some() {
         warn!("transaction dropped while open, rolling back");
      }
   }
}

impl<C: DatabaseClient> Transaction<C> {
   pub(crate) fn new(
      inner: C::Transaction,
      telemetry: Arc<Telemetry>,
      query_timeout: Option<Duration>,
   ) -> Self {
      Self {
         inner: Some(inner),
         state: TransactionState::Open,
         telemetry,
         query_timeout,
      }
   }

   pub fn state(&self) -> TransactionState {
      self.state
   }

   pub fn is_open(&self) -> bool {
      self.state == TransactionState::Open
   }

   pub async fn exec(&mut self, ctx: &QueryContext, sql: &str, args: &[JsonValue]) -> Result<CommandTag> {
      let ctx = ctx.bounded(self.query_timeout);
      let inner = self
         .inner
         .as_mut()
         .ok_or(Error::TransactionAlreadyFinalized)?;
      observe(
         &self.telemetry,
         &ctx,
         Role::Primary,
         Action::Exec,
         sql,
         inner.exec(sql, args),
      )
      .await
   }

   pub async fn query(&mut self, ctx: &QueryContext, sql: &str, args: &[JsonValue]) -> Result<Rows> {
      let ctx = ctx.bounded(self.query_timeout);
      let inner = self
         .inner
         .as_mut()
         .ok_or(Error::TransactionAlreadyFinalized)?;
      observe(
         &self.telemetry,
         &ctx,
         Role::Primary,
         Action::Query,
         sql,
         inner.query(sql, args),
      )
      .await
   }

   pub async fn query_row(
      &mut self,
      ctx: &QueryContext,
      sql: &str,
      args: &[JsonValue],
   ) -> Result<Option<Row>> {
      let ctx = ctx.bounded(self.query_timeout);
      let inner = self
         .inner
         .as_mut()
         .ok_or(Error::TransactionAlreadyFinalized)?;
      observe(
         &self.telemetry,
         &ctx,
         Role::Primary,
         Action::QueryRow,
         sql,
         inner.query_row(sql, args),
      )
      .await
   }

   /// Commit the transaction
   ///
   /// A failed or interrupted commit leaves the transaction rolled back: the
   /// client discards the connection, so the server aborts it.
   pub async fn commit(&mut self, ctx: &QueryContext) -> Result<()> {
      let inner = self.inner.take().ok_or(Error::TransactionAlreadyFinalized)?;
      self.state = TransactionState::RolledBack;
      let ctx = ctx.bounded(self.query_timeout);

      let result = observe(
         &self.telemetry,
         &ctx,
         Role::Primary,
         Action::Commit,
         "COMMIT",
         inner.commit(),
      )
      .await;

      if result.is_ok() {
         self.state = TransactionState::Committed;
      }
      debug!(state = ?self.state, "transaction finished");
      result
   }

   /// Roll the transaction back
   pub async fn rollback(&mut self, ctx: &QueryContext) -> Result<()> {
      let inner = self.inner.take().ok_or(Error::TransactionAlreadyFinalized)?;
      self.state = TransactionState::RolledBack;
      let ctx = ctx.bounded(self.query_timeout);

      observe(
         &self.telemetry,
         &ctx,
         Role::Primary,
         Action::Rollback,
         "ROLLBACK",
         inner.rollback(),
      )
      .await?;

      debug!("transaction rolled back");
      Ok(())
   }

   /// Always fails: transactions do not nest.
   pub async fn begin(&self, _ctx: &QueryContext) -> Result<Transaction<C>> {
      Err(Error::NestedTransaction)
   }

   /// Always fails: transactions do not nest.
   pub async fn begin_tx(&self, _ctx: &QueryContext, _options: &TxOptions) -> Result<Transaction<C>> {
      Err(Error::NestedTransaction)
   }

   /// Always fails: a transaction's connection is already known to be live.
   pub async fn ping(&self, _ctx: &QueryContext) -> Result<()> {
      Err(Error::PingInTransaction)
   }

   /// Does nothing. Only `commit` and `rollback` finish a transaction.
   pub async fn close(&self, _ctx: &QueryContext) -> Result<()> {
      Ok(())
   }
}
