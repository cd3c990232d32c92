//! Role-gated wrapper around one database client

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value as JsonValue;
use sqlx_pg_conn_mgr::{CommandTag, DatabaseClient, PgDatabase, Row, Rows, TxOptions};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::context::QueryContext;
use crate::error::{Action, Error, Result};
use crate::role::Role;
use crate::telemetry::Telemetry;
use crate::transaction::Transaction;

/// One physical endpoint of the topology, tagged with its [`Role`].
///
/// Writes and transaction starts are only accepted when the role is
/// [`Role::Primary`]; on replicas they fail with
/// [`Error::MasterOnlyOperation`] before the client is touched. Every call
/// that reaches the client is bounded by the configured query timeout and
/// recorded in the shared [`Telemetry`].
#[derive(Debug)]
pub struct Endpoint<C: DatabaseClient = PgDatabase> {
   role: Role,
   client: C,
   telemetry: Arc<Telemetry>,
   query_timeout: Option<Duration>,
   closed: AtomicBool,
}

impl<C: DatabaseClient> Endpoint<C> {
   pub fn new(
      role: Role,
      client: C,
      telemetry: Arc<Telemetry>,
      query_timeout: Option<Duration>,
   ) -> Self {
      Self {
         role,
         client,
         telemetry,
         query_timeout,
         closed: AtomicBool::new(false),
      }
   }

   pub fn role(&self) -> Role {
      self.role
   }

   /// The wrapped database client
   pub fn client(&self) -> &C {
      &self.client
   }

   pub fn is_closed(&self) -> bool {
      self.closed.load(Ordering::SeqCst)
   }

   fn ensure_open(&self) -> Result<()> {
      if self.is_closed() {
         return Err(Error::EndpointClosed(self.role));
      }
      Ok(())
   }

   fn ensure_primary(&self) -> Result<()> {
      if !self.role.is_primary() {
         return Err(Error::MasterOnlyOperation(self.role));
      }
      Ok(())
   }

   /// Execute a statement that changes data. Primary only.
   pub async fn exec(&self, ctx: &QueryContext, sql: &str, args: &[JsonValue]) -> Result<CommandTag> {
      self.ensure_primary()?;
      self.ensure_open()?;

      let ctx = ctx.bounded(self.query_timeout);
      observe(
         &self.telemetry,
         &ctx,
         self.role,
         Action::Exec,
         sql,
         self.client.exec(sql, args),
      )
      .await
   }

   pub async fn query(&self, ctx: &QueryContext, sql: &str, args: &[JsonValue]) -> Result<Rows> {
      self.ensure_open()?;

      let ctx = ctx.bounded(self.query_timeout);
      observe(
         &self.telemetry,
         &ctx,
         self.role,
         Action::Query,
         sql,
         self.client.query(sql, args),
      )
      .await
   }

   pub async fn query_row(
      &self,
      ctx: &QueryContext,
      sql: &str,
      args: &[JsonValue],
   ) -> Result<Option<Row>> {
      self.ensure_open()?;

      let ctx = ctx.bounded(self.query_timeout);
      observe(
         &self.telemetry,
         &ctx,
         self.role,
         Action::QueryRow,
         sql,
         self.client.query_row(sql, args),
      )
      .await
   }

   /// Start a transaction with default options. Primary only.
   pub async fn begin(&self, ctx: &QueryContext) -> Result<Transaction<C>> {
      self.begin_tx(ctx, &TxOptions::default()).await
   }

   /// Start a transaction. Primary only.
   pub async fn begin_tx(&self, ctx: &QueryContext, options: &TxOptions) -> Result<Transaction<C>> {
      self.ensure_primary()?;
      self.ensure_open()?;

      let ctx = ctx.bounded(self.query_timeout);
      let inner = observe(
         &self.telemetry,
         &ctx,
         self.role,
         Action::Begin,
         "",
         self.client.begin(options),
      )
      .await?;

      Ok(Transaction::new(
         inner,
         Arc::clone(&self.telemetry),
         self.query_timeout,
      ))
   }

   /// Check the endpoint answers. Failures count as connection errors.
   pub async fn ping(&self, ctx: &QueryContext) -> Result<()> {
      self.ensure_open()?;

      let ctx = ctx.bounded(self.query_timeout);
      observe(
         &self.telemetry,
         &ctx,
         self.role,
         Action::Ping,
         "",
         self.client.ping(),
      )
      .await
   }

   /// Close the client
   ///
   /// Once the client's close has run, later calls return `Ok` without
   /// reaching it. A close interrupted by `ctx` leaves the endpoint open so
   /// that it can be closed again.
   pub async fn close(&self, ctx: &QueryContext) -> Result<()> {
      if self.closed.swap(true, Ordering::SeqCst) {
         return Ok(());
      }

      let ctx = ctx.bounded(self.query_timeout);
      let result = observe(
         &self.telemetry,
         &ctx,
         self.role,
         Action::Close,
         "",
         self.client.close(),
      )
      .await;

      if let Err(Error::Cancelled | Error::QueryTimeout(_)) = &result {
         self.closed.store(false, Ordering::SeqCst);
      }
      result?;

      debug!(role = %self.role, "endpoint closed");
      Ok(())
   }
}

/// Run one client call under `ctx`, recording its outcome.
///
/// Durations are recorded for statements and transaction control, not for
/// ping or close. A failed ping counts as a connection error, any other
/// failure as an error.
pub(crate) async fn observe<T, F>(
   telemetry: &Telemetry,
   ctx: &QueryContext,
   role: Role,
   action: Action,
   sql: &str,
   fut: F,
) -> Result<T>
where
   F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
   let started = Instant::now();

   let result = match ctx.run(fut).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(e)) => Err(Error::client(role, action, e)),
      Err(interrupted) => Err(interrupted.into_error(role)),
   };

   if !matches!(action, Action::Ping | Action::Close) {
      telemetry.record_query(started.elapsed());
   }

   match &result {
      Ok(_) => debug!(role = %role, sql, "{action} succeeded"),
      Err(e) => {
         if action == Action::Ping {
            telemetry.record_connection_error();
         } else {
            telemetry.record_error();
         }
         error!(role = %role, sql, error = %e, "{action} failed");
      }
   }

   result
}
