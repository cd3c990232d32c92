//! Retrying handles for replica roles

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use sqlx_pg_conn_mgr::{CommandTag, DatabaseClient, PgDatabase, Row, Rows, TxOptions};

use crate::context::QueryContext;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::role::Role;
use crate::router::Topology;
use crate::transaction::Transaction;

/// A replica role as seen by callers
///
/// `exec`, `query`, `query_row` and `ping` go through the retry controller
/// over a chain that starts at this replica and degrades toward the primary.
/// Since the replica itself is always the first candidate, `exec` fails with
/// [`Error::MasterOnlyOperation`](crate::Error::MasterOnlyOperation) and is
/// never retried. When replica fallback is disabled the chain holds this
/// replica alone.
pub struct ReplicaHandle<C: DatabaseClient = PgDatabase> {
   endpoint: Arc<Endpoint<C>>,
   topology: Arc<Topology<C>>,
}

impl<C: DatabaseClient> Clone for ReplicaHandle<C> {
   fn clone(&self) -> Self {
      Self {
         endpoint: Arc::clone(&self.endpoint),
         topology: Arc::clone(&self.topology),
      }
   }
}

impl<C: DatabaseClient> fmt::Debug for ReplicaHandle<C> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("ReplicaHandle")
         .field("role", &self.role())
         .finish_non_exhaustive()
   }
}

impl<C: DatabaseClient> ReplicaHandle<C> {
   pub(crate) fn new(endpoint: Arc<Endpoint<C>>, topology: Arc<Topology<C>>) -> Self {
      Self { endpoint, topology }
   }

   pub fn role(&self) -> Role {
      self.endpoint.role()
   }

   /// This replica's own endpoint, without retry or fallback.
   pub fn endpoint(&self) -> &Endpoint<C> {
      &self.endpoint
   }

   pub async fn exec(&self, ctx: &QueryContext, sql: &str, args: &[JsonValue]) -> Result<CommandTag> {
      let chain = self.topology.read_chain(self.role());
      self
         .topology
         .retry
         .run_with_retry(ctx, &chain, |endpoint| async move {
            endpoint.exec(ctx, sql, args).await
         })
         .await
   }

   pub async fn query(&self, ctx: &QueryContext, sql: &str, args: &[JsonValue]) -> Result<Rows> {
      let chain = self.topology.read_chain(self.role());
      self
         .topology
         .retry
         .run_with_retry(ctx, &chain, |endpoint| async move {
            endpoint.query(ctx, sql, args).await
         })
         .await
   }

   pub async fn query_row(
      &self,
      ctx: &QueryContext,
      sql: &str,
      args: &[JsonValue],
   ) -> Result<Option<Row>> {
      let chain = self.topology.read_chain(self.role());
      self
         .topology
         .retry
         .run_with_retry(ctx, &chain, |endpoint| async move {
            endpoint.query_row(ctx, sql, args).await
         })
         .await
   }

   pub async fn ping(&self, ctx: &QueryContext) -> Result<()> {
      let chain = self.topology.read_chain(self.role());
      self
         .topology
         .retry
         .run_with_retry(ctx, &chain, |endpoint| async move { endpoint.ping(ctx).await })
         .await
   }

   /// Always fails with `MasterOnlyOperation`.
   pub async fn begin(&self, ctx: &QueryContext) -> Result<Transaction<C>> {
      self.endpoint.begin(ctx).await
   }

   /// Always fails with `MasterOnlyOperation`.
   pub async fn begin_tx(&self, ctx: &QueryContext, options: &TxOptions) -> Result<Transaction<C>> {
      self.endpoint.begin_tx(ctx, options).await
   }

   /// Close this replica's endpoint. Other roles are unaffected.
   pub async fn close(&self, ctx: &QueryContext) -> Result<()> {
      self.endpoint.close(ctx).await
   }
}
