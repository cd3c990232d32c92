//! Session facade over the primary and its replicas

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value as JsonValue;
use sqlx_pg_conn_mgr::{DatabaseClient, PgDatabase, Rows, TxOptions};
use tracing::{debug, info, warn};

use crate::config::{RouterConfig, non_empty};
use crate::context::QueryContext;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::fallback::{FallbackChain, run_with_fallback};
use crate::replica::ReplicaHandle;
use crate::retry::RetryController;
use crate::role::Role;
use crate::telemetry::{Telemetry, TelemetrySnapshot};
use crate::transaction::Transaction;

/// Endpoints and policies shared by a router and its replica handles.
pub(crate) struct Topology<C: DatabaseClient> {
   pub(crate) primary: Arc<Endpoint<C>>,
   pub(crate) sync_replica: Option<Arc<Endpoint<C>>>,
   pub(crate) async_replica: Option<Arc<Endpoint<C>>>,
   pub(crate) retry: RetryController,
   pub(crate) telemetry: Arc<Telemetry>,
   pub(crate) fallback_enabled: bool,
}

impl<C: DatabaseClient> Topology<C> {
   pub(crate) fn endpoint(&self, role: Role) -> Option<&Arc<Endpoint<C>>> {
      match role {
         Role::Primary => Some(&self.primary),
         Role::SyncReplica => self.sync_replica.as_ref(),
         Role::AsyncReplica => self.async_replica.as_ref(),
      }
   }

   /// Fresh read chain starting at `start`.
   pub(crate) fn read_chain(&self, start: Role) -> FallbackChain<C> {
      FallbackChain::for_reads(start, self.fallback_enabled, |role| {
         self.endpoint(role).cloned()
      })
   }
}

/// Routes operations across a primary and up to two replicas
///
/// The primary is used directly for writes and transactions. Reads through
/// a [`ReplicaHandle`] or [`execute_read_query`](Self::execute_read_query)
/// start at a replica, fall back toward the primary on connection failures,
/// and are retried with a fixed delay while every candidate keeps failing
/// transiently.
///
/// `Router` is cheap to clone; clones share endpoints and telemetry.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use sqlx_pg_router::{QueryContext, Router, RouterConfig};
///
/// # async fn example() -> sqlx_pg_router::Result<()> {
/// let config = RouterConfig::new("postgres://app@primary/app")
///     .with_async_replica("postgres://app@replica-1/app");
/// let router = Router::connect(config).await?;
/// let ctx = QueryContext::new();
///
/// router
///     .primary()
///     .exec(&ctx, "INSERT INTO users (name) VALUES ($1)", &[json!("Alice")])
///     .await?;
///
/// if let Some(replica) = router.async_replica() {
///     let rows = replica.query(&ctx, "SELECT id, name FROM users", &[]).await?;
///     println!("{} users", rows.len());
/// }
///
/// router.close(&ctx).await?;
/// # Ok(())
/// # }
/// ```
pub struct Router<C: DatabaseClient = PgDatabase> {
   topology: Arc<Topology<C>>,
}

impl<C: DatabaseClient> Clone for Router<C> {
   fn clone(&self) -> Self {
      Self {
         topology: Arc::clone(&self.topology),
      }
   }
}

impl<C: DatabaseClient> fmt::Debug for Router<C> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Router")
         .field("sync_replica", &self.topology.sync_replica.is_some())
         .field("async_replica", &self.topology.async_replica.is_some())
         .field("fallback_enabled", &self.topology.fallback_enabled)
         .field("retry_policy", self.topology.retry.policy())
         .finish()
   }
}

impl Router<PgDatabase> {
   /// Connect every configured role
   ///
   /// Replica roles whose connection string is empty are left out. Any
   /// configured role that cannot be reached fails the whole call with
   /// [`Error::ConnectionFailed`].
   pub async fn connect(config: RouterConfig) -> Result<Self> {
      config.validate()?;

      let primary = connect_role(Role::Primary, &config.primary_url, &config).await?;
      let sync_replica = match non_empty(&config.sync_replica_url) {
         Some(url) => Some(connect_role(Role::SyncReplica, url, &config).await?),
         None => None,
      };
      let async_replica = match non_empty(&config.async_replica_url) {
         Some(url) => Some(connect_role(Role::AsyncReplica, url, &config).await?),
         None => None,
      };

      Ok(Self::from_clients(&config, primary, sync_replica, async_replica))
   }
}

async fn connect_role(role: Role, url: &str, config: &RouterConfig) -> Result<PgDatabase> {
   let db = PgDatabase::connect(url, Some(config.pool.clone()))
      .await
      .map_err(|source| Error::ConnectionFailed { role, source })?;
   debug!(role = %role, "connected");
   Ok(db)
}

impl<C: DatabaseClient> Router<C> {
   /// Build a router from already-connected clients
   ///
   /// Connection strings in `config` are ignored; everything else applies.
   pub fn from_clients(
      config: &RouterConfig,
      primary: C,
      sync_replica: Option<C>,
      async_replica: Option<C>,
   ) -> Self {
      let telemetry = Arc::new(Telemetry::new(config.enable_telemetry));
      let policy = config.retry_policy();

      let endpoint = |role: Role, client: C| {
         Arc::new(Endpoint::new(
            role,
            client,
            Arc::clone(&telemetry),
            policy.query_timeout,
         ))
      };

      let topology = Topology {
         primary: endpoint(Role::Primary, primary),
         sync_replica: sync_replica.map(|client| endpoint(Role::SyncReplica, client)),
         async_replica: async_replica.map(|client| endpoint(Role::AsyncReplica, client)),
         retry: RetryController::new(policy, Arc::clone(&telemetry)),
         telemetry: Arc::clone(&telemetry),
         fallback_enabled: !config.disable_replica_fallback,
      };

      Self {
         topology: Arc::new(topology),
      }
   }

   /// The primary endpoint, used directly without retry or fallback.
   pub fn primary(&self) -> &Endpoint<C> {
      &self.topology.primary
   }

   /// Retrying handle for the synchronous replica, if one is configured.
   pub fn sync_replica(&self) -> Option<ReplicaHandle<C>> {
      self.replica(Role::SyncReplica)
   }

   /// Retrying handle for the asynchronous replica, if one is configured.
   pub fn async_replica(&self) -> Option<ReplicaHandle<C>> {
      self.replica(Role::AsyncReplica)
   }

   fn replica(&self, role: Role) -> Option<ReplicaHandle<C>> {
      let Some(endpoint) = self.topology.endpoint(role) else {
         info!(role = %role, "{role} is not configured");
         return None;
      };
      Some(ReplicaHandle::new(
         Arc::clone(endpoint),
         Arc::clone(&self.topology),
      ))
   }

   /// Read with retry over `[async replica, sync replica, primary]`.
   pub async fn execute_read_query(
      &self,
      ctx: &QueryContext,
      sql: &str,
      args: &[JsonValue],
   ) -> Result<Rows> {
      let chain = self.topology.read_chain(Role::AsyncReplica);
      self
         .topology
         .retry
         .run_with_retry(ctx, &chain, |endpoint| async move {
            endpoint.query(ctx, sql, args).await
         })
         .await
   }

   /// Read with a single fallback pass and no retry.
   pub async fn execute_read_query_with_fallback(
      &self,
      ctx: &QueryContext,
      sql: &str,
      args: &[JsonValue],
   ) -> Result<Rows> {
      let chain = self.topology.read_chain(Role::AsyncReplica);
      run_with_fallback(&chain, &self.topology.telemetry, |endpoint| async move {
         endpoint.query(ctx, sql, args).await
      })
      .await
   }

   /// Start a transaction on the primary with default options.
   pub async fn begin(&self, ctx: &QueryContext) -> Result<Transaction<C>> {
      self.topology.primary.begin(ctx).await
   }

   /// Start a transaction on the primary. Never retried.
   pub async fn begin_tx(&self, ctx: &QueryContext, options: &TxOptions) -> Result<Transaction<C>> {
      self.topology.primary.begin_tx(ctx, options).await
   }

   /// Run `f` inside a transaction, committing on success
   ///
   /// If `f` fails the transaction is rolled back and `f`'s error returned.
   /// Should the rollback fail too, both errors come back in
   /// [`Error::TransactionRollbackFailed`]. A transaction that `f` already
   /// committed or rolled back is left alone. Failing to begin or to commit
   /// yields [`Error::TransactionFailed`].
   ///
   /// ```no_run
   /// use serde_json::json;
   /// use sqlx_pg_router::{QueryContext, Router, TxOptions};
   ///
   /// # async fn example(router: Router) -> sqlx_pg_router::Result<()> {
   /// let moved = router
   ///     .execute_in_transaction(&QueryContext::new(), &TxOptions::default(), |tx, ctx| {
   ///         Box::pin(async move {
   ///             tx.exec(ctx, "UPDATE accounts SET balance = balance - 10 WHERE id = $1", &[json!(1)])
   ///                 .await?;
   ///             let tag = tx
   ///                 .exec(ctx, "UPDATE accounts SET balance = balance + 10 WHERE id = $1", &[json!(2)])
   ///                 .await?;
   ///             Ok(tag.rows_affected)
   ///         })
   ///     })
   ///     .await?;
   /// # Ok(())
   /// # }
   /// ```
   pub async fn execute_in_transaction<T, F>(
      &self,
      ctx: &QueryContext,
      options: &TxOptions,
      f: F,
   ) -> Result<T>
   where
      F: for<'t> FnOnce(&'t mut Transaction<C>, &'t QueryContext) -> BoxFuture<'t, Result<T>>,
   {
      let mut tx = self
         .begin_tx(ctx, options)
         .await
         .map_err(|e| Error::TransactionFailed(Box::new(e)))?;

      let scoped = ctx.clone();
      match f(&mut tx, &scoped).await {
         Ok(value) => {
            if tx.is_open() {
               tx.commit(ctx)
                  .await
                  .map_err(|e| Error::TransactionFailed(Box::new(e)))?;
            }
            Ok(value)
         }
         Err(transaction_error) => {
            if !tx.is_open() {
               return Err(transaction_error);
            }

            // Roll back even when the caller's context is already done
            match tx.rollback(&QueryContext::new()).await {
               Ok(()) => Err(transaction_error),
               Err(rollback_error) => {
                  warn!(error = %rollback_error, "rollback after failed transaction also failed");
                  Err(Error::TransactionRollbackFailed {
                     transaction_error: Box::new(transaction_error),
                     rollback_error: Box::new(rollback_error),
                  })
               }
            }
         }
      }
   }

   /// [`execute_in_transaction`](Self::execute_in_transaction) with default options.
   pub async fn execute_in_transaction_default<T, F>(&self, ctx: &QueryContext, f: F) -> Result<T>
   where
      F: for<'t> FnOnce(&'t mut Transaction<C>, &'t QueryContext) -> BoxFuture<'t, Result<T>>,
   {
      self
         .execute_in_transaction(ctx, &TxOptions::default(), f)
         .await
   }

   pub fn metrics(&self) -> TelemetrySnapshot {
      self.topology.telemetry.snapshot()
   }

   pub fn log_metrics(&self) {
      self.topology.telemetry.log_metrics();
   }

   pub fn telemetry(&self) -> &Arc<Telemetry> {
      &self.topology.telemetry
   }

   /// Close every endpoint
   ///
   /// All roles are attempted even if some fail; the failures are returned
   /// together in [`Error::CloseFailed`].
   pub async fn close(&self, ctx: &QueryContext) -> Result<()> {
      let endpoints = [
         Some(&self.topology.primary),
         self.topology.sync_replica.as_ref(),
         self.topology.async_replica.as_ref(),
      ];

      let mut errors = Vec::new();
      for endpoint in endpoints.into_iter().flatten() {
         if let Err(e) = endpoint.close(ctx).await {
            errors.push(e);
         }
      }

      if errors.is_empty() {
         Ok(())
      } else {
         Err(Error::CloseFailed(errors))
      }
   }
}
