//! Ordered endpoint candidates and the single-pass fallback loop

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use sqlx_pg_conn_mgr::{DatabaseClient, PgDatabase};
use tracing::info;

use crate::classify::{ErrorClass, classify};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::role::Role;
use crate::telemetry::Telemetry;

/// Endpoints one logical operation may be tried on, in order.
///
/// Chains are built fresh for every call from whichever endpoints are
/// configured at that moment.
pub struct FallbackChain<C: DatabaseClient = PgDatabase> {
   endpoints: Vec<Arc<Endpoint<C>>>,
   pinned: bool,
}

impl<C: DatabaseClient> fmt::Debug for FallbackChain<C> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("FallbackChain")
         .field("roles", &self.roles())
         .field("pinned", &self.pinned)
         .finish()
   }
}

impl<C: DatabaseClient> FallbackChain<C> {
   /// Chain for a read starting at `start` and degrading toward the primary.
   ///
   /// Roles that `lookup` cannot resolve are skipped. With fallback disabled
   /// the chain is pinned to the async replica whatever `start` is, and is
   /// empty when there is no async replica.
   pub fn for_reads<F>(start: Role, fallback_enabled: bool, lookup: F) -> Self
   where
      F: Fn(Role) -> Option<Arc<Endpoint<C>>>,
   {
      if !fallback_enabled {
         return Self::pinned(lookup(Role::AsyncReplica));
      }

      Self {
         endpoints: start
            .read_fallback_order()
            .iter()
            .filter_map(|role| lookup(*role))
            .collect(),
         pinned: false,
      }
   }

   /// Chain for writes and transactions: the primary and nothing else.
   pub fn primary_only(primary: Arc<Endpoint<C>>) -> Self {
      Self {
         endpoints: vec![primary],
         pinned: false,
      }
   }

   /// A single fixed candidate whose error is returned unwrapped.
   pub fn pinned(endpoint: Option<Arc<Endpoint<C>>>) -> Self {
      Self {
         endpoints: endpoint.into_iter().collect(),
         pinned: true,
      }
   }

   pub fn roles(&self) -> Vec<Role> {
      self.endpoints.iter().map(|e| e.role()).collect()
   }

   /// Role of the first candidate, if any
   pub fn first_role(&self) -> Option<Role> {
      self.endpoints.first().map(|e| e.role())
   }

   pub fn is_pinned(&self) -> bool {
      self.pinned
   }

   pub fn len(&self) -> usize {
      self.endpoints.len()
   }

   pub fn is_empty(&self) -> bool {
      self.endpoints.is_empty()
   }
}

/// Run `operation` on each candidate in turn until one succeeds.
///
/// Every endpoint is invoked at most once. A fatal error is returned as soon
/// as it happens; transient errors move on to the next candidate. When all
/// candidates failed transiently the last error is wrapped in
/// [`Error::FallbackExhausted`]. An empty chain yields
/// [`Error::NoAvailableReplicas`].
pub async fn run_with_fallback<C, T, F, Fut>(
   chain: &FallbackChain<C>,
   telemetry: &Telemetry,
   operation: F,
) -> Result<T>
where
   C: DatabaseClient,
   F: Fn(Arc<Endpoint<C>>) -> Fut,
   Fut: Future<Output = Result<T>>,
{
   if chain.pinned {
      let Some(endpoint) = chain.endpoints.first() else {
         return Err(Error::NoAvailableReplicas);
      };
      return operation(Arc::clone(endpoint)).await;
   }

   let mut attempted = Vec::with_capacity(chain.len());
   let mut last_err = None;

   for endpoint in &chain.endpoints {
      let err = match operation(Arc::clone(endpoint)).await {
         Ok(value) => return Ok(value),
         Err(err) => err,
      };

      telemetry.record_error();

      if classify(&err) == ErrorClass::Fatal {
         return Err(err);
      }

      info!(
         role = %endpoint.role(),
         error = %err,
         "operation failed on {}, trying the next endpoint",
         endpoint.role()
      );
      attempted.push(endpoint.role());
      last_err = Some(err);
   }

   match last_err {
      Some(source) => Err(Error::FallbackExhausted {
         attempted,
         source: Box::new(source),
      }),
      None => Err(Error::NoAvailableReplicas),
   }
}
