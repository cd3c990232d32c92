//! Bounded retry around the fallback loop

use std::future::Future;
use std::sync::Arc;

use sqlx_pg_conn_mgr::DatabaseClient;
use tracing::warn;

use crate::classify::is_transient;
use crate::config::{RetryPolicy, saturating_u64};
use crate::context::QueryContext;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::fallback::{FallbackChain, run_with_fallback};
use crate::role::Role;
use crate::telemetry::Telemetry;

/// Repeats whole fallback passes while they fail transiently.
///
/// Performs at most `max_retries + 1` passes with a fixed `retry_delay`
/// between them. Fatal errors end the loop at once. Each delay that actually
/// elapses is counted in [`Telemetry`] as one retry.
#[derive(Debug, Clone)]
pub struct RetryController {
   policy: RetryPolicy,
   telemetry: Arc<Telemetry>,
}

impl RetryController {
   pub fn new(policy: RetryPolicy, telemetry: Arc<Telemetry>) -> Self {
      Self { policy, telemetry }
   }

   pub fn policy(&self) -> &RetryPolicy {
      &self.policy
   }

   /// Run `operation` over `chain`, retrying transient failures
   ///
   /// The delay between passes ends early when `ctx` is cancelled
   /// ([`Error::Cancelled`]) or its deadline passes
   /// ([`Error::QueryTimeout`]).
   pub async fn run_with_retry<C, T, F, Fut>(
      &self,
      ctx: &QueryContext,
      chain: &FallbackChain<C>,
      operation: F,
   ) -> Result<T>
   where
      C: DatabaseClient,
      F: Fn(Arc<Endpoint<C>>) -> Fut,
      Fut: Future<Output = Result<T>>,
   {
      let attempts = self.policy.attempts();
      let mut attempt = 1;

      loop {
         let err = match run_with_fallback(chain, &self.telemetry, &operation).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
         };

         if !is_transient(&err) {
            return Err(err);
         }

         if attempt >= attempts {
            return Err(Error::MaxRetriesExceeded {
               attempts,
               source: Box::new(err),
            });
         }

         warn!(
            attempt,
            attempts,
            error = %err,
            delay_ms = saturating_u64(self.policy.retry_delay.as_millis()),
            "transient failure, retrying"
         );

         let role = chain.first_role().unwrap_or(Role::Primary);
         ctx.sleep(self.policy.retry_delay)
            .await
            .map_err(|interrupted| interrupted.into_error(role))?;

         self.telemetry.record_retry();
         attempt += 1;
      }
   }
}
