//! Cancellation and deadlines for routed operations

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::role::Role;

/// Why a context stopped a future before it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
   Cancelled,
   DeadlineExceeded,
}

impl Interrupted {
   pub(crate) fn into_error(self, role: Role) -> Error {
      match self {
         Interrupted::Cancelled => Error::Cancelled,
         Interrupted::DeadlineExceeded => Error::QueryTimeout(role),
      }
   }
}

/// Cancellation token plus an optional deadline, passed to every routed call.
///
/// Contexts are cheap to clone. Clones share the cancellation token, so
/// cancelling any clone cancels them all.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sqlx_pg_router::QueryContext;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ctx = QueryContext::new().with_timeout(Duration::from_secs(2));
/// assert!(ctx.deadline().is_some());
/// assert!(!ctx.is_cancelled());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
   token: CancellationToken,
   deadline: Option<Instant>,
}

impl QueryContext {
   /// A context that is never cancelled and has no deadline.
   pub fn new() -> Self {
      Self::default()
   }

   /// Bound the context to finish within `timeout` from now.
   ///
   /// An earlier deadline that is already set is kept.
   ///
   /// Must be called inside a tokio runtime.
   pub fn with_timeout(self, timeout: Duration) -> Self {
      let deadline = Instant::now() + timeout;
      self.with_deadline(deadline)
   }

   /// Bound the context by an absolute deadline, never extending an earlier one.
   pub fn with_deadline(mut self, deadline: Instant) -> Self {
      self.deadline = Some(match self.deadline {
         Some(current) => current.min(deadline),
         None => deadline,
      });
      self
   }

   /// Use a caller-owned cancellation token.
   pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
      self.token = token;
      self
   }

   pub fn cancellation_token(&self) -> &CancellationToken {
      &self.token
   }

   pub fn cancel(&self) {
      self.token.cancel();
   }

   pub fn is_cancelled(&self) -> bool {
      self.token.is_cancelled()
   }

   pub fn deadline(&self) -> Option<Instant> {
      self.deadline
   }

   /// Derive a context that also honours a per-operation timeout.
   pub(crate) fn bounded(&self, timeout: Option<Duration>) -> Self {
      match timeout {
         Some(timeout) => self.clone().with_timeout(timeout),
         None => self.clone(),
      }
   }

   /// Drive `fut` to completion unless the context is cancelled or expires first.
   ///
   /// Cancellation wins over an expired deadline, which wins over a ready future.
   pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
      let deadline = async {
         match self.deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
         }
      };

      tokio::select! {
         biased;
         _ = self.token.cancelled() => Err(Interrupted::Cancelled),
         _ = deadline => Err(Interrupted::DeadlineExceeded),
         output = fut => Ok(output),
      }
   }

   /// Sleep for `delay`, waking early on cancellation or deadline.
   pub(crate) async fn sleep(&self, delay: Duration) -> Result<(), Interrupted> {
      self.run(tokio::time::sleep(delay)).await
   }
}
