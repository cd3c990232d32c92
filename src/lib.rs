//! Primary/replica routing for PostgreSQL on top of SQLx.
//!
//! Each operation is sent to the endpoint that should serve it: writes and
//! transactions to the primary, reads to a replica with fallback toward the
//! primary when a replica cannot be reached. Connection-level failures are
//! retried with a fixed delay; everything else is returned at once.
//!
//! - [`Router`]: main entry point holding one [`Endpoint`] per configured [`Role`]
//! - [`ReplicaHandle`]: retrying, falling-back view of one replica
//! - [`Transaction`]: primary-pinned transaction, plus scoped
//!   [`Router::execute_in_transaction`]
//! - [`QueryContext`]: cancellation and deadline carried by every call
//! - [`classify()`]: the transient/fatal rule shared by fallback and retry
//! - [`Telemetry`]: query, error and retry counters
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use serde_json::json;
//! use sqlx_pg_router::{QueryContext, Router, RouterConfig};
//!
//! # async fn example() -> sqlx_pg_router::Result<()> {
//! let config = RouterConfig::new("postgres://app@primary/app")
//!    .with_sync_replica("postgres://app@replica-sync/app")
//!    .with_async_replica("postgres://app@replica-async/app")
//!    .with_max_retries(2)
//!    .with_retry_delay(Duration::from_millis(50));
//!
//! let router = Router::connect(config).await?;
//! let ctx = QueryContext::new().with_timeout(Duration::from_secs(5));
//!
//! // Writes go to the primary
//! router
//!    .primary()
//!    .exec(&ctx, "INSERT INTO users (name) VALUES ($1)", &[json!("Alice")])
//!    .await?;
//!
//! // Reads start at the async replica and fall back toward the primary
//! let rows = router.execute_read_query(&ctx, "SELECT name FROM users", &[]).await?;
//! for row in rows {
//!    println!("{:?}", row.get("name"));
//! }
//!
//! println!("{:?}", router.metrics());
//! router.close(&ctx).await?;
//! # Ok(())
//! # }
//! ```

mod classify;
mod config;
mod context;
mod endpoint;
mod error;
mod fallback;
mod replica;
mod retry;
mod role;
mod router;
mod telemetry;
mod transaction;

pub use classify::{ErrorClass, classify, classify_sqlx, is_transient};
pub use config::{RetryPolicy, RouterConfig};
pub use context::{Interrupted, QueryContext};
pub use endpoint::Endpoint;
pub use error::{Action, Error, Result};
pub use fallback::{FallbackChain, run_with_fallback};
pub use replica::ReplicaHandle;
pub use retry::RetryController;
pub use role::Role;
pub use router::Router;
pub use telemetry::{Telemetry, TelemetrySnapshot};
pub use transaction::{Transaction, TransactionState};

// Re-export the client boundary so callers need only this crate
pub use sqlx_pg_conn_mgr::{
   ClientTransaction, CommandTag, DatabaseClient, IsolationLevel, PgDatabase, PgPoolConfig,
   PgTransaction, Row, Rows, TxOptions,
};
pub use tokio_util::sync::CancellationToken;
