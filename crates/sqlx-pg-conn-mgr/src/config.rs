//! Configuration for PostgreSQL connection pools

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the connection pool behind one `PgDatabase`
///
/// Every role (primary, sync replica, async replica) gets its own pool built
/// from this configuration.
///
/// # Examples
///
/// ```
/// use sqlx_pg_conn_mgr::PgPoolConfig;
///
/// // Use defaults
/// let config = PgPoolConfig::default();
///
/// // Override just one field
/// let config = PgPoolConfig {
///     max_connections: 20,
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgPoolConfig {
   /// Maximum number of connections held open for one role
   ///
   /// Default: 10
   pub max_connections: u32,

   /// Connections kept open even when idle
   ///
   /// Default: 0
   pub min_connections: u32,

   /// Idle timeout for pooled connections (in seconds)
   ///
   /// Connections that remain idle for this duration are closed automatically.
   ///
   /// Default: 30
   pub idle_timeout_secs: u64,

   /// How long a checkout may wait for a free connection (in seconds)
   ///
   /// When exceeded, sqlx reports `PoolTimedOut`, which the router treats as
   /// a transient failure.
   ///
   /// Default: 5
   pub acquire_timeout_secs: u64,

   /// Ping each connection before handing it out
   ///
   /// Broken connections are discarded and replaced, so an endpoint recovers
   /// from a dropped server connection without a restart.
   ///
   /// Default: true
   pub test_before_acquire: bool,
}

impl Default for PgPoolConfig {
   fn default() -> Self {
      Self {
         max_connections: 10,
         min_connections: 0,
         idle_timeout_secs: 30,
         acquire_timeout_secs: 5,
         test_before_acquire: true,
      }
   }
}

impl PgPoolConfig {
   pub fn idle_timeout(&self) -> Duration {
      Duration::from_secs(self.idle_timeout_secs)
   }

   pub fn acquire_timeout(&self) -> Duration {
      Duration::from_secs(self.acquire_timeout_secs)
   }
}
