//! Router configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx_pg_conn_mgr::PgPoolConfig;

use crate::{Error, Result};

/// Configuration for a [`Router`](crate::Router)
///
/// Loading this from a file or the environment is up to the application; the
/// struct is `Deserialize` with defaults for every field except the primary
/// connection string.
///
/// # Examples
///
/// ```
/// use sqlx_pg_router::RouterConfig;
///
/// let config = RouterConfig::new("postgres://app@primary/app")
///     .with_async_replica("postgres://app@replica-1/app")
///     .with_max_retries(2);
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.retry_policy().max_retries, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
   /// Connection string of the primary (required)
   pub primary_url: String,

   /// Connection string of the synchronous replica; empty disables the role
   pub sync_replica_url: String,

   /// Connection string of the asynchronous replica; empty disables the role
   pub async_replica_url: String,

   /// Extra attempts after the first for replica-routed operations
   ///
   /// Default: 3
   pub max_retries: u32,

   /// Fixed delay between attempts (in milliseconds)
   ///
   /// Default: 100
   pub retry_delay_ms: u64,

   /// Per-operation timeout (in milliseconds), 0 disables it
   ///
   /// Default: 0
   pub query_timeout_ms: u64,

   /// Default: true
   pub enable_telemetry: bool,

   /// Pin replica reads to the replica handle's own endpoint
   ///
   /// Default: false
   pub disable_replica_fallback: bool,

   /// Pool settings applied to every role
   pub pool: PgPoolConfig,
}

impl Default for RouterConfig {
   fn default() -> Self {
      Self {
         primary_url: String::new(),
         sync_replica_url: String::new(),
         async_replica_url: String::new(),
         max_retries: 3,
         retry_delay_ms: 100,
         query_timeout_ms: 0,
         enable_telemetry: true,
         disable_replica_fallback: false,
         pool: PgPoolConfig::default(),
      }
   }
}

impl RouterConfig {
   pub fn new(primary_url: impl Into<String>) -> Self {
      Self {
         primary_url: primary_url.into(),
         ..Default::default()
      }
   }

   pub fn with_sync_replica(mut self, url: impl Into<String>) -> Self {
      self.sync_replica_url = url.into();
      self
   }

   pub fn with_async_replica(mut self, url: impl Into<String>) -> Self {
      self.async_replica_url = url.into();
      self
   }

   pub fn with_max_retries(mut self, max_retries: u32) -> Self {
      self.max_retries = max_retries;
      self
   }

   pub fn with_retry_delay(mut self, delay: Duration) -> Self {
      self.retry_delay_ms = saturating_u64(delay.as_millis());
      self
   }

   pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
      self.query_timeout_ms = timeout.map_or(0, |t| saturating_u64(t.as_millis()));
      self
   }

   pub fn with_telemetry(mut self, enabled: bool) -> Self {
      self.enable_telemetry = enabled;
      self
   }

   pub fn with_replica_fallback(mut self, enabled: bool) -> Self {
      self.disable_replica_fallback = !enabled;
      self
   }

   pub fn with_pool(mut self, pool: PgPoolConfig) -> Self {
      self.pool = pool;
      self
   }

   /// Check the settings a router cannot start without.
   pub fn validate(&self) -> Result<()> {
      if self.primary_url.trim().is_empty() {
         return Err(Error::InvalidConfiguration(
            "primary connection string is required".to_string(),
         ));
      }

      if self.pool.max_connections == 0 {
         return Err(Error::InvalidConfiguration(
            "pool.max_connections must be at least 1".to_string(),
         ));
      }

      if self.pool.min_connections > self.pool.max_connections {
         return Err(Error::InvalidConfiguration(format!(
            "pool.min_connections ({}) exceeds pool.max_connections ({})",
            self.pool.min_connections, self.pool.max_connections
         )));
      }

      Ok(())
   }

   pub fn retry_policy(&self) -> RetryPolicy {
      RetryPolicy {
         max_retries: self.max_retries,
         retry_delay: Duration::from_millis(self.retry_delay_ms),
         query_timeout: (self.query_timeout_ms > 0)
            .then(|| Duration::from_millis(self.query_timeout_ms)),
      }
   }
}

/// Immutable retry and timeout settings derived from [`RouterConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
   /// Attempts beyond the first
   pub max_retries: u32,
   pub retry_delay: Duration,
   /// `None` when per-operation timeouts are disabled
   pub query_timeout: Option<Duration>,
}

impl RetryPolicy {
   /// Total attempts, including the first.
   pub fn attempts(&self) -> u32 {
      self.max_retries.saturating_add(1)
   }
}

impl Default for RetryPolicy {
   fn default() -> Self {
      RouterConfig::default().retry_policy()
   }
}

/// Milliseconds or microseconds of a `Duration`, clamped to `u64::MAX`.
pub(crate) fn saturating_u64(value: u128) -> u64 {
   u64::try_from(value).unwrap_or(u64::MAX)
}

pub(crate) fn non_empty(url: &str) -> Option<&str> {
   let url = url.trim();
   (!url.is_empty()).then_some(url)
}
