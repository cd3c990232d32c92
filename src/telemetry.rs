//! In-process counters for routed operations

use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::config::saturating_u64;

#[derive(Debug, Default)]
struct Counters {
   enabled: bool,
   total_queries: u64,
   total_errors: u64,
   total_retries: u64,
   connection_errors: u64,
   total_duration: Duration,
}

/// Thread-safe query, error and retry counters.
///
/// One `Telemetry` is shared (behind an `Arc`) by every endpoint of a
/// router and by its fallback and retry layers. While disabled, recording is
/// a no-op; counters already collected are kept.
#[derive(Debug, Default)]
pub struct Telemetry {
   counters: RwLock<Counters>,
}

/// Point-in-time copy of the telemetry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
   pub total_queries: u64,
   pub total_errors: u64,
   pub total_retries: u64,
   pub connection_errors: u64,
   /// Mean duration of recorded queries, zero before the first one.
   pub average_duration: Duration,
   pub enabled: bool,
}

impl Telemetry {
   pub fn new(enabled: bool) -> Self {
      Self {
         counters: RwLock::new(Counters {
            enabled,
            ..Default::default()
         }),
      }
   }

   pub fn enable(&self) {
      self.counters.write().enabled = true;
   }

   pub fn disable(&self) {
      self.counters.write().enabled = false;
   }

   pub fn is_enabled(&self) -> bool {
      self.counters.read().enabled
   }

   /// Count one completed operation and its elapsed time.
   pub fn record_query(&self, duration: Duration) {
      self.record(|c| {
         c.total_queries += 1;
         c.total_duration += duration;
      });
   }

   pub fn record_error(&self) {
      self.record(|c| c.total_errors += 1);
   }

   /// Count one inter-attempt sleep of the retry loop.
   pub fn record_retry(&self) {
      self.record(|c| c.total_retries += 1);
   }

   pub fn record_connection_error(&self) {
      self.record(|c| c.connection_errors += 1);
   }

   fn record(&self, update: impl FnOnce(&mut Counters)) {
      let mut counters = self.counters.write();
      if counters.enabled {
         update(&mut counters);
      }
   }

   pub fn snapshot(&self) -> TelemetrySnapshot {
      let c = self.counters.read();
      let average_duration = match u32::try_from(c.total_queries) {
         Ok(0) => Duration::ZERO,
         Ok(count) => c.total_duration / count,
         // Beyond u32::MAX samples, fall back to float division
         Err(_) => c.total_duration.div_f64(c.total_queries as f64),
      };

      TelemetrySnapshot {
         total_queries: c.total_queries,
         total_errors: c.total_errors,
         total_retries: c.total_retries,
         connection_errors: c.connection_errors,
         average_duration,
         enabled: c.enabled,
      }
   }

   /// Emit the current counters as one `info` event.
   pub fn log_metrics(&self) {
      let snapshot = self.snapshot();
      if !snapshot.enabled {
         return;
      }

      info!(
         total_queries = snapshot.total_queries,
         total_errors = snapshot.total_errors,
         total_retries = snapshot.total_retries,
         connection_errors = snapshot.connection_errors,
         average_duration_us = saturating_u64(snapshot.average_duration.as_micros()),
         "telemetry metrics"
      );
   }
}
