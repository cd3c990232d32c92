//! Scripted database clients shared by the router tests.
//!
//! Each client answers calls from a queue of outcomes, falling back to a
//! default outcome once the queue is empty, and appends `"<name>.<method>"`
//! to a call log shared by every client of one router.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{Value as JsonValue, json};
use sqlx_pg_router::{
   ClientTransaction, CommandTag, DatabaseClient, Row, Rows, Router, RouterConfig, TxOptions,
};

/// How a scripted call ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
   Ok,
   /// `connection refused`, classified transient
   Refused,
   /// A statement error, classified fatal
   Fatal,
   /// Never answers within a test's lifetime
   Hang,
}

impl Outcome {
   async fn resolve(self) -> Result<(), sqlx::Error> {
      match self {
         Outcome::Ok => Ok(()),
         Outcome::Refused => Err(sqlx::Error::Io(io::Error::from(
            io::ErrorKind::ConnectionRefused,
         ))),
         Outcome::Fatal => Err(sqlx::Error::Protocol(
            "syntax error at or near \"SELEC\"".to_string(),
         )),
         Outcome::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
         }
      }
   }
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
   fn push(&self, name: &str, method: &str) {
      self.0.lock().unwrap().push(format!("{name}.{method}"));
   }

   pub fn calls(&self) -> Vec<String> {
      self.0.lock().unwrap().clone()
   }

   /// Number of logged calls starting with `prefix`, e.g. `"primary."`
   pub fn count(&self, prefix: &str) -> usize {
      self.0
         .lock()
         .unwrap()
         .iter()
         .filter(|call| call.starts_with(prefix))
         .count()
   }
}

pub struct ScriptedClient {
   name: &'static str,
   log: CallLog,
   script: Mutex<VecDeque<Outcome>>,
   default: Outcome,
   close: Outcome,
   tx_exec: Outcome,
   commit: Outcome,
   rollback: Outcome,
}

impl ScriptedClient {
   pub fn new(name: &'static str, log: &CallLog) -> Self {
      Self {
         name,
         log: log.clone(),
         script: Mutex::new(VecDeque::new()),
         default: Outcome::Ok,
         close: Outcome::Ok,
         tx_exec: Outcome::Ok,
         commit: Outcome::Ok,
         rollback: Outcome::Ok,
      }
   }

   /// Outcome of every call once the script is used up.
   pub fn always(mut self, outcome: Outcome) -> Self {
      self.default = outcome;
      self
   }

   /// Queue the outcome of the next unscripted call.
   pub fn then(self, outcome: Outcome) -> Self {
      self.script.lock().unwrap().push_back(outcome);
      self
   }

   pub fn close_with(mut self, outcome: Outcome) -> Self {
      self.close = outcome;
      self
   }

   pub fn tx_exec_with(mut self, outcome: Outcome) -> Self {
      self.tx_exec = outcome;
      self
   }

   pub fn commit_with(mut self, outcome: Outcome) -> Self {
      self.commit = outcome;
      self
   }

   pub fn rollback_with(mut self, outcome: Outcome) -> Self {
      self.rollback = outcome;
      self
   }

   async fn respond(&self, method: &str) -> Result<(), sqlx::Error> {
      self.log.push(self.name, method);
      let outcome = self
         .script
         .lock()
         .unwrap()
         .pop_front()
         .unwrap_or(self.default);
      outcome.resolve().await
   }
}

/// One row naming the client that served the query.
pub fn served_row(name: &str) -> Row {
   let mut values = IndexMap::new();
   values.insert("served_by".to_string(), json!(name));
   Row::new(values)
}

/// Name of the client that served a scripted query.
pub fn served_by(mut rows: Rows) -> String {
   rows
      .next()
      .and_then(|row| row.try_get::<String>("served_by").ok())
      .unwrap_or_default()
}

impl DatabaseClient for ScriptedClient {
   type Transaction = ScriptedTransaction;

   async fn exec(&self, _sql: &str, _args: &[JsonValue]) -> Result<CommandTag, sqlx::Error> {
      self.respond("exec").await?;
      Ok(CommandTag { rows_affected: 1 })
   }

   async fn query(&self, _sql: &str, _args: &[JsonValue]) -> Result<Rows, sqlx::Error> {
      self.respond("query").await?;
      Ok(Rows::new(vec![served_row(self.name)]))
   }

   async fn query_row(&self, _sql: &str, _args: &[JsonValue]) -> Result<Option<Row>, sqlx::Error> {
      self.respond("query_row").await?;
      Ok(Some(served_row(self.name)))
   }

   async fn begin(&self, _options: &TxOptions) -> Result<ScriptedTransaction, sqlx::Error> {
      self.respond("begin").await?;
      Ok(ScriptedTransaction {
         name: self.name,
         log: self.log.clone(),
         exec: self.tx_exec,
         commit: self.commit,
         rollback: self.rollback,
      })
   }

   async fn ping(&self) -> Result<(), sqlx::Error> {
      self.respond("ping").await
   }

   async fn close(&self) -> Result<(), sqlx::Error> {
      self.log.push(self.name, "close");
      self.close.resolve().await
   }
}

pub struct ScriptedTransaction {
   name: &'static str,
   log: CallLog,
   exec: Outcome,
   commit: Outcome,
   rollback: Outcome,
}

impl ClientTransaction for ScriptedTransaction {
   async fn exec(&mut self, _sql: &str, _args: &[JsonValue]) -> Result<CommandTag, sqlx::Error> {
      self.log.push(self.name, "tx.exec");
      self.exec.resolve().await?;
      Ok(CommandTag { rows_affected: 1 })
   }

   async fn query(&mut self, _sql: &str, _args: &[JsonValue]) -> Result<Rows, sqlx::Error> {
      self.log.push(self.name, "tx.query");
      Ok(Rows::new(vec![served_row(self.name)]))
   }

   async fn query_row(
      &mut self,
      _sql: &str,
      _args: &[JsonValue],
   ) -> Result<Option<Row>, sqlx::Error> {
      self.log.push(self.name, "tx.query_row");
      Ok(Some(served_row(self.name)))
   }

   async fn commit(self) -> Result<(), sqlx::Error> {
      self.log.push(self.name, "tx.commit");
      self.commit.resolve().await
   }

   async fn rollback(self) -> Result<(), sqlx::Error> {
      self.log.push(self.name, "tx.rollback");
      self.rollback.resolve().await
   }
}

/// Router over scripted clients named `primary`, `sync` and `async`.
pub fn router(
   config: &RouterConfig,
   primary: ScriptedClient,
   sync_replica: Option<ScriptedClient>,
   async_replica: Option<ScriptedClient>,
) -> Router<ScriptedClient> {
   Router::from_clients(config, primary, sync_replica, async_replica)
}

/// Config with a fixed retry delay and nothing else changed.
pub fn config(max_retries: u32, retry_delay: Duration) -> RouterConfig {
   RouterConfig::new("postgres://primary/app")
      .with_max_retries(max_retries)
      .with_retry_delay(retry_delay)
}
