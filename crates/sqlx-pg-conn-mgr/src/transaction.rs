//! PgTransaction for work pinned to one pooled connection

use serde_json::Value as JsonValue;
use sqlx::Postgres;
use sqlx::pool::PoolConnection;
use tracing::{debug, warn};

use crate::arguments::bind_all;
use crate::client::{ClientTransaction, CommandTag, TxOptions};
use crate::decode::decode_row;
use crate::rows::{Row, Rows};

/// RAII guard for a transaction running on one checked-out pool connection
///
/// The guard holds the connection for its whole lifetime. `commit` and
/// `rollback` consume it and return the connection to the pool. If the guard
/// is dropped while the transaction is still open, the connection is detached
/// from the pool and closed, so the server aborts the transaction and no
/// other caller ever receives a connection stuck inside it.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use sqlx_pg_conn_mgr::{ClientTransaction, DatabaseClient, PgDatabase, TxOptions};
///
/// # async fn example() -> Result<(), sqlx_pg_conn_mgr::Error> {
/// let db = PgDatabase::connect("postgres://app@localhost/app", None).await?;
/// let mut tx = db.begin(&TxOptions::default()).await?;
/// tx.exec("INSERT INTO users (name) VALUES ($1)", &[json!("Alice")]).await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PgTransaction {
   conn: Option<PoolConnection<Postgres>>,
}

impl PgTransaction {
   /// Start a transaction on a connection taken from the pool
   pub(crate) async fn begin(
      mut conn: PoolConnection<Postgres>,
      options: &TxOptions,
   ) -> Result<Self, sqlx::Error> {
      let statement = options.begin_statement();
      sqlx::query(&statement).execute(&mut *conn).await?;
      debug!(statement = %statement, "transaction started");
      Ok(Self { conn: Some(conn) })
   }

   fn conn_mut(&mut self) -> Result<&mut PoolConnection<Postgres>, sqlx::Error> {
      // Only empty after commit/rollback, which consume self
      self.conn.as_mut().ok_or(sqlx::Error::PoolClosed)
   }

   async fn finish(mut self, statement: &'static str) -> Result<(), sqlx::Error> {
      let Some(mut conn) = self.conn.take() else {
         return Ok(());
      };

      match sqlx::query(statement).execute(&mut *conn).await {
         Ok(_) => Ok(()),
         Err(e) => {
            // Transaction state is unknown, never hand this connection out again
            drop(conn.detach());
            Err(e)
         }
      }
   }
}

impl ClientTransaction for PgTransaction {
   async fn exec(&mut self, sql: &str, args: &[JsonValue]) -> Result<CommandTag, sqlx::Error> {
      let conn = self.conn_mut()?;
      let result = bind_all(sql, args).execute(&mut **conn).await?;
      Ok(CommandTag {
         rows_affected: result.rows_affected(),
      })
   }

   async fn query(&mut self, sql: &str, args: &[JsonValue]) -> Result<Rows, sqlx::Error> {
      let conn = self.conn_mut()?;
      let rows = bind_all(sql, args).fetch_all(&mut **conn).await?;
      let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
      Ok(Rows::new(rows))
   }

   async fn query_row(
      &mut self,
      sql: &str,
      args: &[JsonValue],
   ) -> Result<Option<Row>, sqlx::Error> {
      let conn = self.conn_mut()?;
      let row = bind_all(sql, args).fetch_optional(&mut **conn).await?;
      row.as_ref().map(decode_row).transpose()
   }

   async fn commit(self) -> Result<(), sqlx::Error> {
      self.finish("COMMIT").await
   }

   async fn rollback(self) -> Result<(), sqlx::Error> {
      self.finish("ROLLBACK").await
   }
}

impl Drop for PgTransaction {
   fn drop(&mut self) {
      if let Some(conn) = self.conn.take() {
         warn!("transaction dropped while still open, closing its connection");
         drop(conn.detach());
      }
   }
}
