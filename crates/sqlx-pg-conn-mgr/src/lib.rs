//! # sqlx-pg-conn-mgr
//!
//! A minimal wrapper around SQLx that gives each PostgreSQL role (primary,
//! synchronous replica, asynchronous replica) its own connection pool and
//! exposes it through a small, uniform client boundary.
//!
//! ## Core Types
//!
//! - **[`DatabaseClient`]**: The operations a router needs from one physical endpoint
//! - **[`ClientTransaction`]**: A transaction pinned to a single connection
//! - **[`PgDatabase`]**: `DatabaseClient` implementation backed by a bounded `PgPool`
//! - **[`PgTransaction`]**: RAII transaction guard that discards its connection if dropped open
//! - **[`PgPoolConfig`]**: Configuration for connection pool settings
//! - **[`Rows`]** / **[`Row`]**: Buffered query results decoded to JSON values
//! - **[`Error`]**: Error type for connection management and row access
//!
//! ## Architecture
//!
//! - **Pool per role**: Concurrent callers never share one physical connection
//! - **Self-healing**: Connections are tested before checkout, broken ones are replaced
//! - **Buffered results**: Rows are fully read before the connection returns to the pool
//! - **JSON arguments**: Bind values are `serde_json::Value`s, mapped to Postgres types
//!
//! ## Usage
//!
//! ```no_run
//! use serde_json::json;
//! use sqlx_pg_conn_mgr::{DatabaseClient, PgDatabase, TxOptions, ClientTransaction};
//!
//! #[tokio::main]
//! async fn main() -> sqlx_pg_conn_mgr::Result<()> {
//!     let db = PgDatabase::connect("postgres://app@localhost/app", None).await?;
//!
//!     db.exec("INSERT INTO users (name) VALUES ($1)", &[json!("Alice")]).await?;
//!
//!     let rows = db.query("SELECT id, name FROM users", &[]).await?;
//!     for row in rows {
//!         let name: String = row.try_get("name")?;
//!         println!("{name}");
//!     }
//!
//!     let mut tx = db.begin(&TxOptions::default()).await?;
//!     tx.exec("DELETE FROM users WHERE name = $1", &[json!("Alice")]).await?;
//!     tx.commit().await?;
//!
//!     db.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Principles
//!
//! - Uses sqlx's `PgPoolOptions` for all pool configuration
//! - Uses sqlx's `PgConnectOptions` for parsing connection strings
//! - Minimal custom logic - delegates to sqlx wherever possible
//! - Errors crossing the client boundary stay `sqlx::Error` so callers can classify them
//!
mod arguments;
mod client;
mod config;
mod database;
mod decode;
mod error;
mod rows;
mod transaction;

// Re-export public types
pub use arguments::{bind_all, bind_value};
pub use client::{ClientTransaction, CommandTag, DatabaseClient, IsolationLevel, TxOptions};
pub use config::PgPoolConfig;
pub use database::PgDatabase;
pub use decode::to_json;
pub use error::Error;
pub use rows::{Row, Rows};
pub use transaction::PgTransaction;

/// A type alias for Results with our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
