use serde_json::Value as JsonValue;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;

/// Helper function to bind a JSON value to a SQLx query
///
/// Strings, booleans and numbers bind as their native Postgres types; arrays
/// and objects bind as JSONB.
pub fn bind_value<'a>(
   query: Query<'a, Postgres, PgArguments>,
   value: JsonValue,
) -> Query<'a, Postgres, PgArguments> {
   match value {
      JsonValue::Null => query.bind(None::<JsonValue>),
      JsonValue::Bool(b) => query.bind(b),
      JsonValue::String(s) => query.bind(s),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            // Value too large for i64 (BIGINT), use f64 (will lose precision)
            query.bind(uint_val as f64)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      value => query.bind(value),
   }
}

/// Bind every argument, in order, to the query
pub fn bind_all<'a>(sql: &'a str, args: &[JsonValue]) -> Query<'a, Postgres, PgArguments> {
   args
      .iter()
      .cloned()
      .fold(sqlx::query(sql), bind_value)
}
