use base64::Engine;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgRow, PgValueRef};
use sqlx::{Column, Row as _, TypeInfo, Value, ValueRef};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::{Error, Row};

/// Convert a Postgres value to a JSON value.
///
/// Note: BYTEA values are returned as base64-encoded strings since JSON has
/// no native binary type. Date and time values are returned as strings.
pub fn to_json(value: PgValueRef<'_>) -> Result<JsonValue, sqlx::Error> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let type_name = value.type_info().name().to_string();
   let value = ValueRef::to_owned(&value);

   let result = match type_name.as_str() {
      "BOOL" => JsonValue::Bool(value.try_decode::<bool>()?),

      "INT2" => JsonValue::from(value.try_decode::<i16>()?),
      "INT4" => JsonValue::from(value.try_decode::<i32>()?),
      "INT8" => JsonValue::from(value.try_decode::<i64>()?),

      "FLOAT4" => JsonValue::from(f64::from(value.try_decode::<f32>()?)),
      "FLOAT8" => JsonValue::from(value.try_decode::<f64>()?),

      "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
         JsonValue::String(value.try_decode::<String>()?)
      }

      "JSON" | "JSONB" => value.try_decode::<JsonValue>()?,

      "UUID" => JsonValue::String(value.try_decode::<uuid::Uuid>()?.to_string()),

      "BYTEA" => {
         let bytes = value.try_decode::<Vec<u8>>()?;
         JsonValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
      }

      "DATE" => JsonValue::String(value.try_decode::<Date>()?.to_string()),

      "TIME" => JsonValue::String(value.try_decode::<Time>()?.to_string()),

      "TIMESTAMP" => JsonValue::String(value.try_decode::<PrimitiveDateTime>()?.to_string()),

      "TIMESTAMPTZ" => JsonValue::String(value.try_decode::<OffsetDateTime>()?.to_string()),

      _ => {
         return Err(sqlx::Error::Decode(Box::new(Error::UnsupportedDatatype(
            type_name,
         ))));
      }
   };

   Ok(result)
}

/// Decode every column of a row, keeping select-list order.
pub(crate) fn decode_row(row: &PgRow) -> Result<Row, sqlx::Error> {
   let mut values = IndexMap::with_capacity(row.columns().len());
   for (i, column) in row.columns().iter().enumerate() {
      let value = row.try_get_raw(i)?;
      values.insert(column.name().to_string(), to_json(value)?);
   }
   Ok(Row::new(values))
}
