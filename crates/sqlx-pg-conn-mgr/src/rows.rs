//! Buffered query results

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::Error;

/// A single result row, keyed by column name in select-list order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
   values: IndexMap<String, JsonValue>,
}

impl Row {
   pub fn new(values: IndexMap<String, JsonValue>) -> Self {
      Self { values }
   }

   /// Raw JSON value of a column.
   pub fn get(&self, column: &str) -> Option<&JsonValue> {
      self.values.get(column)
   }

   /// Raw JSON value by position.
   pub fn get_index(&self, index: usize) -> Option<&JsonValue> {
      self.values.get_index(index).map(|(_, v)| v)
   }

   /// Decode a column into a Rust value.
   ///
   /// # Examples
   ///
   /// ```
   /// use indexmap::IndexMap;
   /// use serde_json::json;
   /// use sqlx_pg_conn_mgr::Row;
   ///
   /// let mut values = IndexMap::new();
   /// values.insert("id".to_string(), json!(7));
   /// let row = Row::new(values);
   ///
   /// let id: i64 = row.try_get("id").unwrap();
   /// assert_eq!(id, 7);
   /// assert!(row.try_get::<i64>("missing").is_err());
   /// ```
   pub fn try_get<T: DeserializeOwned>(&self, column: &str) -> Result<T, Error> {
      let value = self
         .values
         .get(column)
         .ok_or_else(|| Error::ColumnNotFound(column.to_string()))?;

      T::deserialize(value).map_err(|source| Error::Decode {
         column: column.to_string(),
         source,
      })
   }

   /// Column values in select-list order.
   pub fn values(&self) -> impl ExactSizeIterator<Item = &JsonValue> {
      self.values.values()
   }

   /// Column names in select-list order.
   pub fn columns(&self) -> impl ExactSizeIterator<Item = &str> {
      self.values.keys().map(String::as_str)
   }

   pub fn len(&self) -> usize {
      self.values.len()
   }

   pub fn is_empty(&self) -> bool {
      self.values.is_empty()
   }

   pub fn into_map(self) -> IndexMap<String, JsonValue> {
      self.values
   }
}

/// All rows returned by a query.
///
/// Rows are read completely before the connection goes back to its pool, so
/// iterating never touches the network.
#[derive(Debug, Clone, Default)]
pub struct Rows {
   columns: Vec<String>,
   rows: std::vec::IntoIter<Row>,
}

impl Rows {
   /// Build a result set. Column names are taken from the first row.
   pub fn new(rows: Vec<Row>) -> Self {
      let columns = rows
         .first()
         .map(|row| row.columns().map(str::to_string).collect())
         .unwrap_or_default();

      Self {
         columns,
         rows: rows.into_iter(),
      }
   }

   /// Column names, empty when the query returned no rows.
   pub fn columns(&self) -> &[String] {
      &self.columns
   }

   /// Rows not yet consumed.
   pub fn len(&self) -> usize {
      self.rows.len()
   }

   pub fn is_empty(&self) -> bool {
      self.rows.len() == 0
   }
}

impl Iterator for Rows {
   type Item = Row;

   fn next(&mut self) -> Option<Self::Item> {
      self.rows.next()
   }

   fn size_hint(&self) -> (usize, Option<usize>) {
      self.rows.size_hint()
   }
}

impl ExactSizeIterator for Rows {}
