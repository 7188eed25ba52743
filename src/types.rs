//! Common type definitions for the database abstraction

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Prefix marking fields as internal. Record keys starting with this prefix
/// are stripped before a record is bound to a statement, so accidentally
/// leaked bookkeeping fields never reach the database.
pub const INTERNAL_PREFIX: &str = "_";

/// Query value types bound as positional parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
	Bytes(Vec<u8>),
	Timestamp(DateTime<Utc>),
	Uuid(Uuid),
}

impl From<&str> for QueryValue {
	fn from(s: &str) -> Self {
		QueryValue::String(s.to_string())
	}
}

impl From<String> for QueryValue {
	fn from(s: String) -> Self {
		QueryValue::String(s)
	}
}

impl From<i64> for QueryValue {
	fn from(i: i64) -> Self {
		QueryValue::Int(i)
	}
}

impl From<i32> for QueryValue {
	fn from(i: i32) -> Self {
		QueryValue::Int(i as i64)
	}
}

impl From<u64> for QueryValue {
	fn from(i: u64) -> Self {
		QueryValue::Int(i as i64)
	}
}

impl From<f64> for QueryValue {
	fn from(f: f64) -> Self {
		QueryValue::Float(f)
	}
}

impl From<bool> for QueryValue {
	fn from(b: bool) -> Self {
		QueryValue::Bool(b)
	}
}

impl From<DateTime<Utc>> for QueryValue {
	fn from(dt: DateTime<Utc>) -> Self {
		QueryValue::Timestamp(dt)
	}
}

impl From<Uuid> for QueryValue {
	fn from(u: Uuid) -> Self {
		QueryValue::Uuid(u)
	}
}

impl<T> From<Option<T>> for QueryValue
where
	T: Into<QueryValue>,
{
	fn from(opt: Option<T>) -> Self {
		match opt {
			Some(v) => v.into(),
			None => QueryValue::Null,
		}
	}
}

impl TryFrom<QueryValue> for i64 {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Int(i) => Ok(i),
			_ => Err(DatabaseError::TypeError(format!(
				"cannot convert {:?} to i64",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for u64 {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Int(i) => u64::try_from(i)
				.map_err(|_| DatabaseError::TypeError(format!("value {} out of range for u64", i))),
			_ => Err(DatabaseError::TypeError(format!(
				"cannot convert {:?} to u64",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for f64 {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Float(f) => Ok(f),
			QueryValue::Int(i) => Ok(i as f64),
			_ => Err(DatabaseError::TypeError(format!(
				"cannot convert {:?} to f64",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for String {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::String(s) => Ok(s),
			_ => Err(DatabaseError::TypeError(format!(
				"cannot convert {:?} to String",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for bool {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Bool(b) => Ok(b),
			QueryValue::Int(i) => Ok(i != 0),
			_ => Err(DatabaseError::TypeError(format!(
				"cannot convert {:?} to bool",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for DateTime<Utc> {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Timestamp(dt) => Ok(dt),
			_ => Err(DatabaseError::TypeError(format!(
				"cannot convert {:?} to DateTime<Utc>",
				value
			))),
		}
	}
}

/// Result of a statement that does not return rows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResult {
	pub rows_affected: u64,
	pub last_insert_id: Option<u64>,
}

/// Row from a query result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
	pub data: HashMap<String, QueryValue>,
}

impl Row {
	pub fn new() -> Self {
		Self {
			data: HashMap::new(),
		}
	}

	pub fn insert(&mut self, key: impl Into<String>, value: QueryValue) {
		self.data.insert(key.into(), value);
	}

	/// Fetch a column, converting to the requested type.
	pub fn get<T: TryFrom<QueryValue>>(&self, key: &str) -> crate::error::Result<T>
	where
		DatabaseError: From<<T as TryFrom<QueryValue>>::Error>,
	{
		self.data
			.get(key)
			.cloned()
			.ok_or_else(|| DatabaseError::ColumnNotFound(key.to_string()))
			.and_then(|v| v.try_into().map_err(Into::into))
	}

	/// Fetch a column as `Some(T)`, mapping SQL NULL (or a missing column)
	/// to `None`.
	pub fn get_opt<T: TryFrom<QueryValue>>(&self, key: &str) -> crate::error::Result<Option<T>>
	where
		DatabaseError: From<<T as TryFrom<QueryValue>>::Error>,
	{
		match self.data.get(key) {
			None | Some(QueryValue::Null) => Ok(None),
			Some(v) => Ok(Some(v.clone().try_into().map_err(Into::into)?)),
		}
	}
}

/// Insertion-ordered column map produced by entity serialization.
///
/// The ordering matters: generated column lists and the positional parameter
/// list must line up, so a plain `HashMap` would not do.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record(IndexMap<String, QueryValue>);

impl Record {
	pub fn new() -> Self {
		Self(IndexMap::new())
	}

	pub fn set(&mut self, column: impl Into<String>, value: impl Into<QueryValue>) -> &mut Self {
		self.0.insert(column.into(), value.into());
		self
	}

	pub fn get(&self, column: &str) -> Option<&QueryValue> {
		self.0.get(column)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn columns(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}

	pub fn values(&self) -> impl Iterator<Item = &QueryValue> {
		self.0.values()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v))
	}

	/// Drop any column whose name starts with the internal-reserved prefix.
	/// Logged so a leaked field is visible during development.
	pub fn strip_internal(mut self) -> Self {
		let leaked: Vec<String> = self
			.0
			.keys()
			.filter(|k| k.starts_with(INTERNAL_PREFIX))
			.cloned()
			.collect();
		for key in leaked {
			tracing::warn!(column = %key, "stripping internal field from record before write");
			self.0.shift_remove(&key);
		}
		self
	}
}

impl FromIterator<(String, QueryValue)> for Record {
	fn from_iter<I: IntoIterator<Item = (String, QueryValue)>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}

/// Shorthand for building a [`Record`] literal.
///
/// ```
/// use modelkit::record;
///
/// let rec = record! { "name" => "Thunder Socks", "price" => 5.55 };
/// assert_eq!(rec.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
	() => { $crate::types::Record::new() };
	($($col:expr => $val:expr),+ $(,)?) => {{
		let mut rec = $crate::types::Record::new();
		$(rec.set($col, $val);)+
		rec
	}};
}
