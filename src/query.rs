//! SQL query builder
//!
//! A fluent, single-use builder that assembles one statement from structured
//! clause inputs and tracks positional parameters with count validation. It
//! deliberately covers only the simple statement shapes the mapper layer
//! needs; anything fancier should be written as a raw [`Filter::Raw`] clause.
//!
//! Every fragment-appending method revalidates the placeholder/parameter
//! balance, so a mismatch is caught at the call that introduced it rather
//! than at execution time.

use std::fmt;

use crate::error::{DatabaseError, Result};
use crate::types::{QueryValue, Record};

/// Typed normalization of the clause forms a WHERE accepts.
///
/// This replaces run-time clause sniffing with a closed set of shapes:
/// an equality map is ANDed, a list of maps is ORed group-wise, an integer
/// is primary-key equality and a list of integers becomes `pk IN (…)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
	/// No WHERE clause; matches every row.
	All,
	/// Primary-key equality.
	Id(i64),
	/// Primary-key membership. An empty list is a construction error.
	Ids(Vec<i64>),
	/// Field-equality map, ANDed.
	Eq(Record),
	/// OR of parenthesized AND-groups, preserving per-group parameter order.
	Any(Vec<Record>),
	/// Raw SQL fragment with its positional parameters.
	Raw(String, Vec<QueryValue>),
}

impl From<i64> for Filter {
	fn from(id: i64) -> Self {
		Filter::Id(id)
	}
}

impl From<Record> for Filter {
	fn from(rec: Record) -> Self {
		Filter::Eq(rec)
	}
}

impl From<Vec<i64>> for Filter {
	fn from(ids: Vec<i64>) -> Self {
		Filter::Ids(ids)
	}
}

impl From<&str> for Filter {
	fn from(raw: &str) -> Self {
		Filter::Raw(raw.to_string(), Vec::new())
	}
}

/// Statement shape, fixed by the first fragment-appending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
	Empty,
	Select,
	Insert,
	Update,
	Delete,
	Count,
}

/// Finalized statement/parameter pair, ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
	pub sql: String,
	pub params: Vec<QueryValue>,
	/// When true, joined-table columns should be qualified so identically
	/// named columns from both tables don't collide in the result set.
	pub nested: bool,
}

/// Fluent SQL statement builder.
///
/// A builder instance is single-use: build once, prepare once, execute once.
/// Methods consume and return the builder so misuse is an error value, not a
/// latent bad statement:
///
/// ```
/// use modelkit::query::{Filter, SqlQuery};
/// use modelkit::record;
///
/// let stmt = SqlQuery::new("products")
///     .where_clause(Filter::Eq(record! { "name" => "Lightsaber" }))?
///     .modifiers("ORDER BY id DESC")?
///     .prepare()?;
/// assert_eq!(stmt.sql, "SELECT * FROM products WHERE name = ? ORDER BY id DESC");
/// # Ok::<(), modelkit::error::DatabaseError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SqlQuery {
	table: String,
	pk: String,
	fragments: Vec<String>,
	params: Vec<QueryValue>,
	shape: Shape,
	where_at: Option<usize>,
	joined: bool,
}

impl SqlQuery {
	pub fn new(table: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			pk: "id".to_string(),
			fragments: Vec::new(),
			params: Vec::new(),
			shape: Shape::Empty,
			where_at: None,
			joined: false,
		}
	}

	/// Override the primary-key column used by integer clauses.
	pub fn with_pk(mut self, pk: impl Into<String>) -> Self {
		self.pk = pk.into();
		self
	}

	pub fn table(&self) -> &str {
		&self.table
	}

	pub(crate) fn is_select(&self) -> bool {
		matches!(self.shape, Shape::Select | Shape::Count)
	}

	/// Number of positional placeholders in the accumulated text.
	pub fn expected_params(&self) -> usize {
		self.fragments
			.iter()
			.map(|f| f.matches('?').count())
			.sum()
	}

	fn ensure_select(&mut self) {
		if self.shape == Shape::Empty {
			self.fragments.push(format!("SELECT * FROM {}", self.table));
			self.shape = Shape::Select;
		}
	}

	fn ensure_first(&self, what: &str) -> Result<()> {
		if self.shape != Shape::Empty {
			return Err(DatabaseError::QueryBuild(format!(
				"{} must be the first call on a builder, but fragments already present: {}",
				what, self
			)));
		}
		Ok(())
	}

	/// Attach the WHERE clause. On an empty builder this implies
	/// `SELECT * FROM table` first. Only one WHERE fits a statement;
	/// a second call is a construction error, combine the conditions in
	/// one [`Filter`] instead.
	pub fn where_clause(mut self, filter: impl Into<Filter>) -> Result<Self> {
		self.ensure_select();
		let filter = filter.into();
		if matches!(filter, Filter::All) {
			return Ok(self);
		}
		if self.where_at.is_some() {
			return Err(DatabaseError::QueryBuild(format!(
				"where clause already present; combine the conditions in one filter: {}",
				self
			)));
		}

		let (clause, values) = Self::render_filter(&filter, &self.pk)?;
		self.fragments.push(format!("WHERE {}", clause));
		self.where_at = Some(self.fragments.len() - 1);
		if values.is_empty() {
			// a raw clause may bind its parameters later through `values`;
			// the balance is still enforced there and at `prepare`
			return Ok(self);
		}
		self.values(values)
	}

	fn render_filter(filter: &Filter, pk: &str) -> Result<(String, Vec<QueryValue>)> {
		match filter {
			Filter::All => Ok((String::new(), Vec::new())),
			Filter::Id(id) => Ok((format!("{} = ?", pk), vec![QueryValue::Int(*id)])),
			Filter::Ids(ids) => {
				if ids.is_empty() {
					return Err(DatabaseError::QueryBuild(
						"empty id list is ambiguous in a prepared statement".to_string(),
					));
				}
				let placeholders = vec!["?"; ids.len()].join(", ");
				Ok((
					format!("{} IN ({})", pk, placeholders),
					ids.iter().map(|id| QueryValue::Int(*id)).collect(),
				))
			}
			Filter::Eq(rec) => {
				let rec = rec.clone().strip_internal();
				if rec.is_empty() {
					return Err(DatabaseError::QueryBuild(
						"equality filter must name at least one field".to_string(),
					));
				}
				let clause = rec
					.columns()
					.map(|c| format!("{} = ?", c))
					.collect::<Vec<_>>()
					.join(" AND ");
				Ok((clause, rec.values().cloned().collect()))
			}
			Filter::Any(groups) => {
				if groups.is_empty() {
					return Err(DatabaseError::QueryBuild(
						"OR filter must contain at least one group".to_string(),
					));
				}
				let mut clauses = Vec::with_capacity(groups.len());
				let mut values = Vec::new();
				for group in groups {
					let (clause, mut group_values) =
						Self::render_filter(&Filter::Eq(group.clone()), pk)?;
					clauses.push(format!("({})", clause));
					values.append(&mut group_values);
				}
				Ok((clauses.join(" OR "), values))
			}
			Filter::Raw(sql, values) => Ok((sql.clone(), values.clone())),
		}
	}

	/// Start an INSERT. Must be the first call on a fresh builder.
	pub fn insert(mut self, record: Record) -> Result<Self> {
		self.ensure_first("insert")?;
		let record = record.strip_internal();
		if record.is_empty() {
			return Err(DatabaseError::QueryBuild(
				"tried to insert an empty record".to_string(),
			));
		}
		let columns = record.columns().collect::<Vec<_>>().join(", ");
		let placeholders = vec!["?"; record.len()].join(", ");
		self.fragments.push(format!(
			"INSERT INTO {} ({}) VALUES ({})",
			self.table, columns, placeholders
		));
		self.shape = Shape::Insert;
		self.values(record.values().cloned().collect())
	}

	/// Start an UPDATE. Must be the first call on a fresh builder.
	pub fn update(mut self, record: Record) -> Result<Self> {
		self.ensure_first("update")?;
		let record = record.strip_internal();
		if record.is_empty() {
			return Err(DatabaseError::QueryBuild(
				"tried to update with an empty record".to_string(),
			));
		}
		let sets = record
			.columns()
			.map(|c| format!("{} = ?", c))
			.collect::<Vec<_>>()
			.join(", ");
		self.fragments
			.push(format!("UPDATE {} SET {}", self.table, sets));
		self.shape = Shape::Update;
		self.values(record.values().cloned().collect())
	}

	/// Start a DELETE. Must be the first call on a fresh builder.
	pub fn delete(mut self) -> Result<Self> {
		self.ensure_first("delete")?;
		self.fragments.push(format!("DELETE FROM {}", self.table));
		self.shape = Shape::Delete;
		Ok(self)
	}

	/// Start a COUNT. Must be the first call on a fresh builder.
	pub fn count(mut self) -> Result<Self> {
		self.ensure_first("count")?;
		self.fragments
			.push(format!("SELECT COUNT(*) AS count FROM {}", self.table));
		self.shape = Shape::Count;
		Ok(self)
	}

	/// Append a join fragment.
	///
	/// SQL requires JOIN before WHERE, so if a WHERE fragment was already
	/// attached it is spliced out and re-appended after the join. Parameter
	/// order is unaffected because joins carry no parameters.
	pub fn join(
		mut self,
		join_type: &str,
		other_table: &str,
		this_key: &str,
		other_key: &str,
	) -> Result<Self> {
		self.ensure_select();
		if !self.is_select() {
			return Err(DatabaseError::QueryBuild(format!(
				"join is only valid on SELECT or COUNT statements: {}",
				self
			)));
		}
		let displaced = match self.where_at.take() {
			Some(at) => {
				tracing::warn!(
					query = %self,
					"where clause attached before join; reordering it after the join"
				);
				Some(self.fragments.remove(at))
			}
			None => None,
		};
		self.fragments.push(format!(
			"{} {} ON {}.{} = {}.{}",
			join_type, other_table, other_table, other_key, self.table, this_key
		));
		self.joined = true;
		if let Some(where_fragment) = displaced {
			self.fragments.push(where_fragment);
			self.where_at = Some(self.fragments.len() - 1);
		}
		Ok(self)
	}

	/// Append trailing modifiers such as `ORDER BY` or `LIMIT`.
	pub fn modifiers(mut self, clause: &str) -> Result<Self> {
		if self.shape == Shape::Empty {
			return Err(DatabaseError::QueryBuild(
				"modifiers like ORDER BY and LIMIT are set at the end of the query".to_string(),
			));
		}
		self.fragments.push(clause.to_string());
		Ok(self)
	}

	/// Append positional parameters.
	///
	/// The running parameter count must land exactly on the number of
	/// placeholders in the accumulated text; over- or under-supplying is a
	/// construction error rather than a silent truncation.
	pub fn values(mut self, values: Vec<QueryValue>) -> Result<Self> {
		let expected = self.expected_params();
		let supplied = self.params.len() + values.len();
		if expected != supplied {
			return Err(DatabaseError::QueryBuild(format!(
				"query so far does not support this number of parameters: expected {}, got {}, query: {}",
				expected, supplied, self
			)));
		}
		self.params.extend(values);
		Ok(self)
	}

	pub fn params(&self) -> &[QueryValue] {
		&self.params
	}

	/// Finalize into an executable statement/parameter pair.
	pub fn prepare(self) -> Result<Statement> {
		if self.shape == Shape::Empty {
			return Err(DatabaseError::QueryBuild(
				"tried to prepare an empty query".to_string(),
			));
		}
		let sql = self.to_string();
		let expected = self.expected_params();
		if expected != self.params.len() {
			return Err(DatabaseError::QueryBuild(format!(
				"number of parameters ({}) did not match the number of placeholders ({}) in: {}",
				self.params.len(),
				expected,
				sql
			)));
		}
		Ok(Statement {
			sql,
			params: self.params,
			nested: self.joined,
		})
	}
}

impl fmt::Display for SqlQuery {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.fragments.join(" "))
	}
}
