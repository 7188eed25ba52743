//! Relational adapter for MySQL/MariaDB
//!
//! [`MariaBackend`] turns [`SqlQuery`] builders into driver calls. Outside a
//! transaction every batch checks a connection out of the shared pool and
//! releases it when the batch ends. [`MariaBackend::transaction`] hands the
//! closure a scoped clone bound to one dedicated connection; when the closure
//! returns, the clone is marked dead, the transaction is committed or rolled
//! back, and the connection goes back to the pool exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use super::driver::{SqlConnection, SqlDriver};
use crate::error::{DatabaseError, Result};
use crate::query::{Filter, SqlQuery, Statement};
use crate::types::{QueryResult, Record, Row};

/// Result of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlOutput {
	/// Row-returning statement.
	Rows(Vec<Row>),
	/// Mutating statement with its bookkeeping.
	Done(QueryResult),
}

impl SqlOutput {
	pub fn rows(self) -> Result<Vec<Row>> {
		match self {
			SqlOutput::Rows(rows) => Ok(rows),
			SqlOutput::Done(_) => Err(DatabaseError::TypeError(
				"statement did not return rows".to_string(),
			)),
		}
	}

	pub fn done(self) -> Result<QueryResult> {
		match self {
			SqlOutput::Done(result) => Ok(result),
			SqlOutput::Rows(_) => Err(DatabaseError::TypeError(
				"statement returned rows where a result summary was expected".to_string(),
			)),
		}
	}
}

/// Relational adapter over the [`SqlDriver`] seam.
///
/// Cheap to clone: clones share the driver, and a transaction-scoped clone
/// shares its dedicated connection and dead flag with the transaction that
/// created it.
#[derive(Clone)]
pub struct MariaBackend {
	driver: Arc<dyn SqlDriver>,
	// weak so a clone leaked out of a transaction closure cannot keep the
	// pooled connection checked out after the transaction settles
	connection: Option<Weak<Mutex<Box<dyn SqlConnection>>>>,
	dead: Arc<AtomicBool>,
}

impl MariaBackend {
	pub fn new(driver: Arc<dyn SqlDriver>) -> Self {
		Self {
			driver,
			connection: None,
			dead: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Adapter over the shared MySQL/MariaDB pool for `url`.
	#[cfg(feature = "mysql")]
	pub fn mysql(url: impl Into<String>) -> Self {
		Self::new(Arc::new(super::driver::MysqlDriver::new(url)))
	}

	/// True while this instance is the scoped clone inside a transaction.
	pub fn in_transaction(&self) -> bool {
		self.connection.is_some()
	}

	/// Close the underlying pool. The next operation recreates it.
	pub async fn disconnect(&self) -> Result<()> {
		self.driver.disconnect().await
	}

	fn ensure_alive(&self) -> Result<()> {
		if self.dead.load(Ordering::SeqCst) {
			return Err(DatabaseError::Transaction(
				"this adapter belonged to a transaction that has already finished".to_string(),
			));
		}
		Ok(())
	}

	async fn run_statements(
		conn: &mut dyn SqlConnection,
		statements: Vec<Statement>,
	) -> Result<Vec<SqlOutput>> {
		let mut outputs = Vec::with_capacity(statements.len());
		for stmt in statements {
			tracing::debug!(sql = %stmt.sql, params = stmt.params.len(), "executing statement");
			if stmt.sql.starts_with("SELECT") {
				outputs.push(SqlOutput::Rows(conn.query(&stmt.sql, &stmt.params).await?));
			} else {
				outputs.push(SqlOutput::Done(conn.execute(&stmt.sql, &stmt.params).await?));
			}
		}
		Ok(outputs)
	}

	/// Execute a batch of builders on one connection, in order.
	///
	/// Every builder is prepared before anything executes, so a malformed
	/// statement fails the whole batch without touching the database. Inside
	/// a transaction the dedicated connection is reused and NOT released;
	/// outside, a pool connection is checked out for the batch and released
	/// when it completes, success or failure.
	pub async fn execute_all(&self, queries: Vec<SqlQuery>) -> Result<Vec<SqlOutput>> {
		self.ensure_alive()?;
		let statements = queries
			.into_iter()
			.map(SqlQuery::prepare)
			.collect::<Result<Vec<_>>>()?;
		match &self.connection {
			Some(weak) => {
				let shared = weak.upgrade().ok_or_else(|| {
					DatabaseError::Transaction(
						"this adapter belonged to a transaction that has already finished"
							.to_string(),
					)
				})?;
				let mut conn = shared.lock().await;
				Self::run_statements(&mut **conn, statements).await
			}
			None => {
				let mut conn = self.driver.acquire().await?;
				Self::run_statements(&mut *conn, statements).await
			}
		}
	}

	/// Execute one builder.
	pub async fn run(&self, query: SqlQuery) -> Result<SqlOutput> {
		let mut outputs = self.execute_all(vec![query]).await?;
		outputs.pop().ok_or_else(|| {
			DatabaseError::QueryBuild("statement batch produced no output".to_string())
		})
	}

	/// `SELECT * FROM table` narrowed by `filter`.
	pub async fn select(&self, table: &str, filter: impl Into<Filter>) -> Result<Vec<Row>> {
		let query = SqlQuery::new(table).where_clause(filter)?;
		self.run(query).await?.rows()
	}

	/// Insert each record as its own statement, in order.
	pub async fn insert(&self, table: &str, records: Vec<Record>) -> Result<Vec<QueryResult>> {
		if records.is_empty() {
			return Err(DatabaseError::QueryBuild(
				"tried to insert an empty list of records".to_string(),
			));
		}
		let queries = records
			.into_iter()
			.map(|record| SqlQuery::new(table).insert(record))
			.collect::<Result<Vec<_>>>()?;
		self.execute_all(queries)
			.await?
			.into_iter()
			.map(SqlOutput::done)
			.collect()
	}

	/// Update the rows matched by `filter` with the fields in `record`.
	pub async fn update(
		&self,
		table: &str,
		record: Record,
		filter: impl Into<Filter>,
	) -> Result<QueryResult> {
		let query = SqlQuery::new(table).update(record)?.where_clause(filter)?;
		self.run(query).await?.done()
	}

	/// Run one UPDATE per `(record, filter)` pair, in order, on one
	/// connection.
	pub async fn update_multiple(
		&self,
		table: &str,
		updates: Vec<(Record, Filter)>,
	) -> Result<Vec<QueryResult>> {
		let queries = updates
			.into_iter()
			.map(|(record, filter)| SqlQuery::new(table).update(record)?.where_clause(filter))
			.collect::<Result<Vec<_>>>()?;
		self.execute_all(queries)
			.await?
			.into_iter()
			.map(SqlOutput::done)
			.collect()
	}

	/// Delete the rows matched by `filter`.
	pub async fn delete(&self, table: &str, filter: impl Into<Filter>) -> Result<QueryResult> {
		let query = SqlQuery::new(table).delete()?.where_clause(filter)?;
		self.run(query).await?.done()
	}

	/// Count the rows matched by `filter`.
	pub async fn count(&self, table: &str, filter: impl Into<Filter>) -> Result<u64> {
		let query = SqlQuery::new(table).count()?.where_clause(filter)?;
		let rows = self.run(query).await?.rows()?;
		let row = rows
			.into_iter()
			.next()
			.ok_or_else(|| DatabaseError::TypeError("count returned no rows".to_string()))?;
		let count: i64 = row.get("count")?;
		Ok(count as u64)
	}

	/// Run `f` inside a database transaction on one dedicated connection.
	///
	/// The closure receives a scoped clone of this adapter bound to that
	/// connection; everything executed through the clone joins the
	/// transaction. When the closure resolves the transaction is committed
	/// (on `Ok`) or rolled back (on `Err`), the clone is marked dead so a
	/// leaked copy cannot run statements afterwards, and the connection is
	/// released back to the pool exactly once. Scoped clones hold only a
	/// weak handle to the connection, so release happens here even when a
	/// clone escapes the closure.
	pub async fn transaction<T, F>(&self, f: F) -> Result<T>
	where
		T: Send,
		F: for<'a> FnOnce(&'a MariaBackend) -> BoxFuture<'a, Result<T>> + Send,
	{
		self.ensure_alive()?;
		if self.in_transaction() {
			return Err(DatabaseError::Transaction(
				"nested transactions are not supported".to_string(),
			));
		}

		let conn = Arc::new(Mutex::new(self.driver.acquire().await?));
		conn.lock().await.begin().await?;
		tracing::debug!("transaction started");

		let scoped = MariaBackend {
			driver: self.driver.clone(),
			connection: Some(Arc::downgrade(&conn)),
			dead: Arc::new(AtomicBool::new(false)),
		};
		let outcome = f(&scoped).await;
		scoped.dead.store(true, Ordering::SeqCst);

		let mut guard = conn.lock().await;
		match outcome {
			Ok(value) => {
				guard.commit().await?;
				tracing::debug!("transaction committed");
				Ok(value)
			}
			Err(err) => {
				tracing::error!(error = %err, "transaction failed, rolling back");
				if let Err(rollback_err) = guard.rollback().await {
					tracing::error!(error = %rollback_err, "rollback failed");
				}
				Err(err)
			}
		}
	}
}

impl std::fmt::Debug for MariaBackend {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MariaBackend")
			.field("url", &self.driver.url())
			.field("in_transaction", &self.in_transaction())
			.field("dead", &self.dead.load(Ordering::SeqCst))
			.finish()
	}
}
