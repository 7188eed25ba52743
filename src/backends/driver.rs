//! Driver seam for the relational adapter
//!
//! [`SqlDriver`] hands out connections, [`SqlConnection`] runs statements on
//! one checked-out connection. The production implementation wraps the
//! sqlx MySQL pool; tests plug in an in-memory fake.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{QueryResult, QueryValue, Row};

/// One checked-out database connection.
///
/// Dropping the box releases the connection back to its pool; implementors
/// must make that release idempotent and exactly-once.
#[async_trait]
pub trait SqlConnection: Send {
	/// Run a row-returning statement.
	async fn query(&mut self, sql: &str, params: &[QueryValue]) -> Result<Vec<Row>>;

	/// Run a statement and return affected-row/insert-id bookkeeping.
	async fn execute(&mut self, sql: &str, params: &[QueryValue]) -> Result<QueryResult>;

	async fn begin(&mut self) -> Result<()>;

	async fn commit(&mut self) -> Result<()>;

	async fn rollback(&mut self) -> Result<()>;
}

/// Hands out connections for one logical database URL.
#[async_trait]
pub trait SqlDriver: Send + Sync {
	/// The URL this driver is bound to, password-masked for display.
	fn url(&self) -> String;

	/// Check a connection out of the underlying pool.
	async fn acquire(&self) -> Result<Box<dyn SqlConnection>>;

	/// Close the underlying pool. The next acquire recreates it.
	async fn disconnect(&self) -> Result<()>;
}

#[cfg(feature = "mysql")]
pub use mysql_driver::MysqlDriver;

#[cfg(feature = "mysql")]
mod mysql_driver {
	use async_trait::async_trait;
	use sqlx::mysql::MySqlRow;
	use sqlx::pool::PoolConnection;
	use sqlx::{Column, Executor, MySql, Row as SqlxRow};

	use super::{SqlConnection, SqlDriver};
	use crate::error::Result;
	use crate::pool::{mask_url_password, PoolConfig, PoolManager};
	use crate::types::{QueryResult, QueryValue, Row};

	/// sqlx-backed driver for MySQL/MariaDB.
	pub struct MysqlDriver {
		url: String,
		config: PoolConfig,
	}

	impl MysqlDriver {
		pub fn new(url: impl Into<String>) -> Self {
			Self {
				url: url.into(),
				config: PoolConfig::default(),
			}
		}

		pub fn with_config(url: impl Into<String>, config: PoolConfig) -> Self {
			Self {
				url: url.into(),
				config,
			}
		}
	}

	#[async_trait]
	impl SqlDriver for MysqlDriver {
		fn url(&self) -> String {
			mask_url_password(&self.url)
		}

		async fn acquire(&self) -> Result<Box<dyn SqlConnection>> {
			let conn = PoolManager::connect(&self.url, &self.config).await?;
			Ok(Box::new(MysqlConnection { conn }))
		}

		async fn disconnect(&self) -> Result<()> {
			PoolManager::disconnect(&self.url).await;
			Ok(())
		}
	}

	struct MysqlConnection {
		conn: PoolConnection<MySql>,
	}

	fn bind_value<'q>(
		query: sqlx::query::Query<'q, MySql, sqlx::mysql::MySqlArguments>,
		value: &'q QueryValue,
	) -> sqlx::query::Query<'q, MySql, sqlx::mysql::MySqlArguments> {
		match value {
			QueryValue::Null => query.bind(None::<i64>),
			QueryValue::Bool(b) => query.bind(b),
			QueryValue::Int(i) => query.bind(i),
			QueryValue::Float(f) => query.bind(f),
			QueryValue::String(s) => query.bind(s),
			QueryValue::Bytes(b) => query.bind(b),
			QueryValue::Timestamp(dt) => query.bind(dt),
			// MySQL has no native uuid column type; bind the canonical text form
			QueryValue::Uuid(u) => query.bind(u.to_string()),
		}
	}

	fn convert_row(mysql_row: MySqlRow) -> Row {
		let mut row = Row::new();
		for column in mysql_row.columns() {
			let name = column.name();
			let value = if let Ok(v) = mysql_row.try_get::<i64, _>(name) {
				QueryValue::Int(v)
			} else if let Ok(v) = mysql_row.try_get::<bool, _>(name) {
				QueryValue::Bool(v)
			} else if let Ok(v) = mysql_row.try_get::<f64, _>(name) {
				QueryValue::Float(v)
			} else if let Ok(v) = mysql_row.try_get::<String, _>(name) {
				QueryValue::String(v)
			} else if let Ok(v) = mysql_row.try_get::<chrono::DateTime<chrono::Utc>, _>(name) {
				QueryValue::Timestamp(v)
			} else if let Ok(v) = mysql_row.try_get::<chrono::NaiveDateTime, _>(name) {
				// DATETIME columns carry no zone; treat them as UTC
				QueryValue::Timestamp(chrono::DateTime::from_naive_utc_and_offset(v, chrono::Utc))
			} else if let Ok(v) = mysql_row.try_get::<Vec<u8>, _>(name) {
				// binary-collated text columns surface as blobs; recover UTF-8
				match String::from_utf8(v) {
					Ok(s) => QueryValue::String(s),
					Err(e) => QueryValue::Bytes(e.into_bytes()),
				}
			} else {
				QueryValue::Null
			};
			row.insert(name, value);
		}
		row
	}

	#[async_trait]
	impl SqlConnection for MysqlConnection {
		async fn query(&mut self, sql: &str, params: &[QueryValue]) -> Result<Vec<Row>> {
			let mut query = sqlx::query(sql);
			for param in params {
				query = bind_value(query, param);
			}
			let rows = query.fetch_all(&mut *self.conn).await?;
			Ok(rows.into_iter().map(convert_row).collect())
		}

		async fn execute(&mut self, sql: &str, params: &[QueryValue]) -> Result<QueryResult> {
			let mut query = sqlx::query(sql);
			for param in params {
				query = bind_value(query, param);
			}
			let result = query.execute(&mut *self.conn).await?;
			Ok(QueryResult {
				rows_affected: result.rows_affected(),
				last_insert_id: Some(result.last_insert_id()),
			})
		}

		// BEGIN/COMMIT/ROLLBACK go over the text protocol; the prepared
		// statement path does not accept them on all server versions
		async fn begin(&mut self) -> Result<()> {
			self.conn.execute("BEGIN").await?;
			Ok(())
		}

		async fn commit(&mut self) -> Result<()> {
			self.conn.execute("COMMIT").await?;
			Ok(())
		}

		async fn rollback(&mut self) -> Result<()> {
			self.conn.execute("ROLLBACK").await?;
			Ok(())
		}
	}
}
