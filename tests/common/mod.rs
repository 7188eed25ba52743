//! Shared scripted driver and entities for the integration tests.
//!
//! The driver records every statement and serves canned responses, so the
//! full adapter/repository stack runs without a server and every test can
//! assert the exact SQL that would have hit the wire.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use modelkit::prelude::*;

/// Shared state between a [`FakeDriver`] and every connection it hands out.
#[derive(Default)]
pub struct Script {
	statements: Mutex<Vec<(String, Vec<QueryValue>)>>,
	canned_rows: Mutex<VecDeque<Vec<Row>>>,
	canned_results: Mutex<VecDeque<QueryResult>>,
	next_id: AtomicU64,
	fail_on: Mutex<Option<String>>,
	pub acquired: AtomicUsize,
	pub released: AtomicUsize,
}

impl Script {
	/// Queue the rows the next row-returning statement answers with.
	pub fn push_rows(&self, rows: Vec<Row>) {
		self.canned_rows.lock().unwrap().push_back(rows);
	}

	/// Queue the summary the next mutating statement answers with.
	pub fn push_result(&self, rows_affected: u64) {
		self.canned_results.lock().unwrap().push_back(QueryResult {
			rows_affected,
			last_insert_id: None,
		});
	}

	/// Make any statement containing `trigger` fail.
	pub fn fail_on(&self, trigger: &str) {
		*self.fail_on.lock().unwrap() = Some(trigger.to_string());
	}

	/// Every statement executed so far, in order.
	pub fn sql(&self) -> Vec<String> {
		self.statements
			.lock()
			.unwrap()
			.iter()
			.map(|(sql, _)| sql.clone())
			.collect()
	}

	/// The parameters of the `index`-th statement.
	pub fn params(&self, index: usize) -> Vec<QueryValue> {
		self.statements.lock().unwrap()[index].1.clone()
	}

	fn record(&self, sql: &str, params: &[QueryValue]) -> modelkit::error::Result<()> {
		self.statements
			.lock()
			.unwrap()
			.push((sql.to_string(), params.to_vec()));
		if let Some(trigger) = self.fail_on.lock().unwrap().as_deref() {
			if sql.contains(trigger) {
				return Err(DatabaseError::Connection("scripted failure".to_string()));
			}
		}
		Ok(())
	}
}

pub struct FakeDriver {
	script: Arc<Script>,
}

struct FakeConnection {
	script: Arc<Script>,
}

impl Drop for FakeConnection {
	fn drop(&mut self) {
		self.script.released.fetch_add(1, Ordering::SeqCst);
	}
}

#[async_trait]
impl SqlConnection for FakeConnection {
	async fn query(&mut self, sql: &str, params: &[QueryValue]) -> modelkit::error::Result<Vec<Row>> {
		self.script.record(sql, params)?;
		Ok(self
			.script
			.canned_rows
			.lock()
			.unwrap()
			.pop_front()
			.unwrap_or_default())
	}

	async fn execute(
		&mut self,
		sql: &str,
		params: &[QueryValue],
	) -> modelkit::error::Result<QueryResult> {
		self.script.record(sql, params)?;
		if let Some(canned) = self.script.canned_results.lock().unwrap().pop_front() {
			return Ok(canned);
		}
		Ok(QueryResult {
			rows_affected: 1,
			last_insert_id: Some(self.script.next_id.fetch_add(1, Ordering::SeqCst) + 1),
		})
	}

	async fn begin(&mut self) -> modelkit::error::Result<()> {
		self.script.record("BEGIN", &[])
	}

	async fn commit(&mut self) -> modelkit::error::Result<()> {
		self.script.record("COMMIT", &[])
	}

	async fn rollback(&mut self) -> modelkit::error::Result<()> {
		self.script.record("ROLLBACK", &[])
	}
}

#[async_trait]
impl SqlDriver for FakeDriver {
	fn url(&self) -> String {
		"fake://integration".to_string()
	}

	async fn acquire(&self) -> modelkit::error::Result<Box<dyn SqlConnection>> {
		self.script.acquired.fetch_add(1, Ordering::SeqCst);
		Ok(Box::new(FakeConnection {
			script: self.script.clone(),
		}))
	}

	async fn disconnect(&self) -> modelkit::error::Result<()> {
		Ok(())
	}
}

/// Route crate logs to the test harness, filtered by `RUST_LOG`. Idempotent,
/// so every test can go through it.
fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// A backend wired to a fresh scripted driver.
pub fn scripted_backend() -> (Arc<Script>, MariaBackend) {
	init_tracing();
	let script = Arc::new(Script::default());
	let backend = MariaBackend::new(Arc::new(FakeDriver {
		script: script.clone(),
	}));
	(script, backend)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Product {
	pub id: Option<i64>,
	pub name: String,
	pub price: f64,
	pub stamps: Timestamps,
}

impl Product {
	pub fn new(name: &str, price: f64) -> Self {
		Self {
			name: name.to_string(),
			price,
			..Self::default()
		}
	}
}

impl Identified for Product {
	type Id = i64;

	fn ident(&self) -> Option<i64> {
		self.id
	}
}

impl Entity for Product {
	const DATASTORE: &'static str = "products";

	fn id(&self) -> Option<i64> {
		self.id
	}

	fn set_id(&mut self, id: Option<i64>) {
		self.id = id;
	}

	fn timestamps(&self) -> &Timestamps {
		&self.stamps
	}

	fn timestamps_mut(&mut self) -> &mut Timestamps {
		&mut self.stamps
	}

	fn serialize(&self) -> Result<Record> {
		let mut record = Record::new();
		record.set("name", self.name.as_str());
		record.set("price", self.price);
		Ok(record)
	}

	fn deserialize(row: &Row) -> Result<Self> {
		Ok(Self {
			id: row.get_opt("id")?,
			name: row.get("name")?,
			price: row.get("price")?,
			stamps: Timestamps::from_row(row)?,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Warehouse {
	pub id: Option<i64>,
	pub location: String,
	pub stamps: Timestamps,
}

impl Identified for Warehouse {
	type Id = i64;

	fn ident(&self) -> Option<i64> {
		self.id
	}
}

impl Entity for Warehouse {
	const DATASTORE: &'static str = "warehouses";

	fn id(&self) -> Option<i64> {
		self.id
	}

	fn set_id(&mut self, id: Option<i64>) {
		self.id = id;
	}

	fn timestamps(&self) -> &Timestamps {
		&self.stamps
	}

	fn timestamps_mut(&mut self) -> &mut Timestamps {
		&mut self.stamps
	}

	fn serialize(&self) -> Result<Record> {
		let mut record = Record::new();
		record.set("location", self.location.as_str());
		Ok(record)
	}

	fn deserialize(row: &Row) -> Result<Self> {
		Ok(Self {
			id: row.get_opt("id")?,
			location: row.get("location")?,
			stamps: Timestamps::from_row(row)?,
		})
	}
}

pub fn product_row(id: i64, name: &str, price: f64) -> Row {
	let mut row = Row::new();
	row.insert("id", QueryValue::Int(id));
	row.insert("name", QueryValue::String(name.to_string()));
	row.insert("price", QueryValue::Float(price));
	row
}

pub fn count_row(count: i64) -> Row {
	let mut row = Row::new();
	row.insert("count", QueryValue::Int(count));
	row
}
