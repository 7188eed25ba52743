//! Entity mapping layer
//!
//! An [`Entity`] describes how one struct maps to one relational table:
//! its table name, its primary key, its timestamps and its column
//! serialization. A [`Repository`] pairs an entity type with an injected
//! [`MariaBackend`] and carries all persistence verbs, so entity types stay
//! plain data and tests can hand the repository a fake driver.

#[cfg(feature = "mongodb")]
pub mod document;

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backends::MariaBackend;
use crate::error::{DatabaseError, Result};
use crate::query::Filter;
use crate::types::{Record, Row};

/// Anything with an optional persisted identity.
///
/// The association layer is generic over this, so one association type
/// serves both the relational (`i64` key) and document (`String` key)
/// entities.
pub trait Identified {
	type Id: Clone + PartialEq + Send + Sync + 'static;

	/// The persisted id, if this instance has been stored.
	fn ident(&self) -> Option<Self::Id>;
}

/// `created_at` / `updated_at` bookkeeping embedded in every entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
	pub created_at: Option<DateTime<Utc>>,
	pub updated_at: Option<DateTime<Utc>>,
}

impl Timestamps {
	/// Stamp for a write: `created_at` is set once, `updated_at` every time.
	pub fn touch(&mut self) {
		let now = Utc::now();
		if self.created_at.is_none() {
			self.created_at = Some(now);
		}
		self.updated_at = Some(now);
	}

	pub fn from_row(row: &Row) -> Result<Self> {
		Ok(Self {
			created_at: row.get_opt("created_at")?,
			updated_at: row.get_opt("updated_at")?,
		})
	}
}

/// Compile-time mapping contract between a struct and its table.
///
/// `serialize` covers the entity's own columns; the provided
/// [`Entity::serialize_for_write`] stamps and merges the timestamp columns
/// on top, so implementors never handle `created_at`/`updated_at` by hand.
pub trait Entity: Identified<Id = i64> + Send + Sync + Sized {
	/// Table this entity maps to.
	const DATASTORE: &'static str;

	fn id(&self) -> Option<i64>;

	fn set_id(&mut self, id: Option<i64>);

	fn timestamps(&self) -> &Timestamps;

	fn timestamps_mut(&mut self) -> &mut Timestamps;

	/// Own columns only; no id, no timestamps.
	fn serialize(&self) -> Result<Record>;

	fn deserialize(row: &Row) -> Result<Self>;

	/// Serialization used by every write path: touches the timestamps and
	/// merges them into the record.
	fn serialize_for_write(&mut self) -> Result<Record> {
		self.timestamps_mut().touch();
		let mut record = self.serialize()?;
		let stamps = self.timestamps();
		if let Some(created_at) = stamps.created_at {
			record.set("created_at", created_at);
		}
		if let Some(updated_at) = stamps.updated_at {
			record.set("updated_at", updated_at);
		}
		Ok(record)
	}
}

/// Persistence verbs for one entity type over an injected backend.
pub struct Repository<M: Entity> {
	db: MariaBackend,
	_marker: PhantomData<fn() -> M>,
}

impl<M: Entity> Clone for Repository<M> {
	fn clone(&self) -> Self {
		Self::new(self.db.clone())
	}
}

impl<M: Entity> std::fmt::Debug for Repository<M> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Repository")
			.field("table", &M::DATASTORE)
			.field("db", &self.db)
			.finish()
	}
}

impl<M: Entity> Repository<M> {
	pub fn new(db: MariaBackend) -> Self {
		Self {
			db,
			_marker: PhantomData,
		}
	}

	/// The same repository bound to another backend instance. Used to point
	/// persistence at a transaction-scoped adapter clone.
	pub fn bind(&self, db: &MariaBackend) -> Self {
		Self::new(db.clone())
	}

	pub fn backend(&self) -> &MariaBackend {
		&self.db
	}

	/// All entities matching `filter`, in result-set order.
	pub async fn all(&self, filter: impl Into<Filter>) -> Result<Vec<M>> {
		let rows = self.db.select(M::DATASTORE, filter).await?;
		rows.iter().map(M::deserialize).collect()
	}

	/// The single entity matching `filter`.
	///
	/// More than one match is a data smell, not an error: it is logged and
	/// the first row wins. Zero matches is `NotFound`.
	pub async fn find(&self, filter: impl Into<Filter>) -> Result<M> {
		let rows = self.db.select(M::DATASTORE, filter).await?;
		if rows.len() > 1 {
			tracing::warn!(
				table = M::DATASTORE,
				matched = rows.len(),
				"find matched more than one row, returning the first"
			);
		}
		let row = rows.first().ok_or_else(|| {
			DatabaseError::NotFound(format!("no {} row matched the filter", M::DATASTORE))
		})?;
		M::deserialize(row)
	}

	/// Persist a batch of new entities and hand them back with their
	/// generated ids written in, in input order.
	pub async fn insert(&self, mut entities: Vec<M>) -> Result<Vec<M>> {
		let mut records = Vec::with_capacity(entities.len());
		for entity in &mut entities {
			records.push(entity.serialize_for_write()?);
		}
		let results = self.db.insert(M::DATASTORE, records).await?;
		for (entity, result) in entities.iter_mut().zip(&results) {
			match result.last_insert_id {
				Some(id) if id > 0 => entity.set_id(Some(id as i64)),
				_ => tracing::warn!(
					table = M::DATASTORE,
					"insert reported no generated id for an entity"
				),
			}
		}
		Ok(entities)
	}

	/// Insert when the entity has no id yet, update in place otherwise.
	/// Either way the entity is persisted when this returns.
	pub async fn save(&self, entity: &mut M) -> Result<()> {
		match entity.id() {
			Some(id) => {
				let record = entity.serialize_for_write()?;
				self.db.update(M::DATASTORE, record, id).await?;
				Ok(())
			}
			None => {
				let record = entity.serialize_for_write()?;
				let results = self.db.insert(M::DATASTORE, vec![record]).await?;
				if let Some(result) = results.first() {
					match result.last_insert_id {
						Some(id) if id > 0 => entity.set_id(Some(id as i64)),
						_ => tracing::warn!(
							table = M::DATASTORE,
							"insert reported no generated id for a saved entity"
						),
					}
				}
				Ok(())
			}
		}
	}

	/// Reload the entity from its row. `NotFound` when the row is gone.
	pub async fn refresh(&self, entity: &mut M) -> Result<()> {
		let id = entity.id().ok_or_else(|| {
			DatabaseError::TypeError(format!(
				"cannot refresh a {} entity that was never persisted",
				M::DATASTORE
			))
		})?;
		*entity = self.find(id).await?;
		Ok(())
	}

	/// Apply `record` to every row matching `filter`.
	pub async fn update(
		&self,
		record: Record,
		filter: impl Into<Filter>,
	) -> Result<u64> {
		let result = self.db.update(M::DATASTORE, record, filter).await?;
		Ok(result.rows_affected)
	}

	/// Write each persisted entity back to its own row, in order, on one
	/// connection. Unpersisted entities fail the whole batch before any
	/// statement runs.
	pub async fn update_many(&self, entities: &mut [M]) -> Result<()> {
		let mut updates = Vec::with_capacity(entities.len());
		for entity in entities.iter_mut() {
			let id = entity.id().ok_or_else(|| {
				DatabaseError::TypeError(format!(
					"cannot update a {} entity that was never persisted",
					M::DATASTORE
				))
			})?;
			updates.push((entity.serialize_for_write()?, Filter::Id(id)));
		}
		let results = self.db.update_multiple(M::DATASTORE, updates).await?;
		for result in &results {
			if result.rows_affected != 1 {
				tracing::error!(
					table = M::DATASTORE,
					rows_affected = result.rows_affected,
					"update affected an unexpected number of rows"
				);
			}
		}
		Ok(())
	}

	/// Delete the entity's own row and clear its id so it reads as new.
	///
	/// An entity without an id has nothing to delete; that is logged and
	/// ignored rather than treated as an error.
	pub async fn remove(&self, entity: &mut M) -> Result<()> {
		let Some(id) = entity.id() else {
			tracing::warn!(
				table = M::DATASTORE,
				"remove called on an entity that was never persisted"
			);
			return Ok(());
		};
		let result = self.db.delete(M::DATASTORE, id).await?;
		if result.rows_affected != 1 {
			tracing::error!(
				table = M::DATASTORE,
				id,
				rows_affected = result.rows_affected,
				"delete affected an unexpected number of rows"
			);
		}
		entity.set_id(None);
		Ok(())
	}

	/// Delete every row matching `filter`, returning the count.
	pub async fn delete(&self, filter: impl Into<Filter>) -> Result<u64> {
		let result = self.db.delete(M::DATASTORE, filter).await?;
		Ok(result.rows_affected)
	}

	/// Count the rows matching `filter`.
	pub async fn count(&self, filter: impl Into<Filter>) -> Result<u64> {
		self.db.count(M::DATASTORE, filter).await
	}
}
