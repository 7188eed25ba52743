//! Embedded one-to-many child list

use crate::error::Result;
use crate::model::{Entity, Identified, Repository};
use crate::types::Record;

/// Child records of one parent, keyed by a foreign-key column.
///
/// Unlike [`super::Association`], which references rows owned elsewhere, a
/// collection owns its children: they are loaded by the parent's foreign
/// key and saved back as a batch.
#[derive(Debug, Clone)]
pub struct Collection<M: Identified> {
	foreign_key: String,
	records: Vec<M>,
}

impl<M: Identified> Collection<M> {
	pub fn new(foreign_key: impl Into<String>) -> Self {
		Self {
			foreign_key: foreign_key.into(),
			records: Vec::new(),
		}
	}

	pub fn foreign_key(&self) -> &str {
		&self.foreign_key
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &M> {
		self.records.iter()
	}

	pub fn records(&self) -> &[M] {
		&self.records
	}

	pub fn push(&mut self, record: M) {
		self.records.push(record);
	}

	/// Fold incoming records in, de-duplicating by id. A persisted record
	/// replaces the held copy with the same id; records without an id are
	/// always appended.
	pub fn merge(&mut self, incoming: Vec<M>) {
		for record in incoming {
			match record.ident() {
				Some(id) => {
					if let Some(existing) = self
						.records
						.iter_mut()
						.find(|held| held.ident() == Some(id.clone()))
					{
						*existing = record;
					} else {
						self.records.push(record);
					}
				}
				None => self.records.push(record),
			}
		}
	}
}

impl<M: Entity> Collection<M> {
	/// Load every child row whose foreign key matches `parent_id`, merging
	/// into the held records.
	pub async fn load(&mut self, repo: &Repository<M>, parent_id: i64) -> Result<()> {
		let mut filter = Record::new();
		filter.set(self.foreign_key.clone(), parent_id);
		let children = repo.all(filter).await?;
		self.merge(children);
		Ok(())
	}

	/// Persist every held child. Children carry the foreign-key column as a
	/// regular field, so stamping it is the caller's job.
	pub async fn save(&mut self, repo: &Repository<M>) -> Result<()> {
		for record in &mut self.records {
			repo.save(record).await?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Clone, PartialEq)]
	struct Stock {
		id: Option<i64>,
		quantity: i64,
	}

	impl Identified for Stock {
		type Id = i64;

		fn ident(&self) -> Option<i64> {
			self.id
		}
	}

	#[test]
	fn merge_replaces_records_with_matching_ids() {
		let mut collection: Collection<Stock> = Collection::new("warehouse_id");
		collection.push(Stock {
			id: Some(1),
			quantity: 4,
		});

		collection.merge(vec![
			Stock {
				id: Some(1),
				quantity: 9,
			},
			Stock {
				id: Some(2),
				quantity: 1,
			},
		]);

		assert_eq!(collection.len(), 2);
		assert_eq!(collection.records()[0].quantity, 9);
	}

	#[test]
	fn merge_always_appends_unpersisted_records() {
		let mut collection: Collection<Stock> = Collection::new("warehouse_id");
		collection.merge(vec![
			Stock {
				id: None,
				quantity: 1,
			},
			Stock {
				id: None,
				quantity: 2,
			},
		]);

		assert_eq!(collection.len(), 2);
	}
}
