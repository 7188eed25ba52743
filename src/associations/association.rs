//! Ordered, lazily-populated reference list

use serde::{Serialize, Serializer};

use super::EntityStore;
use crate::error::{DatabaseError, Result};
use crate::model::Identified;

/// An ordered list of references to entities of one type.
///
/// The ids are the source of truth; the populated entities are a cache laid
/// over them. Population always happens with exactly one batched fetch, so
/// an association with a thousand ids costs one round trip, not a thousand.
#[derive(Debug, Clone)]
pub struct Association<M: Identified> {
	ids: Vec<M::Id>,
	slots: Vec<Option<M>>,
}

impl<M: Identified> Association<M> {
	pub fn new(ids: Vec<M::Id>) -> Self {
		let slots = ids.iter().map(|_| None).collect();
		Self { ids, slots }
	}

	pub fn empty() -> Self {
		Self::new(Vec::new())
	}

	pub fn ids(&self) -> &[M::Id] {
		&self.ids
	}

	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}

	/// The populated entity at `index`, if population reached it.
	pub fn get(&self, index: usize) -> Option<&M> {
		self.slots.get(index).and_then(Option::as_ref)
	}

	/// True once every referenced entity is populated.
	pub fn is_populated(&self) -> bool {
		self.slots.iter().all(Option::is_some)
	}

	/// The populated entities, in id order, skipping unresolved slots.
	pub fn iter(&self) -> impl Iterator<Item = &M> {
		self.slots.iter().filter_map(Option::as_ref)
	}

	/// Append a reference by id.
	pub fn push_id(&mut self, id: M::Id) {
		self.ids.push(id);
		self.slots.push(None);
	}

	/// Append a persisted entity, keeping it populated.
	pub fn push(&mut self, entity: M) -> Result<()> {
		let id = entity.ident().ok_or_else(|| {
			DatabaseError::TypeError(
				"cannot add an unpersisted entity to an association".to_string(),
			)
		})?;
		self.ids.push(id);
		self.slots.push(Some(entity));
		Ok(())
	}
}

impl<M: Identified + Clone> Association<M> {
	/// Resolve every id against the store with one batched fetch, laying the
	/// results over the slots by id. Ids with no matching entity leave their
	/// slot empty; that is logged, not fatal.
	pub async fn populate(&mut self, store: &impl EntityStore<M>) -> Result<()> {
		if self.ids.is_empty() {
			return Ok(());
		}
		let fetched = store.fetch_by_ids(&self.ids).await?;
		if fetched.len() != self.ids.len() {
			tracing::warn!(
				expected = self.ids.len(),
				fetched = fetched.len(),
				"association fetch resolved fewer entities than ids"
			);
		}
		for (slot, id) in self.slots.iter_mut().zip(&self.ids) {
			*slot = fetched
				.iter()
				.find(|entity| entity.ident().as_ref() == Some(id))
				.cloned();
		}
		Ok(())
	}

	/// Persist every populated entity through the store.
	pub async fn save(&mut self, store: &impl EntityStore<M>) -> Result<()> {
		for (slot, id) in self.slots.iter_mut().zip(self.ids.iter_mut()) {
			if let Some(entity) = slot {
				store.persist(entity).await?;
				if let Some(new_id) = entity.ident() {
					*id = new_id;
				}
			}
		}
		Ok(())
	}

	/// Delete every referenced entity in one batched call, emptying the
	/// association.
	pub async fn delete(&mut self, store: &impl EntityStore<M>) -> Result<u64> {
		if self.ids.is_empty() {
			return Ok(0);
		}
		let removed = store.remove_ids(&self.ids).await?;
		self.ids.clear();
		self.slots.clear();
		Ok(removed)
	}
}

impl<M: Identified> From<Vec<M::Id>> for Association<M> {
	fn from(ids: Vec<M::Id>) -> Self {
		Self::new(ids)
	}
}

impl<M: Identified> Default for Association<M> {
	fn default() -> Self {
		Self::empty()
	}
}

/// The wire form is always the ordered id list, populated or not.
impl<M: Identified> Serialize for Association<M>
where
	M::Id: Serialize,
{
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		self.ids.serialize(serializer)
	}
}
