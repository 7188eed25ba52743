//! Document entity mapping for the MongoDB backend
//!
//! The serde derive does the field work; this layer only owns the identity
//! remap: the entity's `id: Option<String>` field travels as `_id` on the
//! wire, upgraded to an `ObjectId` when it parses as one.

use std::marker::PhantomData;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use futures::TryStreamExt;
use mongodb::Cursor;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backends::{DocFilter, MongoBackend};
use crate::error::{DatabaseError, Result};
use crate::model::Identified;

/// Mapping contract between a serde-serializable struct and a collection.
pub trait DocumentEntity:
	Identified<Id = String> + Serialize + DeserializeOwned + Send + Sync + Sized
{
	/// Collection this entity maps to.
	const COLLECTION: &'static str;

	fn id(&self) -> Option<String>;

	fn set_id(&mut self, id: Option<String>);

	/// Wire form: serde fields with the `id` field remapped to `_id`.
	fn to_document(&self) -> Result<Document> {
		let mut doc = bson::serialize_to_document(self)?;
		doc.remove("id");
		if let Some(id) = self.id() {
			doc.insert("_id", id_to_bson(id));
		}
		Ok(doc)
	}

	/// Inverse of [`DocumentEntity::to_document`].
	fn from_document(mut doc: Document) -> Result<Self> {
		if let Some(id) = doc.remove("_id") {
			doc.insert("id", bson_to_id(id));
		}
		Ok(bson::deserialize_from_document(doc)?)
	}
}

fn id_to_bson(id: String) -> Bson {
	match ObjectId::parse_str(&id) {
		Ok(oid) => Bson::ObjectId(oid),
		Err(_) => Bson::String(id),
	}
}

fn bson_to_id(id: Bson) -> String {
	match id {
		Bson::ObjectId(oid) => oid.to_hex(),
		Bson::String(s) => s,
		other => other.to_string(),
	}
}

/// Persistence verbs for one document entity type.
pub struct DocumentRepository<M: DocumentEntity> {
	db: MongoBackend,
	_marker: PhantomData<fn() -> M>,
}

impl<M: DocumentEntity> Clone for DocumentRepository<M> {
	fn clone(&self) -> Self {
		Self::new(self.db.clone())
	}
}

impl<M: DocumentEntity> std::fmt::Debug for DocumentRepository<M> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentRepository")
			.field("collection", &M::COLLECTION)
			.field("db", &self.db)
			.finish()
	}
}

impl<M: DocumentEntity> DocumentRepository<M> {
	pub fn new(db: MongoBackend) -> Self {
		Self {
			db,
			_marker: PhantomData,
		}
	}

	pub fn backend(&self) -> &MongoBackend {
		&self.db
	}

	/// The single entity matching `filter`; `NotFound` on zero matches.
	pub async fn find(&self, filter: impl Into<DocFilter>) -> Result<M> {
		let doc = self
			.db
			.select_one(M::COLLECTION, filter)
			.await?
			.ok_or_else(|| {
				DatabaseError::NotFound(format!(
					"no {} document matched the filter",
					M::COLLECTION
				))
			})?;
		M::from_document(doc)
	}

	/// Every matching entity, materialized. For large result sets prefer
	/// [`DocumentRepository::stream`], which never holds the whole set in
	/// memory.
	pub async fn all(&self, filter: impl Into<DocFilter>) -> Result<Vec<M>> {
		let docs: Vec<Document> = self
			.db
			.select(M::COLLECTION, filter)
			.await?
			.try_collect()
			.await?;
		docs.into_iter().map(M::from_document).collect()
	}

	/// The raw unpolled cursor over matching documents.
	pub async fn stream(&self, filter: impl Into<DocFilter>) -> Result<Cursor<Document>> {
		self.db.select(M::COLLECTION, filter).await
	}

	/// Persist a batch of new entities and hand them back with their
	/// generated ids written in, in input order.
	pub async fn insert(&self, mut entities: Vec<M>) -> Result<Vec<M>> {
		let docs = entities
			.iter()
			.map(M::to_document)
			.collect::<Result<Vec<_>>>()?;
		let ids = self.db.insert_many(M::COLLECTION, docs).await?;
		for (entity, id) in entities.iter_mut().zip(ids) {
			entity.set_id(Some(id));
		}
		Ok(entities)
	}

	/// Insert when the entity has no id yet, update by `_id` otherwise.
	pub async fn save(&self, entity: &mut M) -> Result<()> {
		match entity.id() {
			Some(id) => {
				let mut doc = entity.to_document()?;
				// _id is immutable; it selects, it is not $set
				doc.remove("_id");
				self.db.update(M::COLLECTION, doc, DocFilter::Id(id)).await?;
				Ok(())
			}
			None => {
				let doc = entity.to_document()?;
				let id = self.db.insert_one(M::COLLECTION, doc).await?;
				entity.set_id(Some(id));
				Ok(())
			}
		}
	}

	/// `$set` the fields of `update` on every matching document.
	pub async fn update(&self, update: Document, filter: impl Into<DocFilter>) -> Result<u64> {
		self.db.update(M::COLLECTION, update, filter).await
	}

	/// Delete every matching document, returning the count.
	pub async fn delete(&self, filter: impl Into<DocFilter>) -> Result<u64> {
		self.db.delete(M::COLLECTION, filter).await
	}

	/// Count the matching documents.
	pub async fn count(&self, filter: impl Into<DocFilter>) -> Result<u64> {
		self.db.count(M::COLLECTION, filter).await
	}
}

#[cfg(test)]
mod tests {
	use bson::doc;
	use serde::Deserialize;

	use super::*;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Note {
		#[serde(skip_serializing_if = "Option::is_none")]
		id: Option<String>,
		title: String,
		pinned: bool,
	}

	impl Identified for Note {
		type Id = String;

		fn ident(&self) -> Option<String> {
			self.id.clone()
		}
	}

	impl DocumentEntity for Note {
		const COLLECTION: &'static str = "notes";

		fn id(&self) -> Option<String> {
			self.id.clone()
		}

		fn set_id(&mut self, id: Option<String>) {
			self.id = id;
		}
	}

	const OID: &str = "507f1f77bcf86cd799439011";

	#[test]
	fn to_document_moves_id_to_underscore_id() {
		let note = Note {
			id: Some(OID.to_string()),
			title: "groceries".to_string(),
			pinned: true,
		};

		let doc = note.to_document().unwrap();

		assert_eq!(doc.get_object_id("_id").unwrap().to_hex(), OID);
		assert!(doc.get("id").is_none());
		assert_eq!(doc.get_str("title").unwrap(), "groceries");
	}

	#[test]
	fn unsaved_entity_serializes_without_an_id() {
		let note = Note {
			id: None,
			title: "draft".to_string(),
			pinned: false,
		};

		let doc = note.to_document().unwrap();

		assert!(doc.get("_id").is_none());
		assert!(doc.get("id").is_none());
	}

	#[test]
	fn from_document_round_trips_through_the_wire_form() {
		let note = Note {
			id: Some(OID.to_string()),
			title: "groceries".to_string(),
			pinned: true,
		};

		let back = Note::from_document(note.to_document().unwrap()).unwrap();

		assert_eq!(back, note);
	}

	#[test]
	fn from_document_keeps_non_object_ids_as_strings() {
		let doc = doc! { "_id": "legacy-key", "title": "old", "pinned": false };

		let back = Note::from_document(doc).unwrap();

		assert_eq!(back.id.as_deref(), Some("legacy-key"));
	}
}
