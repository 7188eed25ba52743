//! Document adapter for MongoDB
//!
//! One [`mongodb::Client`] per URL, shared process-wide the same way the
//! relational side shares pools. Reads hand back the driver cursor unpolled,
//! so no document crosses the wire until the caller streams it.
//!
//! This adapter has no transaction support; multi-document atomicity is a
//! relational concern here.

use bson::oid::ObjectId;
use bson::{doc, Bson, Document};
use dashmap::DashMap;
use mongodb::{Client, Cursor, Database};
use once_cell::sync::Lazy;

use crate::error::{DatabaseError, Result};
use crate::pool::mask_url_password;

static CLIENTS: Lazy<DashMap<String, Client>> = Lazy::new(DashMap::new);

/// Typed normalization of the filter forms a document query accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum DocFilter {
	/// Matches every document.
	All,
	/// Primary-key equality on `_id`.
	Id(String),
	/// Primary-key membership on `_id`.
	Ids(Vec<String>),
	/// Arbitrary filter document, normalized by [`MongoBackend::transform_query`].
	Doc(Document),
}

impl From<&str> for DocFilter {
	fn from(id: &str) -> Self {
		DocFilter::Id(id.to_string())
	}
}

impl From<String> for DocFilter {
	fn from(id: String) -> Self {
		DocFilter::Id(id)
	}
}

impl From<Vec<String>> for DocFilter {
	fn from(ids: Vec<String>) -> Self {
		DocFilter::Ids(ids)
	}
}

impl From<Document> for DocFilter {
	fn from(doc: Document) -> Self {
		DocFilter::Doc(doc)
	}
}

/// Document adapter bound to one URL and one database name.
#[derive(Debug, Clone)]
pub struct MongoBackend {
	url: String,
	database: String,
}

impl MongoBackend {
	pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			database: database.into(),
		}
	}

	async fn client(&self) -> Result<Client> {
		if let Some(existing) = CLIENTS.get(&self.url) {
			return Ok(existing.clone());
		}
		let client = Client::with_uri_str(&self.url).await.map_err(|e| {
			DatabaseError::Connection(format!(
				"could not connect to {}: {}",
				mask_url_password(&self.url),
				e
			))
		})?;
		tracing::info!(url = %mask_url_password(&self.url), "creating mongodb client");
		// a concurrent caller may have won the race; keep theirs
		let entry = CLIENTS.entry(self.url.clone()).or_insert(client);
		Ok(entry.clone())
	}

	async fn db(&self) -> Result<Database> {
		Ok(self.client().await?.database(&self.database))
	}

	/// Drop the shared client for this URL. The next operation recreates it.
	pub async fn disconnect(&self) {
		if let Some((_, client)) = CLIENTS.remove(&self.url) {
			tracing::info!(url = %mask_url_password(&self.url), "shutting down mongodb client");
			client.shutdown().await;
		}
	}

	/// Normalize an application-shaped filter into driver terms.
	///
	/// `id` keys become `_id`, string ids that parse as ObjectIds are
	/// upgraded to [`ObjectId`] values, and array values become `$in`
	/// membership tests.
	pub fn transform_query(filter: Document) -> Document {
		let mut out = Document::new();
		for (key, value) in filter {
			let key = if key == "id" { "_id".to_string() } else { key };
			let value = match value {
				Bson::Array(items) => {
					let items = if key == "_id" {
						items.into_iter().map(Self::normalize_id).collect()
					} else {
						items
					};
					Bson::Document(doc! { "$in": items })
				}
				other if key == "_id" => Self::normalize_id(other),
				other => other,
			};
			out.insert(key, value);
		}
		out
	}

	fn normalize_id(value: Bson) -> Bson {
		match value {
			Bson::String(s) => match ObjectId::parse_str(&s) {
				Ok(oid) => Bson::ObjectId(oid),
				Err(_) => {
					tracing::warn!(id = %s, "id does not parse as an ObjectId, matching it as a plain string");
					Bson::String(s)
				}
			},
			other => other,
		}
	}

	fn render_filter(filter: DocFilter) -> Document {
		match filter {
			DocFilter::All => Document::new(),
			DocFilter::Id(id) => doc! { "_id": Self::normalize_id(Bson::String(id)) },
			DocFilter::Ids(ids) => {
				let ids: Vec<Bson> = ids
					.into_iter()
					.map(|id| Self::normalize_id(Bson::String(id)))
					.collect();
				doc! { "_id": { "$in": ids } }
			}
			DocFilter::Doc(doc) => Self::transform_query(doc),
		}
	}

	/// Find matching documents, returning the cursor unpolled.
	pub async fn select(
		&self,
		collection: &str,
		filter: impl Into<DocFilter>,
	) -> Result<Cursor<Document>> {
		let filter = Self::render_filter(filter.into());
		tracing::debug!(collection, filter = %filter, "mongodb find");
		let cursor = self
			.db()
			.await?
			.collection::<Document>(collection)
			.find(filter)
			.await?;
		Ok(cursor)
	}

	/// Find one matching document.
	pub async fn select_one(
		&self,
		collection: &str,
		filter: impl Into<DocFilter>,
	) -> Result<Option<Document>> {
		let filter = Self::render_filter(filter.into());
		let found = self
			.db()
			.await?
			.collection::<Document>(collection)
			.find_one(filter)
			.await?;
		Ok(found)
	}

	/// Insert one document, returning its id in hex form.
	pub async fn insert_one(&self, collection: &str, document: Document) -> Result<String> {
		let result = self
			.db()
			.await?
			.collection::<Document>(collection)
			.insert_one(document)
			.await?;
		Ok(Self::id_to_string(result.inserted_id))
	}

	/// Insert a batch of documents, returning ids in input order.
	pub async fn insert_many(
		&self,
		collection: &str,
		documents: Vec<Document>,
	) -> Result<Vec<String>> {
		if documents.is_empty() {
			return Err(DatabaseError::QueryBuild(
				"tried to insert an empty list of documents".to_string(),
			));
		}
		let count = documents.len();
		let result = self
			.db()
			.await?
			.collection::<Document>(collection)
			.insert_many(documents)
			.await?;
		// inserted_ids is keyed by input index
		let mut ids = Vec::with_capacity(count);
		for index in 0..count {
			let id = result.inserted_ids.get(&index).cloned().ok_or_else(|| {
				DatabaseError::Serialization(format!("no id reported for inserted document {}", index))
			})?;
			ids.push(Self::id_to_string(id));
		}
		Ok(ids)
	}

	/// `$set` the fields of `update` on every matching document.
	pub async fn update(
		&self,
		collection: &str,
		update: Document,
		filter: impl Into<DocFilter>,
	) -> Result<u64> {
		let filter = Self::render_filter(filter.into());
		let result = self
			.db()
			.await?
			.collection::<Document>(collection)
			.update_many(filter, doc! { "$set": update })
			.await?;
		Ok(result.modified_count)
	}

	/// Delete every matching document.
	pub async fn delete(&self, collection: &str, filter: impl Into<DocFilter>) -> Result<u64> {
		let filter = Self::render_filter(filter.into());
		let result = self
			.db()
			.await?
			.collection::<Document>(collection)
			.delete_many(filter)
			.await?;
		Ok(result.deleted_count)
	}

	/// Count matching documents.
	pub async fn count(&self, collection: &str, filter: impl Into<DocFilter>) -> Result<u64> {
		let filter = Self::render_filter(filter.into());
		let count = self
			.db()
			.await?
			.collection::<Document>(collection)
			.count_documents(filter)
			.await?;
		Ok(count)
	}

	fn id_to_string(id: Bson) -> String {
		match id {
			Bson::ObjectId(oid) => oid.to_hex(),
			Bson::String(s) => s,
			other => other.to_string(),
		}
	}
}
