//! Cross-entity references without object graphs
//!
//! Entities reference each other by id only; [`Association`] carries the
//! ordered id list and fills in the referenced entities on demand with one
//! batched fetch. [`EntityStore`] is the narrow repository surface the
//! association layer needs, implemented by both the relational and the
//! document repositories, so one association type serves both backends.

pub mod association;
pub mod collection;

pub use association::Association;
pub use collection::Collection;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Entity, Identified, Repository};

/// The repository operations the association layer depends on.
#[async_trait]
pub trait EntityStore<M: Identified>: Send + Sync {
	/// Fetch every entity whose id is in `ids`, in one round trip. Order is
	/// backend-defined; callers overlay by id.
	async fn fetch_by_ids(&self, ids: &[M::Id]) -> Result<Vec<M>>;

	/// Insert-or-update one entity.
	async fn persist(&self, entity: &mut M) -> Result<()>;

	/// Delete every entity whose id is in `ids`, in one round trip.
	async fn remove_ids(&self, ids: &[M::Id]) -> Result<u64>;
}

#[async_trait]
impl<M: Entity> EntityStore<M> for Repository<M> {
	async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<M>> {
		if ids.is_empty() {
			return Ok(Vec::new());
		}
		self.all(ids.to_vec()).await
	}

	async fn persist(&self, entity: &mut M) -> Result<()> {
		self.save(entity).await
	}

	async fn remove_ids(&self, ids: &[i64]) -> Result<u64> {
		if ids.is_empty() {
			return Ok(0);
		}
		self.delete(ids.to_vec()).await
	}
}

#[cfg(feature = "mongodb")]
mod document_store {
	use super::*;
	use crate::backends::DocFilter;
	use crate::model::document::{DocumentEntity, DocumentRepository};

	#[async_trait]
	impl<M: DocumentEntity> EntityStore<M> for DocumentRepository<M> {
		async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<M>> {
			if ids.is_empty() {
				return Ok(Vec::new());
			}
			self.all(DocFilter::Ids(ids.to_vec())).await
		}

		async fn persist(&self, entity: &mut M) -> Result<()> {
			self.save(entity).await
		}

		async fn remove_ids(&self, ids: &[String]) -> Result<u64> {
			if ids.is_empty() {
				return Ok(0);
			}
			self.delete(DocFilter::Ids(ids.to_vec())).await
		}
	}
}
