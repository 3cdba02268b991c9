pub mod filter;
pub mod in_memory;

pub use in_memory::InMemoryStorage;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{CanonicalEntity, Collection};
use crate::error::Result;

/// A stored record as the document store sees it, including internal-only
/// fields such as `_id`.
pub type Document = Map<String, Value>;

/// Append-only storage boundary consumed by the pipeline and query router.
///
/// Backends must guarantee that concurrent creates never collide on `ci_id`
/// and that an entity becomes visible to readers atomically at create time.
/// No update or delete operation exists by design.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist a freshly parsed entity. Returns the stored document.
    async fn create(&self, entity: &CanonicalEntity) -> Result<Document>;

    /// Look up a single entity by its globally unique `ci_id`, across all
    /// collections.
    async fn find_by_id(&self, ci_id: &str) -> Result<Option<Document>>;

    /// One page of a collection, in insertion order.
    async fn find_all(
        &self,
        collection: Collection,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Document>>;

    /// All documents in a collection matching a document-store filter, in
    /// insertion order.
    async fn query(&self, collection: Collection, filter: &Document) -> Result<Vec<Document>>;
}
