//! In-memory storage implementation for development and testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::{filter, Document, Storage};
use crate::domain::{CanonicalEntity, Collection};
use crate::error::{CmdbError, Result};

/// Append-only document store held in process memory. Documents are kept in
/// insertion order per collection; reads hand out deep copies.
pub struct InMemoryStorage {
    collections: Arc<Mutex<HashMap<Collection, Vec<Document>>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        let mut collections = HashMap::new();
        for collection in Collection::ALL {
            collections.insert(collection, Vec::new());
        }
        Self {
            collections: Arc::new(Mutex::new(collections)),
        }
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create(&self, entity: &CanonicalEntity) -> Result<Document> {
        let collection = entity.collection();
        let mut document = entity.to_document();
        document.insert(
            "_id".to_string(),
            Value::String(Uuid::new_v4().to_string()),
        );

        let mut collections = self.collections.lock().unwrap();

        // ci_id is unique across all entity types; a collision here means the
        // caller re-persisted an existing entity.
        let ci_id = entity.ci_id();
        let duplicate = collections
            .values()
            .flatten()
            .any(|doc| doc.get("ci_id").and_then(Value::as_str) == Some(ci_id));
        if duplicate {
            return Err(CmdbError::Storage(format!(
                "duplicate key: ci_id={}",
                ci_id
            )));
        }

        let documents = collections.entry(collection).or_default();
        documents.push(document.clone());
        debug!(%collection, ci_id, "created entity");
        Ok(document)
    }

    async fn find_by_id(&self, ci_id: &str) -> Result<Option<Document>> {
        let collections = self.collections.lock().unwrap();
        Ok(collections
            .values()
            .flatten()
            .find(|doc| doc.get("ci_id").and_then(Value::as_str) == Some(ci_id))
            .cloned())
    }

    async fn find_all(
        &self,
        collection: Collection,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Document>> {
        let collections = self.collections.lock().unwrap();
        let documents = collections.get(&collection).map(Vec::as_slice).unwrap_or(&[]);
        Ok(documents.iter().skip(skip).take(limit).cloned().collect())
    }

    async fn query(&self, collection: Collection, filter_doc: &Document) -> Result<Vec<Document>> {
        let collections = self.collections.lock().unwrap();
        let documents = collections.get(&collection).map(Vec::as_slice).unwrap_or(&[]);
        Ok(documents
            .iter()
            .filter(|doc| filter::matches(doc, filter_doc))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{new_ci_id, EntityType, User};
    use serde_json::json;

    fn user(name: &str, mfa: bool) -> CanonicalEntity {
        CanonicalEntity::User(User {
            ci_id: new_ci_id(),
            user_id: EntityType::User.new_secondary_id(),
            name: name.to_string(),
            team: None,
            mfa_enabled: mfa,
            last_login: None,
            assigned_application_ids: vec![],
            permission_group: vec![],
        })
    }

    #[tokio::test]
    async fn create_assigns_internal_id_and_find_by_id_round_trips() {
        let storage = InMemoryStorage::new();
        let entity = user("Jane Doe", true);

        let stored = storage.create(&entity).await.unwrap();
        assert!(stored.contains_key("_id"));

        let found = storage.find_by_id(entity.ci_id()).await.unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&json!("Jane Doe")));
    }

    #[tokio::test]
    async fn duplicate_ci_id_is_rejected() {
        let storage = InMemoryStorage::new();
        let entity = user("Jane Doe", true);
        storage.create(&entity).await.unwrap();

        let err = storage.create(&entity).await.unwrap_err();
        assert!(matches!(err, CmdbError::Storage(_)));
    }

    #[tokio::test]
    async fn find_all_pages_in_insertion_order() {
        let storage = InMemoryStorage::new();
        for i in 0..5 {
            storage.create(&user(&format!("u{}", i), false)).await.unwrap();
        }

        let page = storage.find_all(Collection::Users, 1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].get("name"), Some(&json!("u1")));
        assert_eq!(page[1].get("name"), Some(&json!("u2")));
    }

    #[tokio::test]
    async fn query_is_collection_scoped() {
        let storage = InMemoryStorage::new();
        storage.create(&user("a", false)).await.unwrap();
        storage.create(&user("b", true)).await.unwrap();

        let filter = json!({"mfa_enabled": false}).as_object().unwrap().clone();
        let hits = storage.query(Collection::Users, &filter).await.unwrap();
        assert_eq!(hits.len(), 1);

        let hits = storage.query(Collection::Devices, &filter).await.unwrap();
        assert!(hits.is_empty());
    }
}
