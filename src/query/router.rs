//! Query Router: executes a validated structured query against storage and
//! packages the results for the caller.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::error::{CmdbError, Result};
use crate::observability::metrics;
use crate::query::StructuredQuery;
use crate::storage::Storage;

/// The answer to one executed query: which collection was searched, the
/// filter that ran, and the matching documents with internal fields stripped.
#[derive(Debug, Clone, Serialize)]
pub struct QueryExecutionResult {
    pub collection: String,
    pub query: StructuredQuery,
    pub count: usize,
    pub results: Vec<Value>,
}

pub struct QueryRouter {
    storage: Arc<dyn Storage>,
}

impl QueryRouter {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn execute(&self, query: &StructuredQuery) -> Result<QueryExecutionResult> {
        let documents = self
            .storage
            .query(query.collection, &query.filter)
            .await
            .map_err(|e| match e {
                CmdbError::Storage(msg) => CmdbError::QueryExecution(msg),
                other => other,
            })?;

        let results: Vec<Value> = documents
            .into_iter()
            .map(|mut doc| {
                doc.remove("_id");
                Value::Object(doc)
            })
            .collect();

        info!(collection = %query.collection, count = results.len(), "query executed");
        metrics::query::executed(query.collection.as_str(), results.len());

        Ok(QueryExecutionResult {
            collection: query.collection.as_str().to_string(),
            query: query.clone(),
            count: results.len(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CanonicalEntity, Collection, User};
    use crate::storage::{Document, InMemoryStorage};
    use serde_json::json;

    fn user(name: &str, team: &str, mfa: bool) -> CanonicalEntity {
        CanonicalEntity::User(User {
            ci_id: crate::domain::new_ci_id(),
            user_id: crate::domain::EntityType::User.new_secondary_id(),
            name: name.to_string(),
            team: Some(team.to_string()),
            mfa_enabled: mfa,
            last_login: None,
            assigned_application_ids: vec![],
            permission_group: vec![],
        })
    }

    #[tokio::test]
    async fn execute_counts_and_strips_internal_id() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.create(&user("A", "Engineering", false)).await.unwrap();
        storage.create(&user("B", "Engineering", true)).await.unwrap();
        storage.create(&user("C", "Sales", false)).await.unwrap();

        let router = QueryRouter::new(storage);
        let query = StructuredQuery {
            collection: Collection::Users,
            filter: json!({"mfa_enabled": false})
                .as_object()
                .unwrap()
                .clone(),
        };

        let outcome = router.execute(&query).await.unwrap();
        assert_eq!(outcome.collection, "users");
        assert_eq!(outcome.count, 2);
        assert_eq!(outcome.results.len(), 2);
        for result in &outcome.results {
            assert!(result.get("_id").is_none());
            assert!(result.get("ci_id").is_some());
        }
    }

    #[tokio::test]
    async fn empty_collection_yields_zero_matches() {
        let router = QueryRouter::new(Arc::new(InMemoryStorage::new()));
        let query = StructuredQuery {
            collection: Collection::Applications,
            filter: Document::new(),
        };

        let outcome = router.execute(&query).await.unwrap();
        assert_eq!(outcome.count, 0);
        assert!(outcome.results.is_empty());
    }
}
