//! End-to-end prompt-to-results tests with a scripted AI assist.

use std::sync::Arc;

use async_trait::async_trait;
use cmdb_service::ai::{AiAssist, EntityGuess, ProposedMapping};
use cmdb_service::config::Settings;
use cmdb_service::domain::EntityType;
use cmdb_service::error::CmdbError;
use cmdb_service::pipeline::{EntityParser, FieldNormalizer, IngestPipeline};
use cmdb_service::query::{answer_prompt, QueryRouter, QueryTranslator};
use cmdb_service::schema::SchemaRegistry;
use cmdb_service::storage::{InMemoryStorage, Storage};
use serde_json::{json, Value};

/// Assist stub that answers every translation with one canned response.
struct ScriptedAssist {
    translation: Result<Value, String>,
}

impl ScriptedAssist {
    fn translating(response: Value) -> Arc<dyn AiAssist> {
        Arc::new(Self {
            translation: Ok(response),
        })
    }

    fn failing(message: &str) -> Arc<dyn AiAssist> {
        Arc::new(Self {
            translation: Err(message.to_string()),
        })
    }
}

#[async_trait]
impl AiAssist for ScriptedAssist {
    async fn classify_entity(
        &self,
        _field_names: &[String],
        _sample: &Value,
    ) -> anyhow::Result<EntityGuess> {
        anyhow::bail!("classification not scripted")
    }

    async fn map_fields(
        &self,
        _entity_type: EntityType,
        _field_names: &[String],
    ) -> anyhow::Result<Vec<ProposedMapping>> {
        anyhow::bail!("mapping not scripted")
    }

    async fn translate_query(&self, _prompt: &str, _schema: &Value) -> anyhow::Result<Value> {
        match &self.translation {
            Ok(value) => Ok(value.clone()),
            Err(message) => anyhow::bail!("{}", message),
        }
    }
}

fn registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::builtin().clone())
}

async fn seeded_storage() -> Arc<dyn Storage> {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let pipeline = IngestPipeline::new(
        FieldNormalizer::heuristic_only(registry()),
        EntityParser::new(registry()),
        storage.clone(),
    );
    let items = vec![
        json!({"full_name": "Alice", "department": "Engineering", "mfa_status": true}),
        json!({"full_name": "Bob", "department": "Sales", "mfa_status": false}),
        json!({"full_name": "Carol", "department": "Support", "mfa_status": false}),
    ];
    let results = pipeline.process(&items, None).await;
    assert!(results.iter().all(|r| r.ci_id.is_some()));
    storage
}

#[tokio::test]
async fn prompt_finds_users_without_mfa() {
    let storage = seeded_storage().await;
    let assist = ScriptedAssist::translating(json!({
        "collection": "users",
        "filter": {"mfa_enabled": false},
    }));
    let translator = QueryTranslator::new(assist, registry(), &Settings::default());
    let router = QueryRouter::new(storage);

    let answer = answer_prompt(&translator, &router, "show all users without MFA")
        .await
        .unwrap();

    assert_eq!(answer.original_prompt, "show all users without MFA");
    assert_eq!(answer.execution.collection, "users");
    assert_eq!(answer.execution.count, 2);
    let names: Vec<&str> = answer
        .execution
        .results
        .iter()
        .filter_map(|r| r.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["Bob", "Carol"]);
}

#[tokio::test]
async fn empty_collection_answers_with_zero_results() {
    let assist = ScriptedAssist::translating(json!({
        "collection": "applications",
        "filter": {},
    }));
    let translator = QueryTranslator::new(assist, registry(), &Settings::default());
    let router = QueryRouter::new(Arc::new(InMemoryStorage::new()));

    let answer = answer_prompt(&translator, &router, "list every application")
        .await
        .unwrap();

    assert_eq!(answer.execution.count, 0);
    assert!(answer.execution.results.is_empty());
}

#[tokio::test]
async fn cross_collection_prompt_is_rejected() {
    let assist = ScriptedAssist::translating(json!({
        "error": "the request needs data from both users and devices",
    }));
    let translator = QueryTranslator::new(assist, registry(), &Settings::default());
    let router = QueryRouter::new(seeded_storage().await);

    let err = answer_prompt(&translator, &router, "which devices belong to users without MFA")
        .await
        .unwrap_err();

    assert!(matches!(err, CmdbError::UntranslatableQuery(_)));
}

#[tokio::test]
async fn assist_transport_failure_surfaces_as_assist_error() {
    let assist = ScriptedAssist::failing("connection refused");
    let translator = QueryTranslator::new(assist, registry(), &Settings::default());
    let router = QueryRouter::new(Arc::new(InMemoryStorage::new()));

    let err = answer_prompt(&translator, &router, "show all users")
        .await
        .unwrap_err();

    assert!(matches!(err, CmdbError::Assist(_)));
}

#[tokio::test]
async fn regex_filters_run_case_insensitively_with_options() {
    let storage = seeded_storage().await;
    let assist = ScriptedAssist::translating(json!({
        "collection": "users",
        "filter": {"team": {"$regex": "engineer", "$options": "i"}},
    }));
    let translator = QueryTranslator::new(assist, registry(), &Settings::default());
    let router = QueryRouter::new(storage);

    let answer = answer_prompt(&translator, &router, "users on an engineering team")
        .await
        .unwrap();

    assert_eq!(answer.execution.count, 1);
    assert_eq!(
        answer.execution.results[0].get("name").and_then(Value::as_str),
        Some("Alice")
    );
}
