//! Query Translator: natural-language prompt to a single-collection
//! structured query.
//!
//! The AI assist does the language understanding; everything it returns is
//! validated here before anything touches storage. There is no deterministic
//! fallback for translation: an assist failure is surfaced to the caller.

use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::ai::AiAssist;
use crate::config::Settings;
use crate::domain::Collection;
use crate::error::{CmdbError, Result};
use crate::observability::metrics;
use crate::query::StructuredQuery;
use crate::schema::SchemaRegistry;
use crate::storage::filter::{COMPARISON_OPERATORS, LOGICAL_OPERATORS};
use crate::storage::Document;

pub struct QueryTranslator {
    assist: Arc<dyn AiAssist>,
    registry: Arc<SchemaRegistry>,
    assist_timeout: Duration,
}

impl QueryTranslator {
    pub fn new(
        assist: Arc<dyn AiAssist>,
        registry: Arc<SchemaRegistry>,
        settings: &Settings,
    ) -> Self {
        Self {
            assist,
            registry,
            assist_timeout: settings.assist_timeout(),
        }
    }

    /// Translate a free-text prompt into a validated single-collection query.
    pub async fn translate(&self, prompt: &str) -> Result<StructuredQuery> {
        let schema_context = self.registry.query_context();

        let raw = match timeout(
            self.assist_timeout,
            self.assist.translate_query(prompt, &schema_context),
        )
        .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                metrics::query::translation_failed("assist");
                return Err(CmdbError::Assist(e.to_string()));
            }
            Err(_) => {
                metrics::query::translation_failed("timeout");
                return Err(CmdbError::Assist("query translation timed out".to_string()));
            }
        };

        let query = parse_structured_query(&raw).map_err(|e| {
            warn!(prompt, error = %e, "translation rejected");
            metrics::query::translation_failed("invalid");
            e
        })?;

        info!(prompt, collection = %query.collection, "prompt translated");
        metrics::query::translated(query.collection.as_str());
        Ok(query)
    }
}

/// Parse and validate the assist's raw output into a `StructuredQuery`.
fn parse_structured_query(raw: &Value) -> Result<StructuredQuery> {
    let object = raw
        .as_object()
        .ok_or_else(|| untranslatable("response is not a JSON object"))?;

    if let Some(reason) = object.get("error").and_then(Value::as_str) {
        return Err(untranslatable(reason));
    }
    if object.contains_key("pipeline") {
        return Err(untranslatable(
            "aggregation pipelines imply joins, which are not supported",
        ));
    }
    if object.contains_key("collections") {
        return Err(untranslatable(
            "query spans multiple collections; joins are not supported",
        ));
    }

    let collection_name = object
        .get("collection")
        .and_then(Value::as_str)
        .ok_or_else(|| untranslatable("missing collection"))?;
    let collection = Collection::from_str(collection_name)
        .map_err(|_| untranslatable(&format!("unknown collection '{}'", collection_name)))?;

    let filter = match object.get("filter").or_else(|| object.get("query")) {
        None => Document::new(),
        Some(Value::Object(filter)) => filter.clone(),
        Some(_) => return Err(untranslatable("filter is not a JSON object")),
    };
    validate_filter(&filter)?;

    Ok(StructuredQuery { collection, filter })
}

/// Recursively check a filter against the supported operator subset.
/// Anything outside it (aggregation stages, `$lookup`, unknown operators)
/// is rejected rather than passed through to storage.
fn validate_filter(filter: &Document) -> Result<()> {
    for (key, value) in filter {
        if LOGICAL_OPERATORS.contains(&key.as_str()) {
            let clauses = value
                .as_array()
                .ok_or_else(|| untranslatable(&format!("{} expects an array of filters", key)))?;
            for clause in clauses {
                let clause = clause
                    .as_object()
                    .ok_or_else(|| untranslatable(&format!("{} clauses must be objects", key)))?;
                validate_filter(clause)?;
            }
        } else if key.starts_with('$') {
            return Err(untranslatable(&format!("unknown top-level operator '{}'", key)));
        } else if let Value::Object(condition) = value {
            validate_condition(key, condition)?;
        }
        // Literal scalar/array equality needs no further checks
    }
    Ok(())
}

fn validate_condition(field: &str, condition: &Document) -> Result<()> {
    let has_operators = condition.keys().any(|k| k.starts_with('$'));
    if !has_operators {
        // Literal object equality
        return Ok(());
    }
    if condition.contains_key("$options") && !condition.contains_key("$regex") {
        return Err(untranslatable(&format!(
            "$options without $regex on field '{}'",
            field
        )));
    }
    for (op, operand) in condition {
        if !COMPARISON_OPERATORS.contains(&op.as_str()) {
            return Err(untranslatable(&format!(
                "unsupported operator '{}' on field '{}'",
                op, field
            )));
        }
        match op.as_str() {
            "$in" | "$nin" if !operand.is_array() => {
                return Err(untranslatable(&format!("{} expects an array", op)));
            }
            "$regex" | "$options" if !operand.is_string() => {
                return Err(untranslatable(&format!("{} expects a string", op)));
            }
            _ => {}
        }
    }
    Ok(())
}

fn untranslatable(reason: &str) -> CmdbError {
    CmdbError::UntranslatableQuery(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_simple_collection_filter() {
        let query =
            parse_structured_query(&json!({"collection": "users", "filter": {"mfa_enabled": false}}))
                .unwrap();
        assert_eq!(query.collection, Collection::Users);
        assert_eq!(query.filter.get("mfa_enabled"), Some(&json!(false)));
    }

    #[test]
    fn accepts_legacy_query_key_and_missing_filter() {
        let query =
            parse_structured_query(&json!({"collection": "devices", "query": {"status": "active"}}))
                .unwrap();
        assert_eq!(query.filter.get("status"), Some(&json!("active")));

        let query = parse_structured_query(&json!({"collection": "applications"})).unwrap();
        assert!(query.filter.is_empty());
    }

    #[test]
    fn rejects_error_responses() {
        let err = parse_structured_query(
            &json!({"error": "request spans users and devices"}),
        )
        .unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));
    }

    #[test]
    fn rejects_pipelines_and_multi_collection_payloads() {
        let err = parse_structured_query(
            &json!({"collection": "users", "pipeline": [{"$lookup": {}}]}),
        )
        .unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));

        let err = parse_structured_query(&json!({"collections": ["users", "devices"]})).unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));
    }

    #[test]
    fn rejects_unknown_collection_and_operators() {
        let err = parse_structured_query(&json!({"collection": "invoices"})).unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));

        let err = parse_structured_query(
            &json!({"collection": "users", "filter": {"$lookup": {"from": "devices"}}}),
        )
        .unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));

        let err = parse_structured_query(
            &json!({"collection": "users", "filter": {"team": {"$near": [0, 0]}}}),
        )
        .unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));
    }

    #[test]
    fn validates_nested_logical_clauses() {
        let query = parse_structured_query(&json!({
            "collection": "users",
            "filter": {"$or": [
                {"team": "Engineering"},
                {"last_login": {"$lt": "2024-01-01T00:00:00Z"}},
            ]},
        }))
        .unwrap();
        assert_eq!(query.collection, Collection::Users);

        let err = parse_structured_query(&json!({
            "collection": "users",
            "filter": {"$or": [{"team": {"$group": "x"}}]},
        }))
        .unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));
    }

    #[test]
    fn rejects_options_without_regex() {
        let err = parse_structured_query(
            &json!({"collection": "users", "filter": {"team": {"$options": "i"}}}),
        )
        .unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));

        parse_structured_query(
            &json!({"collection": "users", "filter": {"team": {"$regex": "eng", "$options": "i"}}}),
        )
        .unwrap();
    }

    #[test]
    fn rejects_malformed_operand_shapes() {
        let err = parse_structured_query(
            &json!({"collection": "users", "filter": {"team": {"$in": "Engineering"}}}),
        )
        .unwrap_err();
        assert!(matches!(err, CmdbError::UntranslatableQuery(_)));
    }
}
