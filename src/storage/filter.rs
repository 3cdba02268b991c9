//! Document-store filter matching.
//!
//! Implements the operator subset the query translator is allowed to emit:
//! implicit equality, `$eq`/`$ne`, ordered comparisons, `$in`/`$nin`,
//! `$exists`, `$regex` (with `$options: "i"`) and logical `$and`/`$or`.

use regex::RegexBuilder;
use serde_json::{Map, Value};

use crate::storage::Document;

/// Operators accepted inside a field condition object.
pub const COMPARISON_OPERATORS: &[&str] = &[
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$regex", "$options", "$exists",
];

/// Logical operators accepted at filter level.
pub const LOGICAL_OPERATORS: &[&str] = &["$and", "$or"];

/// True when `doc` satisfies every clause of `filter`. An empty filter
/// matches everything.
pub fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => as_clause_list(condition)
            .map(|clauses| clauses.iter().all(|c| matches(doc, c)))
            .unwrap_or(false),
        "$or" => as_clause_list(condition)
            .map(|clauses| clauses.iter().any(|c| matches(doc, c)))
            .unwrap_or(false),
        field => field_matches(doc.get(field), condition),
    })
}

fn as_clause_list(value: &Value) -> Option<Vec<&Document>> {
    value.as_array()?.iter().map(Value::as_object).collect()
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> bool {
    match condition {
        Value::Object(ops) if is_operator_object(ops) => {
            let options = ops.get("$options").and_then(Value::as_str).unwrap_or("");
            let effective: Vec<_> = ops
                .iter()
                .filter(|(op, _)| op.as_str() != "$options")
                .collect();
            // A bare $options carries no predicate; it must not match.
            !effective.is_empty()
                && effective
                    .iter()
                    .all(|(op, operand)| apply_operator(actual, op, operand, options))
        }
        // Literal equality, including literal object comparison
        literal => actual.map(|v| values_equal(v, literal)).unwrap_or(false),
    }
}

fn is_operator_object(ops: &Map<String, Value>) -> bool {
    !ops.is_empty() && ops.keys().all(|k| k.starts_with('$'))
}

fn apply_operator(actual: Option<&Value>, op: &str, operand: &Value, options: &str) -> bool {
    match op {
        "$exists" => {
            let wanted = operand.as_bool().unwrap_or(false);
            actual.is_some() == wanted
        }
        _ => {
            let Some(actual) = actual else { return false };
            match op {
                "$eq" => values_equal(actual, operand),
                "$ne" => !values_equal(actual, operand),
                "$gt" => compare(actual, operand).map(|o| o.is_gt()).unwrap_or(false),
                "$gte" => compare(actual, operand).map(|o| o.is_ge()).unwrap_or(false),
                "$lt" => compare(actual, operand).map(|o| o.is_lt()).unwrap_or(false),
                "$lte" => compare(actual, operand).map(|o| o.is_le()).unwrap_or(false),
                "$in" => operand
                    .as_array()
                    .map(|candidates| in_candidates(actual, candidates))
                    .unwrap_or(false),
                "$nin" => operand
                    .as_array()
                    .map(|candidates| !in_candidates(actual, candidates))
                    .unwrap_or(false),
                "$regex" => regex_matches(actual, operand, options),
                _ => false,
            }
        }
    }
}

/// `$in` also matches array-valued fields element-wise, the way document
/// stores treat membership against list fields.
fn in_candidates(actual: &Value, candidates: &[Value]) -> bool {
    match actual {
        Value::Array(elements) => elements
            .iter()
            .any(|e| candidates.iter().any(|c| values_equal(e, c))),
        scalar => candidates.iter().any(|c| values_equal(scalar, c)),
    }
}

fn regex_matches(actual: &Value, pattern: &Value, options: &str) -> bool {
    let (Some(text), Some(pattern)) = (actual.as_str(), pattern.as_str()) else {
        return false;
    };
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

/// Equality with numeric unification, so `3` and `3.0` compare equal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_str(), b.as_str()) {
        return Some(x.cmp(y));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let d = doc(json!({"name": "Jane"}));
        assert!(matches(&d, &doc(json!({}))));
    }

    #[test]
    fn implicit_equality_and_eq_operator_agree() {
        let d = doc(json!({"mfa_enabled": false, "usage_count": 3}));
        assert!(matches(&d, &doc(json!({"mfa_enabled": false}))));
        assert!(matches(&d, &doc(json!({"mfa_enabled": {"$eq": false}}))));
        assert!(!matches(&d, &doc(json!({"mfa_enabled": true}))));
        // Integer and float forms unify
        assert!(matches(&d, &doc(json!({"usage_count": 3.0}))));
    }

    #[test]
    fn missing_field_never_matches_equality() {
        let d = doc(json!({"name": "Jane"}));
        assert!(!matches(&d, &doc(json!({"team": "Engineering"}))));
        assert!(matches(&d, &doc(json!({"team": {"$exists": false}}))));
    }

    #[test]
    fn ordered_comparisons_on_numbers_and_strings() {
        let d = doc(json!({"usage_count": 150, "name": "beta"}));
        assert!(matches(&d, &doc(json!({"usage_count": {"$gte": 100}}))));
        assert!(matches(&d, &doc(json!({"usage_count": {"$lt": 200.5}}))));
        assert!(!matches(&d, &doc(json!({"usage_count": {"$gt": 150}}))));
        assert!(matches(&d, &doc(json!({"name": {"$gt": "alpha"}}))));
    }

    #[test]
    fn in_operator_covers_scalars_and_array_fields() {
        let d = doc(json!({"os": "ubuntu", "permission_group": ["admin", "dev"]}));
        assert!(matches(&d, &doc(json!({"os": {"$in": ["ubuntu", "macOS"]}}))));
        assert!(matches(&d, &doc(json!({"permission_group": {"$in": ["admin"]}}))));
        assert!(matches(&d, &doc(json!({"os": {"$nin": ["windows"]}}))));
    }

    #[test]
    fn regex_with_case_insensitive_option() {
        let d = doc(json!({"location": "Seattle HQ"}));
        assert!(matches(
            &d,
            &doc(json!({"location": {"$regex": "seattle", "$options": "i"}}))
        ));
        assert!(!matches(&d, &doc(json!({"location": {"$regex": "seattle"}}))));
    }

    #[test]
    fn logical_and_or() {
        let d = doc(json!({"team": "Engineering", "mfa_enabled": false}));
        assert!(matches(
            &d,
            &doc(json!({"$and": [{"team": "Engineering"}, {"mfa_enabled": false}]}))
        ));
        assert!(matches(
            &d,
            &doc(json!({"$or": [{"team": "Sales"}, {"mfa_enabled": false}]}))
        ));
        assert!(!matches(
            &d,
            &doc(json!({"$or": [{"team": "Sales"}, {"mfa_enabled": true}]}))
        ));
    }

    #[test]
    fn bare_options_condition_matches_nothing() {
        // No predicate remains once $options is set aside; matching everything
        // here would return whole collections for degenerate filters.
        let with_field = doc(json!({"team": "Engineering"}));
        let without_field = doc(json!({"name": "Jane"}));
        let filter = doc(json!({"team": {"$options": "i"}}));
        assert!(!matches(&with_field, &filter));
        assert!(!matches(&without_field, &filter));
    }

    #[test]
    fn invalid_regex_matches_nothing() {
        let d = doc(json!({"name": "Jane"}));
        assert!(!matches(&d, &doc(json!({"name": {"$regex": "("}}))));
    }
}
