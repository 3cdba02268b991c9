//! Entity Parser: validates normalized data against the canonical schema and
//! constructs immutable entities with freshly assigned identifiers.
//!
//! Validation collects every violation before failing; a record with three
//! problems reports all three, not just the first.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::domain::{new_ci_id, Application, CanonicalEntity, Device, EntityType, User};
use crate::error::{CmdbError, Result};
use crate::schema::{FieldSpec, FieldType, SchemaRegistry};

pub struct EntityParser {
    registry: Arc<SchemaRegistry>,
}

impl EntityParser {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Validate `normalized_data` and construct a canonical entity.
    ///
    /// Persistence is the caller's concern; the only effect here is
    /// identifier generation.
    pub fn parse(
        &self,
        entity_type: EntityType,
        normalized_data: &Map<String, Value>,
    ) -> Result<CanonicalEntity> {
        self.validate(entity_type, normalized_data)?;
        let data = self.with_defaults(entity_type, normalized_data);

        let ci_id = new_ci_id();
        let secondary_id = entity_type.new_secondary_id();
        let entity = match entity_type {
            EntityType::User => CanonicalEntity::User(build_user(ci_id, secondary_id, &data)),
            EntityType::Application => {
                CanonicalEntity::Application(build_application(ci_id, secondary_id, &data))
            }
            EntityType::Device => CanonicalEntity::Device(build_device(ci_id, secondary_id, &data)),
        };

        info!(ci_id = entity.ci_id(), %entity_type, "entity parsed");
        Ok(entity)
    }

    fn validate(&self, entity_type: EntityType, data: &Map<String, Value>) -> Result<()> {
        let specs = self.registry.fields(entity_type);
        let mut violations = Vec::new();

        for spec in specs {
            match data.get(&spec.name) {
                None => {
                    if spec.required {
                        violations.push(format!("missing required field '{}'", spec.name));
                    }
                }
                Some(value) => {
                    if !type_matches(value, spec.field_type) {
                        violations.push(format!(
                            "field '{}' expected {}, got {}",
                            spec.name,
                            spec.field_type.type_name(),
                            json_type_name(value)
                        ));
                    } else if let Some(violation) = enum_violation(spec, value) {
                        violations.push(violation);
                    } else if let Some(violation) = integer_violation(spec, value) {
                        violations.push(violation);
                    }
                }
            }
        }

        for key in data.keys() {
            if specs.iter().all(|spec| &spec.name != key) {
                violations.push(format!("unknown field '{}' for {}", key, entity_type));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(CmdbError::Validation(violations))
        }
    }

    fn with_defaults(
        &self,
        entity_type: EntityType,
        data: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut filled = data.clone();
        for spec in self.registry.fields(entity_type) {
            if !filled.contains_key(&spec.name) {
                if let Some(default) = &spec.default {
                    filled.insert(spec.name.clone(), default.clone());
                }
            }
        }
        filled
    }
}

fn type_matches(value: &Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Number => value.is_number(),
        FieldType::DateTime => value.as_str().map(|s| parse_datetime(s).is_some()).unwrap_or(false),
        FieldType::StringArray => value
            .as_array()
            .map(|items| items.iter().all(Value::is_string))
            .unwrap_or(false),
    }
}

fn enum_violation(spec: &FieldSpec, value: &Value) -> Option<String> {
    let allowed = spec.allowed_values.as_ref()?;
    let text = value.as_str()?;
    if allowed.iter().any(|a| a == text) {
        None
    } else {
        Some(format!(
            "field '{}' must be one of [{}], got '{}'",
            spec.name,
            allowed.join(", "),
            text
        ))
    }
}

/// Number fields are stored as unsigned counts; a fractional or negative
/// value would otherwise be truncated silently at construction time.
fn integer_violation(spec: &FieldSpec, value: &Value) -> Option<String> {
    if spec.field_type != FieldType::Number {
        return None;
    }
    if value.as_u64().is_some() {
        None
    } else {
        Some(format!(
            "field '{}' must be a non-negative integer, got {}",
            spec.name, value
        ))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    use chrono::{NaiveDateTime, TimeZone};
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn get_string(data: &Map<String, Value>, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn get_string_array(data: &Map<String, Value>, key: &str) -> Vec<String> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn build_user(ci_id: String, user_id: String, data: &Map<String, Value>) -> User {
    User {
        ci_id,
        user_id,
        name: get_string(data, "name"),
        team: data.get("team").and_then(Value::as_str).map(str::to_string),
        mfa_enabled: data.get("mfa_enabled").and_then(Value::as_bool).unwrap_or(false),
        last_login: data
            .get("last_login")
            .and_then(Value::as_str)
            .and_then(parse_datetime),
        assigned_application_ids: get_string_array(data, "assigned_application_ids"),
        permission_group: get_string_array(data, "permission_group"),
    }
}

fn build_application(ci_id: String, app_id: String, data: &Map<String, Value>) -> Application {
    Application {
        ci_id,
        app_id,
        name: get_string(data, "name"),
        owner: get_string(data, "owner"),
        app_type: get_string(data, "type"),
        usage_count: data.get("usage_count").and_then(Value::as_u64).unwrap_or(0),
        integrations: get_string_array(data, "integrations"),
        user_ids: vec![],
    }
}

fn build_device(ci_id: String, device_id: String, data: &Map<String, Value>) -> Device {
    Device {
        ci_id,
        device_id,
        hostname: get_string(data, "hostname"),
        ip_address: get_string(data, "ip_address"),
        os: get_string(data, "os"),
        assigned_user: get_string(data, "assigned_user"),
        location: get_string(data, "location"),
        status: get_string(data, "status"),
    }
}
