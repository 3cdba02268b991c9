//! Canonical Schema Registry.
//!
//! Static definition of each entity type's canonical fields, their accepted
//! raw-name variations, types, defaults and enum constraints. Consumed by both
//! the field normalizer and the query translator. Loaded once; immutable at
//! runtime.

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;

use crate::domain::{Collection, EntityType};
use crate::error::{CmdbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Boolean,
    Number,
    DateTime,
    StringArray,
}

impl FieldType {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Number => "number",
            FieldType::DateTime => "datetime",
            FieldType::StringArray => "array[string]",
        }
    }
}

/// Descriptor for one canonical field of an entity type.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
    pub field_type: FieldType,
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Closed set of accepted values, when the field is an enum.
    #[serde(default)]
    pub allowed_values: Option<Vec<String>>,
    /// Alternate raw field names accepted as synonyms. Matching is
    /// case-insensitive and separator-insensitive.
    #[serde(default)]
    pub variations: Vec<String>,
}

impl FieldSpec {
    fn new(
        name: &str,
        description: &str,
        field_type: FieldType,
        required: bool,
        default: Option<Value>,
        allowed_values: Option<&[&str]>,
        variations: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            field_type,
            required,
            default,
            allowed_values: allowed_values.map(|vs| vs.iter().map(|v| v.to_string()).collect()),
            variations: variations.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// True when `raw_name` matches this field's canonical name or one of its
    /// variations, after normalization.
    pub fn accepts(&self, raw_name: &str) -> bool {
        let key = normalize_key(raw_name);
        if normalize_key(&self.name) == key {
            return true;
        }
        self.variations.iter().any(|v| normalize_key(v) == key)
    }
}

/// Lowercase a raw field name and strip separators and punctuation, so that
/// `MFA-Status`, `mfa_status` and `mfa status` all compare equal.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    fields: HashMap<EntityType, Vec<FieldSpec>>,
}

static BUILTIN: Lazy<SchemaRegistry> = Lazy::new(SchemaRegistry::build_builtin);

impl SchemaRegistry {
    /// The compiled-in schema definition.
    pub fn builtin() -> &'static SchemaRegistry {
        &BUILTIN
    }

    /// Load a schema override from a JSON file mapping collection names to
    /// field-spec arrays. Any read or parse failure makes the registry
    /// unavailable.
    pub fn from_file(path: &str) -> Result<SchemaRegistry> {
        let content = fs::read_to_string(path)
            .map_err(|e| CmdbError::SchemaUnavailable(format!("{}: {}", path, e)))?;
        let raw: HashMap<String, Vec<FieldSpec>> = serde_json::from_str(&content)
            .map_err(|e| CmdbError::SchemaUnavailable(format!("{}: {}", path, e)))?;

        let mut fields = HashMap::new();
        for (key, specs) in raw {
            let entity_type: EntityType = key
                .parse()
                .map_err(|_| CmdbError::SchemaUnavailable(format!("unknown entity type '{}'", key)))?;
            fields.insert(entity_type, specs);
        }
        for entity_type in EntityType::ALL {
            if !fields.contains_key(&entity_type) {
                return Err(CmdbError::SchemaUnavailable(format!(
                    "missing definition for '{}s'",
                    entity_type
                )));
            }
        }
        Ok(SchemaRegistry { fields })
    }

    /// Ordered canonical field descriptors for an entity type.
    pub fn fields(&self, entity_type: EntityType) -> &[FieldSpec] {
        // Every EntityType variant is present by construction
        self.fields.get(&entity_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn field(&self, entity_type: EntityType, name: &str) -> Option<&FieldSpec> {
        self.fields(entity_type).iter().find(|f| f.name == name)
    }

    /// Resolve a raw field name to its canonical field, first match in
    /// declared order wins.
    pub fn match_field(&self, entity_type: EntityType, raw_name: &str) -> Option<&FieldSpec> {
        self.fields(entity_type).iter().find(|f| f.accepts(raw_name))
    }

    /// Fraction of the given raw field names that belong to this entity
    /// type's vocabulary. Drives heuristic entity-type detection.
    pub fn type_score(&self, entity_type: EntityType, raw_names: &[String]) -> f64 {
        if raw_names.is_empty() {
            return 0.0;
        }
        let matched = raw_names
            .iter()
            .filter(|name| self.match_field(entity_type, name).is_some())
            .count();
        matched as f64 / raw_names.len() as f64
    }

    /// Compact per-collection schema description supplied to the query
    /// translator: field names, types, descriptions, identifier patterns and
    /// example filter shapes.
    pub fn query_context(&self) -> Value {
        let mut collections = serde_json::Map::new();
        for collection in Collection::ALL {
            let entity_type = collection.entity_type();
            let mut fields = serde_json::Map::new();
            fields.insert(
                "ci_id".to_string(),
                json!({"type": "string", "description": "Configuration item ID", "pattern": "CI-[A-F0-9]{12}"}),
            );
            let (id_name, id_prefix) = match entity_type {
                EntityType::User => ("user_id", "USR"),
                EntityType::Application => ("app_id", "APP"),
                EntityType::Device => ("device_id", "DEV"),
            };
            fields.insert(
                id_name.to_string(),
                json!({"type": "string", "description": format!("Unique {} identifier", entity_type), "pattern": format!("{}-[A-F0-9]{{12}}", id_prefix)}),
            );
            for spec in self.fields(entity_type) {
                let mut field = serde_json::Map::new();
                field.insert("type".to_string(), json!(spec.field_type.type_name()));
                field.insert("description".to_string(), json!(spec.description));
                if let Some(values) = &spec.allowed_values {
                    field.insert("enum".to_string(), json!(values));
                }
                fields.insert(spec.name.clone(), Value::Object(field));
            }
            collections.insert(
                collection.as_str().to_string(),
                json!({
                    "fields": fields,
                    "example_filters": example_filters(collection),
                }),
            );
        }
        json!({
            "description": "Configuration items: users, applications and devices",
            "collections": collections,
        })
    }

    fn build_builtin() -> SchemaRegistry {
        let mut fields = HashMap::new();

        fields.insert(
            EntityType::User,
            vec![
                FieldSpec::new(
                    "name",
                    "Full name of the user",
                    FieldType::String,
                    true,
                    None,
                    None,
                    &[
                        "full_name",
                        "user_name",
                        "display_name",
                        "username",
                        "first_name_last_name",
                        "employee_name",
                        "person_name",
                    ],
                ),
                FieldSpec::new(
                    "team",
                    "Team or department the user belongs to",
                    FieldType::String,
                    false,
                    None,
                    None,
                    &[
                        "group",
                        "department",
                        "division",
                        "unit",
                        "org",
                        "organization",
                        "dept",
                        "team_name",
                        "work_group",
                    ],
                ),
                FieldSpec::new(
                    "mfa_enabled",
                    "Multi-factor authentication enabled status",
                    FieldType::Boolean,
                    false,
                    Some(json!(false)),
                    None,
                    &[
                        "mfa_status",
                        "mfa",
                        "multi_factor_auth",
                        "two_factor",
                        "2fa",
                        "multi_factor_enabled",
                        "mfa_active",
                        "has_mfa",
                        "two_factor_enabled",
                        "multi_factor_authentication",
                    ],
                ),
                FieldSpec::new(
                    "last_login",
                    "Timestamp of user's last login",
                    FieldType::DateTime,
                    false,
                    None,
                    None,
                    &[
                        "last_access",
                        "last_signin",
                        "last_logged_in",
                        "last_sign_in",
                        "previous_login",
                        "recent_login",
                        "last_activity",
                        "last_access_time",
                    ],
                ),
                FieldSpec::new(
                    "assigned_application_ids",
                    "List of application IDs assigned to this user",
                    FieldType::StringArray,
                    false,
                    Some(json!([])),
                    None,
                    &[
                        "apps",
                        "applications",
                        "app_list",
                        "assigned_apps",
                        "user_applications",
                        "application_access",
                        "app_ids",
                        "accessible_applications",
                        "permitted_apps",
                    ],
                ),
                FieldSpec::new(
                    "permission_group",
                    "User's provisioned permission groups",
                    FieldType::StringArray,
                    false,
                    Some(json!([])),
                    None,
                    &[
                        "permissionGroup",
                        "permissiongroup",
                        "group",
                        "PermissionGroup",
                        "permission_group_type",
                        "permissions",
                        "app_permission_group",
                    ],
                ),
            ],
        );

        fields.insert(
            EntityType::Application,
            vec![
                FieldSpec::new(
                    "name",
                    "Application name",
                    FieldType::String,
                    true,
                    None,
                    None,
                    &[
                        "app_name",
                        "application_name",
                        "title",
                        "software_name",
                        "system_name",
                        "service_name",
                        "product_name",
                    ],
                ),
                FieldSpec::new(
                    "owner",
                    "Application owner or responsible person",
                    FieldType::String,
                    true,
                    None,
                    None,
                    &[
                        "owned_by",
                        "responsible_person",
                        "manager",
                        "maintainer",
                        "admin",
                        "administrator",
                        "contact",
                        "responsible_team",
                        "app_owner",
                        "system_owner",
                        "tech_lead",
                    ],
                ),
                FieldSpec::new(
                    "type",
                    "Application deployment type",
                    FieldType::String,
                    false,
                    Some(json!("SaaS")),
                    Some(&["SaaS", "on-prem"]),
                    &[
                        "deployment_type",
                        "app_type",
                        "category",
                        "kind",
                        "application_type",
                        "hosting_type",
                        "environment_type",
                        "platform_type",
                        "service_type",
                    ],
                ),
                FieldSpec::new(
                    "usage_count",
                    "Number of times application has been accessed",
                    FieldType::Number,
                    false,
                    Some(json!(0)),
                    None,
                    &[
                        "usage",
                        "access_count",
                        "hits",
                        "usage_stats",
                        "access_frequency",
                        "hit_count",
                        "usage_metrics",
                        "activity_count",
                        "login_count",
                    ],
                ),
                FieldSpec::new(
                    "integrations",
                    "List of integrated systems or APIs",
                    FieldType::StringArray,
                    false,
                    Some(json!([])),
                    None,
                    &[
                        "integrated_systems",
                        "connections",
                        "apis",
                        "connectors",
                        "external_systems",
                        "third_party_integrations",
                        "api_connections",
                        "system_integrations",
                        "linked_services",
                    ],
                ),
            ],
        );

        fields.insert(
            EntityType::Device,
            vec![
                FieldSpec::new(
                    "hostname",
                    "Device hostname or computer name",
                    FieldType::String,
                    true,
                    None,
                    None,
                    &[
                        "computer_name",
                        "device_name",
                        "machine_name",
                        "host",
                        "system_name",
                        "node_name",
                    ],
                ),
                FieldSpec::new(
                    "ip_address",
                    "IP address of the device",
                    FieldType::String,
                    true,
                    None,
                    None,
                    &[
                        "ip",
                        "ip_addr",
                        "network_address",
                        "host_ip",
                        "device_ip",
                        "machine_ip",
                        "ipv4_address",
                    ],
                ),
                FieldSpec::new(
                    "os",
                    "Operating system",
                    FieldType::String,
                    false,
                    Some(json!("windows")),
                    Some(&["windows", "macOS", "ubuntu"]),
                    &[
                        "operating_system",
                        "platform",
                        "os_type",
                        "system_type",
                        "os_name",
                        "operating_sys",
                        "platform_type",
                    ],
                ),
                FieldSpec::new(
                    "assigned_user",
                    "User ID of the primary assigned user",
                    FieldType::String,
                    true,
                    None,
                    None,
                    &[
                        "primary_user",
                        "user_id",
                        "owner",
                        "assigned_to",
                        "primary_owner",
                        "device_owner",
                        "responsible_user",
                    ],
                ),
                FieldSpec::new(
                    "location",
                    "Physical location of the device",
                    FieldType::String,
                    true,
                    None,
                    None,
                    &[
                        "physical_location",
                        "site",
                        "office",
                        "building",
                        "room",
                        "floor",
                        "address",
                        "geographical_location",
                    ],
                ),
                FieldSpec::new(
                    "status",
                    "Current device status",
                    FieldType::String,
                    false,
                    Some(json!("inactive")),
                    Some(&["inactive", "active", "suspended"]),
                    &[
                        "state",
                        "device_status",
                        "operational_status",
                        "condition",
                        "activity_status",
                        "power_status",
                        "connection_status",
                    ],
                ),
            ],
        );

        SchemaRegistry { fields }
    }
}

fn example_filters(collection: Collection) -> Value {
    match collection {
        Collection::Users => json!([
            {"mfa_enabled": false},
            {"team": "Engineering"},
            {"last_login": {"$lt": "2024-01-01T00:00:00Z"}},
        ]),
        Collection::Applications => json!([
            {"type": "SaaS"},
            {"usage_count": {"$gte": 100}},
            {"user_ids": {"$in": []}},
        ]),
        Collection::Devices => json!([
            {"status": "active"},
            {"os": "ubuntu"},
            {"location": {"$regex": "Seattle", "$options": "i"}},
        ]),
    }
}
