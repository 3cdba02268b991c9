use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CmdbError;

/// The fixed set of configuration-item types tracked by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    User,
    Application,
    Device,
}

impl EntityType {
    /// Detection tie-break and iteration order: users, applications, devices.
    pub const ALL: [EntityType; 3] = [
        EntityType::User,
        EntityType::Application,
        EntityType::Device,
    ];

    pub fn collection(&self) -> Collection {
        match self {
            EntityType::User => Collection::Users,
            EntityType::Application => Collection::Applications,
            EntityType::Device => Collection::Devices,
        }
    }

    /// Generate a fresh type-scoped secondary identifier, e.g. `USR-4A1B2C3D4E5F`.
    pub fn new_secondary_id(&self) -> String {
        let prefix = match self {
            EntityType::User => "USR",
            EntityType::Application => "APP",
            EntityType::Device => "DEV",
        };
        format!("{}-{}", prefix, random_hex_token())
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityType::User => "user",
            EntityType::Application => "application",
            EntityType::Device => "device",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for EntityType {
    type Err = CmdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "users" => Ok(EntityType::User),
            "application" | "applications" => Ok(EntityType::Application),
            "device" | "devices" => Ok(EntityType::Device),
            other => Err(CmdbError::UnsupportedEntityType(other.to_string())),
        }
    }
}

/// Storage collections, one per entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Applications,
    Devices,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Users,
        Collection::Applications,
        Collection::Devices,
    ];

    pub fn entity_type(&self) -> EntityType {
        match self {
            Collection::Users => EntityType::User,
            Collection::Applications => EntityType::Application,
            Collection::Devices => EntityType::Device,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Applications => "applications",
            Collection::Devices => "devices",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Collection {
    type Err = CmdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "users" => Ok(Collection::Users),
            "applications" => Ok(Collection::Applications),
            "devices" => Ok(Collection::Devices),
            other => Err(CmdbError::UnknownCollection(other.to_string())),
        }
    }
}

/// Generate a globally unique configuration-item identifier.
///
/// The token is derived from a v4 UUID, so it carries no entity-type
/// information and no trace of the input record.
pub fn new_ci_id() -> String {
    format!("CI-{}", random_hex_token())
}

fn random_hex_token() -> String {
    let hex = Uuid::new_v4().simple().to_string().to_uppercase();
    hex[..12].to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub ci_id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_application_ids: Vec<String>,
    #[serde(default)]
    pub permission_group: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub ci_id: String,
    pub app_id: String,
    pub name: String,
    pub owner: String,
    /// Deployment type: "SaaS" or "on-prem".
    #[serde(rename = "type")]
    pub app_type: String,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub integrations: Vec<String>,
    /// Reverse assignment list, populated by reconciliation tooling.
    #[serde(default)]
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub ci_id: String,
    pub device_id: String,
    pub hostname: String,
    pub ip_address: String,
    /// Operating system: "windows", "macOS" or "ubuntu".
    pub os: String,
    /// user_id of the primary assigned user.
    pub assigned_user: String,
    pub location: String,
    /// Lifecycle state: "inactive", "active" or "suspended".
    pub status: String,
}

/// A canonical configuration item. Created exactly once at parse time and
/// immutable afterwards; the store is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalEntity {
    User(User),
    Application(Application),
    Device(Device),
}

impl CanonicalEntity {
    pub fn ci_id(&self) -> &str {
        match self {
            CanonicalEntity::User(u) => &u.ci_id,
            CanonicalEntity::Application(a) => &a.ci_id,
            CanonicalEntity::Device(d) => &d.ci_id,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            CanonicalEntity::User(_) => EntityType::User,
            CanonicalEntity::Application(_) => EntityType::Application,
            CanonicalEntity::Device(_) => EntityType::Device,
        }
    }

    pub fn collection(&self) -> Collection {
        self.entity_type().collection()
    }

    /// Flatten into a document for the storage layer.
    pub fn to_document(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // Entities always serialize to objects
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Failure,
}

/// Per-item outcome of a batch ingest. One per input record, in input order,
/// independent of sibling outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    pub status: ProcessingStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn success(entity: &CanonicalEntity, timestamp: DateTime<Utc>) -> Self {
        Self {
            ci_id: Some(entity.ci_id().to_string()),
            entity_type: Some(entity.entity_type()),
            status: ProcessingStatus::Success,
            message: format!("{} created", entity.entity_type()),
            timestamp,
        }
    }

    pub fn failure(message: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            ci_id: None,
            entity_type: None,
            status: ProcessingStatus::Failure,
            message,
            timestamp,
        }
    }
}
