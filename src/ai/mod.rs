//! AI assist capability boundary.
//!
//! The normalizer and the query translator depend on this narrow trait rather
//! than on a concrete model client, so the non-deterministic dependency stays
//! swappable: production wires in [`openai::OpenAiAssist`], tests wire in
//! deterministic stubs.

pub mod openai;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::EntityType;

/// Entity-type classification proposed by the assist.
#[derive(Debug, Clone, Copy)]
pub struct EntityGuess {
    pub entity_type: EntityType,
    pub confidence: f64,
}

/// One proposed raw-to-canonical field mapping. `canonical_field` is `None`
/// when the assist judged the field unmappable.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposedMapping {
    #[serde(rename = "original_field")]
    pub raw_field: String,
    pub canonical_field: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// External inference calls used by normalization and query translation.
///
/// Implementations may block on network latency; callers bound every call
/// with a timeout and fall back deterministically where the contract allows.
#[async_trait]
pub trait AiAssist: Send + Sync {
    /// Classify which entity type a raw record describes, from its field
    /// names and a sample of values.
    async fn classify_entity(
        &self,
        field_names: &[String],
        sample: &Value,
    ) -> anyhow::Result<EntityGuess>;

    /// Propose canonical mappings for the given raw field names.
    async fn map_fields(
        &self,
        entity_type: EntityType,
        field_names: &[String],
    ) -> anyhow::Result<Vec<ProposedMapping>>;

    /// Convert a natural-language prompt into a raw structured-query JSON
    /// value, given a compact schema description of the collections.
    async fn translate_query(
        &self,
        prompt: &str,
        schema_context: &Value,
    ) -> anyhow::Result<Value>;
}

/// Scan `text` for the outermost JSON object, tolerating prose around it.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Scan `text` for the outermost JSON array, tolerating prose around it.
pub(crate) fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}
